//! # Station Runtime
//!
//! The single control loop that ties the pieces together: poll the broker
//! for LED commands, run the telemetry cycle when the scheduler says so,
//! keep the status-page snapshot current. Runs forever; the only way out is
//! a broker error, which the firmware handles by cooling down and
//! restarting the process.

use core::convert::Infallible;
use core::fmt::Write as FmtWrite;

use embassy_time::{Instant, Timer};
use embedded_hal::digital::OutputPin;
use heapless::String;

use crate::broker::{BrokerSession, MAX_TOPIC_LEN};
use crate::command::{Command, LedControl};
use crate::config::StationConfig;
use crate::error::BrokerError;
use crate::httpd::StatusSnapshot;
use crate::metrics::DerivedReading;
use crate::scheduler::{PollTick, TelemetryScheduler};
use crate::sensor::{CoreTempAdc, RollingWindow, SensorReading, WeatherSensor};
use crate::transport::BrokerTransport;

/// Width of the recent-readings history kept per channel.
pub const HISTORY_LEN: usize = 3;

/// Formatted numeric payloads fit in this.
const VALUE_LEN: usize = 16;

/// The station's main loop state.
pub struct WeatherAgent<T, S, A, P>
where
    T: BrokerTransport,
    S: WeatherSensor,
    A: CoreTempAdc,
    P: OutputPin,
{
    session: BrokerSession<T>,
    scheduler: TelemetryScheduler,
    sensor: S,
    cpu_adc: A,
    led: LedControl<P>,
    temperature_history: RollingWindow<HISTORY_LEN>,
    pressure_history: RollingWindow<HISTORY_LEN>,
    snapshot: StatusSnapshot,
    pub_topic: &'static str,
    sub_topic: &'static str,
    sea_level_hpa: f32,
}

impl<T, S, A, P> WeatherAgent<T, S, A, P>
where
    T: BrokerTransport,
    S: WeatherSensor,
    A: CoreTempAdc,
    P: OutputPin,
{
    /// Assembles the agent around an already-connected broker session. The
    /// first telemetry cycle fires one poll interval after `now`.
    pub fn new(
        session: BrokerSession<T>,
        sensor: S,
        cpu_adc: A,
        led: LedControl<P>,
        config: &StationConfig,
        now: Instant,
    ) -> Self {
        Self {
            session,
            scheduler: TelemetryScheduler::new(config.poll_interval, now),
            sensor,
            cpu_adc,
            led,
            temperature_history: RollingWindow::new(),
            pressure_history: RollingWindow::new(),
            snapshot: StatusSnapshot::default(),
            pub_topic: config.pub_topic,
            sub_topic: config.sub_topic,
            sea_level_hpa: config.sea_level_hpa,
        }
    }

    /// Subscribes to the control topic. Call once between session setup and
    /// [`WeatherAgent::run`].
    pub async fn subscribe_control(&mut self) -> Result<(), BrokerError<T::Error>> {
        self.session.subscribe(self.sub_topic).await
    }

    /// Runs forever. A `BrokerError` is fatal to the session and propagates
    /// out for the firmware's restart policy.
    pub async fn run(&mut self) -> Result<Infallible, BrokerError<T::Error>> {
        loop {
            self.step(Instant::now()).await?;
            // Let other tasks (httpd, network stack) make progress.
            Timer::after_millis(10).await;
        }
    }

    /// One loop iteration against an explicit clock: drain at most one
    /// pending command, then run the telemetry cycle if it is due.
    pub async fn step(&mut self, now: Instant) -> Result<(), BrokerError<T::Error>> {
        if let Some(message) = self.session.check_msg().await? {
            let command = Command::decode(&message.payload);
            log::info!("command on '{}': {:?}", message.topic, command);
            if self.led.apply(&command).is_err() {
                log::warn!("indicator pin fault while applying command");
            }
            self.snapshot.led_on = self.led.is_on();
        }

        if let Some(tick) = self.scheduler.tick(now) {
            self.telemetry_cycle(tick).await?;
        }
        Ok(())
    }

    /// Read-compute-publish. Sensor failures skip the cycle; metric
    /// failures are logged and the raw channels still go out.
    async fn telemetry_cycle(&mut self, tick: PollTick) -> Result<(), BrokerError<T::Error>> {
        let reading = match self.sensor.read().await {
            Ok(reading) => reading,
            Err(e) => {
                log::warn!("cycle {}: sensor read failed: {e:?}, skipping", tick.count);
                return Ok(());
            }
        };

        self.temperature_history.push(reading.temperature_c);
        if let Some(pressure) = reading.pressure_hpa {
            self.pressure_history.push(pressure);
        }

        let derived = match self.cpu_adc.read_u16() {
            Ok(raw) => match DerivedReading::compute(&reading, raw, self.sea_level_hpa) {
                Ok(derived) => Some(derived),
                Err(e) => {
                    log::warn!("cycle {}: derived metrics unavailable: {e:?}", tick.count);
                    None
                }
            },
            Err(e) => {
                log::warn!("cycle {}: core temp ADC failed: {e:?}", tick.count);
                None
            }
        };

        self.publish_reading(&reading).await?;

        self.snapshot.temperature_c = reading.temperature_c;
        self.snapshot.adjusted_temperature_c = self
            .temperature_history
            .average()
            .unwrap_or(reading.temperature_c);
        if let Some(derived) = derived {
            self.snapshot.cpu_temperature_c = derived.cpu_temp_c;
        }
        self.snapshot.led_on = self.led.is_on();

        match derived {
            Some(d) => log::info!(
                "cycle {}: {:.2} C, alt {:.0} m, cpu {:.1} C",
                tick.count,
                reading.temperature_c,
                d.altitude_barometric_m,
                d.cpu_temp_c
            ),
            None => log::info!("cycle {}: {:.2} C", tick.count, reading.temperature_c),
        }
        Ok(())
    }

    async fn publish_reading(
        &mut self,
        reading: &SensorReading,
    ) -> Result<(), BrokerError<T::Error>> {
        self.publish_value("temperature", reading.temperature_c).await?;
        if let Some(pressure) = reading.pressure_hpa {
            self.publish_value("pressure", pressure).await?;
        }
        if let Some(humidity) = reading.humidity_pct {
            self.publish_value("humidity", humidity).await?;
        }
        Ok(())
    }

    async fn publish_value(
        &mut self,
        channel: &str,
        value: f32,
    ) -> Result<(), BrokerError<T::Error>> {
        let mut topic: String<MAX_TOPIC_LEN> = String::new();
        let mut payload: String<VALUE_LEN> = String::new();
        if write!(topic, "{}/{}", self.pub_topic, channel).is_err()
            || write!(payload, "{value:.2}").is_err()
        {
            log::error!("telemetry value for '{channel}' does not fit, dropping");
            return Ok(());
        }
        self.session.publish(&topic, payload.as_bytes()).await
    }

    /// Current status-page values.
    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Recent ambient temperatures, newest first.
    pub fn temperature_history(&self) -> &RollingWindow<HISTORY_LEN> {
        &self.temperature_history
    }

    /// Recent pressure readings, newest first.
    pub fn pressure_history(&self) -> &RollingWindow<HISTORY_LEN> {
        &self.pressure_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerOptions;
    use crate::error::SensorError;
    use futures::executor::block_on;

    #[derive(Default)]
    struct ScriptedTransport {
        inbound: std::vec::Vec<std::vec::Vec<u8>>,
        sent: std::vec::Vec<std::vec::Vec<u8>>,
    }

    impl BrokerTransport for ScriptedTransport {
        type Error = ();

        async fn send(&mut self, buf: &[u8]) -> Result<(), BrokerError<()>> {
            self.sent.push(buf.to_vec());
            Ok(())
        }

        async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, BrokerError<()>> {
            if self.inbound.is_empty() {
                return Err(BrokerError::Timeout);
            }
            let frame = self.inbound.remove(0);
            buf[..frame.len()].copy_from_slice(&frame);
            Ok(frame.len())
        }
    }

    struct FixedSensor {
        result: Result<SensorReading, SensorError>,
        reads: u32,
    }

    impl WeatherSensor for FixedSensor {
        async fn read(&mut self) -> Result<SensorReading, SensorError> {
            self.reads += 1;
            self.result
        }
    }

    struct FixedAdc(u16);

    impl CoreTempAdc for FixedAdc {
        fn read_u16(&mut self) -> Result<u16, SensorError> {
            Ok(self.0)
        }
    }

    struct StubPin;

    impl embedded_hal::digital::ErrorType for StubPin {
        type Error = core::convert::Infallible;
    }

    impl OutputPin for StubPin {
        fn set_low(&mut self) -> Result<(), core::convert::Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), core::convert::Infallible> {
            Ok(())
        }
    }

    const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    fn config() -> StationConfig {
        StationConfig::new(
            "shop-floor",
            "hunter2",
            "broker.local",
            "station-1",
            "station",
            "station/led",
        )
    }

    fn agent(
        inbound: &[&[u8]],
        sensor: FixedSensor,
    ) -> WeatherAgent<ScriptedTransport, FixedSensor, FixedAdc, StubPin> {
        let mut transport = ScriptedTransport::default();
        transport.inbound.push(CONNACK_OK.to_vec());
        for frame in inbound {
            transport.inbound.push(frame.to_vec());
        }
        let session = block_on(BrokerSession::connect(
            transport,
            &BrokerOptions::new("station-1", 7200),
        ))
        .unwrap();
        let led = LedControl::new(StubPin).unwrap();
        WeatherAgent::new(
            session,
            sensor,
            FixedAdc(0x379),
            led,
            &config(),
            Instant::from_secs(0),
        )
    }

    fn reading() -> SensorReading {
        SensorReading::new(Instant::from_secs(0), 21.5)
            .with_pressure(1013.25)
            .with_humidity(40.0)
    }

    #[test]
    fn subscribe_control_registers_the_configured_topic() {
        const SUBACK_OK: [u8; 5] = [0x90, 0x03, 0x00, 0x01, 0x00];
        let mut agent = agent(
            &[&SUBACK_OK],
            FixedSensor {
                result: Ok(reading()),
                reads: 0,
            },
        );

        block_on(agent.subscribe_control()).unwrap();
        assert!(agent.session.topics().contains("station/led"));
    }

    #[test]
    fn due_cycle_publishes_every_available_channel() {
        let mut agent = agent(
            &[],
            FixedSensor {
                result: Ok(reading()),
                reads: 0,
            },
        );

        // One interval plus a second, so the cycle is due.
        block_on(agent.step(Instant::from_secs(16))).unwrap();

        let sent = &agent.session.transport().sent;
        let frames: std::vec::Vec<std::string::String> = sent
            .iter()
            .map(|f| std::string::String::from_utf8_lossy(f).into_owned())
            .collect();
        assert!(frames.iter().any(|f| f.contains("station/temperature") && f.contains("21.50")));
        assert!(frames.iter().any(|f| f.contains("station/pressure") && f.contains("1013.25")));
        assert!(frames.iter().any(|f| f.contains("station/humidity") && f.contains("40.00")));

        let snapshot = agent.snapshot();
        assert_eq!(snapshot.temperature_c, 21.5);
        assert_eq!(snapshot.adjusted_temperature_c, 21.5);
        assert!(snapshot.cpu_temperature_c > 0.0);
    }

    #[test]
    fn idle_step_publishes_nothing() {
        let mut agent = agent(
            &[],
            FixedSensor {
                result: Ok(reading()),
                reads: 0,
            },
        );

        block_on(agent.step(Instant::from_secs(5))).unwrap();

        // Only the CONNECT frame from session setup was sent.
        assert_eq!(agent.session.transport().sent.len(), 1);
        assert_eq!(agent.sensor.reads, 0);
    }

    #[test]
    fn sensor_failure_skips_the_cycle_without_killing_the_loop() {
        let mut agent = agent(
            &[],
            FixedSensor {
                result: Err(SensorError::Nack),
                reads: 0,
            },
        );

        block_on(agent.step(Instant::from_secs(16))).unwrap();

        assert_eq!(agent.sensor.reads, 1);
        assert_eq!(agent.session.transport().sent.len(), 1);
        // The next due tick tries again.
        block_on(agent.step(Instant::from_secs(32))).unwrap();
        assert_eq!(agent.sensor.reads, 2);
    }

    #[test]
    fn inbound_led_command_is_applied_before_telemetry() {
        let mut frame = [0u8; 64];
        use crate::packet::EncodePacket;
        let n = crate::packet::Publish::new("station/led", b"LEDon")
            .encode(&mut frame)
            .unwrap();
        let mut agent = agent(
            &[&frame[..n]],
            FixedSensor {
                result: Ok(reading()),
                reads: 0,
            },
        );

        block_on(agent.step(Instant::from_secs(1))).unwrap();

        assert!(agent.led.is_on());
        assert!(agent.snapshot().led_on);
    }

    #[test]
    fn rolling_average_feeds_the_adjusted_temperature() {
        let mut agent = agent(
            &[],
            FixedSensor {
                result: Ok(reading()),
                reads: 0,
            },
        );

        block_on(agent.step(Instant::from_secs(16))).unwrap();
        agent.sensor.result = Ok(SensorReading::new(Instant::from_secs(32), 23.5)
            .with_pressure(1013.25));
        block_on(agent.step(Instant::from_secs(32))).unwrap();

        assert_eq!(agent.temperature_history().as_slice(), &[23.5, 21.5]);
        assert_eq!(agent.pressure_history().as_slice(), &[1013.25, 1013.25]);
        assert_eq!(agent.snapshot().temperature_c, 23.5);
        assert_eq!(agent.snapshot().adjusted_temperature_c, 22.5);
    }
}
