//! # Station Configuration
//!
//! All tunables in one place, burned in at compile time. The firmware binary
//! builds a [`StationConfig`] in `main` and hands references to the modules
//! that need them; there is no runtime configuration surface.

use embassy_time::Duration;

/// Compile-time station parameters.
#[derive(Debug, Clone, Copy)]
pub struct StationConfig {
    /// Wi-Fi network name.
    pub ssid: &'static str,
    /// Wi-Fi passphrase.
    pub password: &'static str,
    /// Broker host name or address.
    pub broker: &'static str,
    /// MQTT client identifier.
    pub client_id: &'static str,
    /// Root topic for outbound telemetry; readings are published under
    /// `{pub_topic}/temperature`, `/pressure` and `/humidity`.
    pub pub_topic: &'static str,
    /// Control topic subscribed for LED commands.
    pub sub_topic: &'static str,
    /// NTP pool host queried once at startup.
    pub ntp_host: &'static str,
    /// Whole-hour offset applied to NTP time.
    pub utc_offset_hours: i32,
    /// Local sea-level reference pressure for altitude estimates, hPa.
    pub sea_level_hpa: f32,
    /// Telemetry cycle interval.
    pub poll_interval: Duration,
    /// Wi-Fi status polls before giving up.
    pub wifi_max_wait: u32,
    /// Milliseconds between Wi-Fi status polls.
    pub wifi_retry_interval_ms: u32,
    /// MQTT keep-alive, seconds.
    pub keep_alive_secs: u16,
}

impl StationConfig {
    /// Builds a config with site credentials and topics filled in and every
    /// other field at its stock value.
    pub const fn new(
        ssid: &'static str,
        password: &'static str,
        broker: &'static str,
        client_id: &'static str,
        pub_topic: &'static str,
        sub_topic: &'static str,
    ) -> Self {
        Self {
            ssid,
            password,
            broker,
            client_id,
            pub_topic,
            sub_topic,
            ntp_host: "pool.ntp.org",
            utc_offset_hours: -7,
            sea_level_hpa: 1015.2,
            poll_interval: Duration::from_secs(15),
            wifi_max_wait: 10,
            wifi_retry_interval_ms: 1_000,
            keep_alive_secs: 7200,
        }
    }

    /// Wi-Fi bring-up view of this config.
    pub fn wifi(&self) -> crate::wifi::WifiConfig<'static> {
        crate::wifi::WifiConfig {
            ssid: self.ssid,
            password: self.password,
            max_wait: self.wifi_max_wait,
            retry_interval_ms: self.wifi_retry_interval_ms,
        }
    }

    /// Broker connection view of this config.
    pub fn broker_options(&self) -> crate::broker::BrokerOptions<'static> {
        crate::broker::BrokerOptions::new(self.client_id, self.keep_alive_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_values_fill_the_unspecified_fields() {
        const CONFIG: StationConfig = StationConfig::new(
            "shop-floor",
            "hunter2",
            "broker.local",
            "station-1",
            "station",
            "station/led",
        );

        assert_eq!(CONFIG.ntp_host, "pool.ntp.org");
        assert_eq!(CONFIG.utc_offset_hours, -7);
        assert_eq!(CONFIG.sea_level_hpa, 1015.2);
        assert_eq!(CONFIG.poll_interval, Duration::from_secs(15));
        assert_eq!(CONFIG.keep_alive_secs, 7200);

        let wifi = CONFIG.wifi();
        assert_eq!(wifi.max_wait, 10);
        assert_eq!(wifi.retry_interval_ms, 1_000);

        let options = CONFIG.broker_options();
        assert_eq!(options.client_id, "station-1");
        assert!(options.clean_session);
    }
}
