//! # Sensor Ports and Readings
//!
//! The raw I2C register protocols live in hardware adapters outside this
//! crate; the runtime sees sensors only through the port traits here. A
//! `read()` call is explicit about both the I/O and the failure path, so the
//! main loop can skip a poll cycle on a bad transaction and retry at the
//! next interval.

use embassy_time::Instant;
use heapless::Vec;

use crate::error::SensorError;

/// One sensor poll: ambient temperature plus whatever else the attached
/// suite provides. Consumed in the same cycle it is produced.
#[derive(Debug, Clone, Copy)]
pub struct SensorReading {
    /// Monotonic timestamp of the poll.
    pub timestamp: Instant,
    /// Ambient temperature in Celsius.
    pub temperature_c: f32,
    /// Barometric pressure in hectopascal, if a pressure sensor is fitted.
    pub pressure_hpa: Option<f32>,
    /// Relative humidity in percent, if a humidity sensor is fitted.
    pub humidity_pct: Option<f32>,
}

impl SensorReading {
    pub fn new(timestamp: Instant, temperature_c: f32) -> Self {
        Self {
            timestamp,
            temperature_c,
            pressure_hpa: None,
            humidity_pct: None,
        }
    }

    pub fn with_pressure(mut self, pressure_hpa: f32) -> Self {
        self.pressure_hpa = Some(pressure_hpa);
        self
    }

    pub fn with_humidity(mut self, humidity_pct: f32) -> Self {
        self.humidity_pct = Some(humidity_pct);
        self
    }
}

/// Port for the environmental sensor suite (e.g. BMP280 + SHT20 behind one
/// adapter). Conversion wait times are the adapter's business; the runtime
/// only sees the combined reading.
#[allow(async_fn_in_trait)]
pub trait WeatherSensor {
    async fn read(&mut self) -> Result<SensorReading, SensorError>;
}

/// Port for the on-die temperature ADC.
pub trait CoreTempAdc {
    /// Raw 16-bit conversion of the internal temperature channel.
    fn read_u16(&mut self) -> Result<u16, SensorError>;
}

/// Fixed-size rolling history with append-and-shift semantics: the newest
/// value sits at index 0 and the oldest falls off the end.
#[derive(Debug, Default, Clone)]
pub struct RollingWindow<const N: usize> {
    values: Vec<f32, N>,
}

impl<const N: usize> RollingWindow<N> {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Appends at the front, silently evicting the oldest entry when full.
    pub fn push(&mut self, value: f32) {
        if self.values.is_full() {
            self.values.pop();
        }
        // Cannot fail: a slot was just freed if the window was full.
        let _ = self.values.insert(0, value);
    }

    /// Mean of the recorded values; `None` while empty.
    pub fn average(&self) -> Option<f32> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f32 = self.values.iter().sum();
        Some(sum / self.values.len() as f32)
    }

    /// Most recent value.
    pub fn latest(&self) -> Option<f32> {
        self.values.first().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}
