//! # Derived Metrics
//!
//! Pure conversions from raw sensor and ADC values into physical units.
//! Nothing here touches hardware or time; every function is deterministic.
//!
//! Two altitude estimates are computed side by side: the hypsometric
//! formula (pressure ratio and absolute temperature) and the international
//! barometric formula from the BMP datasheet (pressure ratio only). They
//! disagree slightly by construction and neither is authoritative.

use crate::error::MetricError;
use crate::sensor::SensorReading;

/// Meters-to-feet conversion factor.
pub const METERS_TO_FEET: f32 = 3.28084;

/// Hypsometric formula exponent, 1/5.257.
const HYPSOMETRIC_EXPONENT: f32 = 1.0 / 5.257;

/// International barometric formula exponent, 1/5.255.
const BAROMETRIC_EXPONENT: f32 = 1.0 / 5.255;

/// ADC reference voltage over the 16-bit full-scale range.
const ADC_VOLTS_PER_COUNT: f32 = 3.3 / 65535.0;

/// Celsius to Fahrenheit.
pub fn c_to_f(temp_c: f32) -> f32 {
    temp_c * 1.8 + 32.0
}

/// Celsius to Kelvin.
pub fn c_to_k(temp_c: f32) -> f32 {
    temp_c + 273.15
}

/// Meters to feet.
pub fn m_to_ft(meters: f32) -> f32 {
    meters * METERS_TO_FEET
}

/// Altitude from pressure and absolute temperature via the hypsometric
/// formula.
///
/// Fails on non-positive pressure input rather than producing a NaN.
pub fn hypsometric_altitude_m(
    pressure_hpa: f32,
    temperature_k: f32,
    sea_level_hpa: f32,
) -> Result<f32, MetricError> {
    check_pressures(pressure_hpa, sea_level_hpa)?;
    let pressure_ratio = sea_level_hpa / pressure_hpa;
    Ok(((libm::powf(pressure_ratio, HYPSOMETRIC_EXPONENT) - 1.0) * temperature_k) / 0.0065)
}

/// Altitude from pressure alone via the international barometric formula,
/// as given in the BMP sensor datasheet.
pub fn barometric_altitude_m(pressure_hpa: f32, sea_level_hpa: f32) -> Result<f32, MetricError> {
    check_pressures(pressure_hpa, sea_level_hpa)?;
    let pressure_ratio = pressure_hpa / sea_level_hpa;
    Ok(44330.0 * (1.0 - libm::powf(pressure_ratio, BAROMETRIC_EXPONENT)))
}

/// On-die temperature from the raw ADC conversion, per the RP2040
/// datasheet: 27 °C at 0.706 V, −1.721 mV per degree. Strictly decreasing
/// in the raw value.
pub fn cpu_temperature_c(adc_raw: u16) -> f32 {
    let volts = f32::from(adc_raw) * ADC_VOLTS_PER_COUNT;
    27.0 - (volts - 0.706) / 0.001721
}

fn check_pressures(pressure_hpa: f32, sea_level_hpa: f32) -> Result<(), MetricError> {
    if pressure_hpa <= 0.0 || sea_level_hpa <= 0.0 {
        return Err(MetricError::NonPositivePressure);
    }
    Ok(())
}

/// The physical quantities derived from one poll cycle. Ephemeral: computed,
/// published/displayed, dropped.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DerivedReading {
    pub temp_f: f32,
    pub altitude_hypsometric_m: f32,
    pub altitude_barometric_m: f32,
    /// Feet conversion of the barometric estimate.
    pub altitude_ft: f32,
    pub cpu_temp_c: f32,
}

impl DerivedReading {
    /// Computes the full derived set for one cycle.
    ///
    /// Requires a pressure channel in the reading; a suite without one has
    /// no altitude to derive.
    pub fn compute(
        reading: &SensorReading,
        cpu_adc_raw: u16,
        sea_level_hpa: f32,
    ) -> Result<Self, MetricError> {
        let pressure_hpa = reading.pressure_hpa.ok_or(MetricError::NonPositivePressure)?;
        let temperature_k = c_to_k(reading.temperature_c);

        let altitude_hypsometric_m =
            hypsometric_altitude_m(pressure_hpa, temperature_k, sea_level_hpa)?;
        let altitude_barometric_m = barometric_altitude_m(pressure_hpa, sea_level_hpa)?;

        Ok(Self {
            temp_f: c_to_f(reading.temperature_c),
            altitude_hypsometric_m,
            altitude_barometric_m,
            altitude_ft: m_to_ft(altitude_barometric_m),
            cpu_temp_c: cpu_temperature_c(cpu_adc_raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Instant;

    #[test]
    fn celsius_fahrenheit_fixed_points() {
        assert_eq!(c_to_f(0.0), 32.0);
        assert_eq!(c_to_f(100.0), 212.0);
    }

    #[test]
    fn sea_level_pressure_means_zero_altitude() {
        let sl = 1015.2;
        for t_k in [223.15, 273.15, 313.15] {
            assert_eq!(hypsometric_altitude_m(sl, t_k, sl).unwrap(), 0.0);
        }
        assert_eq!(barometric_altitude_m(sl, sl).unwrap(), 0.0);
    }

    #[test]
    fn altitude_estimates_are_plausible_at_elevation() {
        // Salt Lake City sits around 1300 m; ~870 hPa station pressure.
        let h = hypsometric_altitude_m(870.0, 288.15, 1015.2).unwrap();
        let b = barometric_altitude_m(870.0, 1015.2).unwrap();
        assert!(h > 1000.0 && h < 1700.0, "hypsometric {h}");
        assert!(b > 1000.0 && b < 1700.0, "barometric {b}");
        // The two formulas agree only loosely.
        assert!((h - b).abs() < 100.0);
    }

    #[test]
    fn non_positive_pressure_is_a_typed_failure() {
        for (p, sl) in [(0.0, 1015.2), (-5.0, 1015.2), (900.0, 0.0), (900.0, -1.0)] {
            assert_eq!(
                hypsometric_altitude_m(p, 288.15, sl).unwrap_err(),
                MetricError::NonPositivePressure
            );
            assert_eq!(
                barometric_altitude_m(p, sl).unwrap_err(),
                MetricError::NonPositivePressure
            );
        }
    }

    #[test]
    fn cpu_temperature_decreases_with_raw_counts() {
        // 0.706 V is the datasheet's 27 degree point.
        let at_calibration = cpu_temperature_c((0.706f32 / (3.3 / 65535.0)) as u16);
        assert!((at_calibration - 27.0).abs() < 0.05);

        let mut previous = cpu_temperature_c(0);
        for raw in (1..=u32::from(u16::MAX)).step_by(257) {
            let current = cpu_temperature_c(raw as u16);
            assert!(current < previous, "not decreasing at raw={raw}");
            previous = current;
        }
        let current = cpu_temperature_c(u16::MAX);
        assert!(current < previous);
    }

    #[test]
    fn meters_to_feet_conversion() {
        assert!((m_to_ft(1.0) - 3.28084).abs() < 1e-6);
        assert_eq!(m_to_ft(0.0), 0.0);
    }

    #[test]
    fn derived_reading_needs_a_pressure_channel() {
        let bare = SensorReading::new(Instant::from_secs(0), 20.0);
        assert!(DerivedReading::compute(&bare, 0x379, 1015.2).is_err());

        let full = bare.with_pressure(1015.2);
        let derived = DerivedReading::compute(&full, 0x379, 1015.2).unwrap();
        assert_eq!(derived.temp_f, c_to_f(20.0));
        assert_eq!(derived.altitude_barometric_m, 0.0);
        assert_eq!(derived.altitude_ft, 0.0);
        assert_eq!(derived.altitude_hypsometric_m, 0.0);
    }
}
