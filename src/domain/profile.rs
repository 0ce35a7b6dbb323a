//! Validated device configuration.
//!
//! Both [`ConfigurationProfile`] and [`ConnectionParameters`] can only be built
//! through their `new` constructors, so any value that reaches the encoder is
//! already within the ranges the sensor hub accepts.

use crate::error::ValidationError;
use std::ops::RangeInclusive;

pub const TEMPERATURE_INTERVAL_MS: RangeInclusive<u16> = 100..=60_000;
pub const PRESSURE_INTERVAL_MS: RangeInclusive<u16> = 50..=60_000;
pub const HUMIDITY_INTERVAL_MS: RangeInclusive<u16> = 100..=60_000;
pub const COLOR_INTERVAL_MS: RangeInclusive<u16> = 200..=60_000;

/// Connection interval, in 1.25 ms units (7.5 ms - 4 s)
pub const CONNECTION_INTERVAL_UNITS: RangeInclusive<u16> = 6..=3200;
/// Slave latency, in connection events
pub const SLAVE_LATENCY_EVENTS: RangeInclusive<u16> = 0..=499;
/// Supervision timeout, in 10 ms units (100 ms - 32 s)
pub const SUPERVISION_TIMEOUT_UNITS: RangeInclusive<u16> = 10..=3200;

fn check_range(
    field: &'static str,
    value: u16,
    range: &RangeInclusive<u16>,
) -> Result<u16, ValidationError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Air-quality sensor sampling rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasMode {
    Interval1s,
    Interval10s,
    Interval60s,
}

impl GasMode {
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Interval1s => 0x01,
            Self::Interval10s => 0x02,
            Self::Interval60s => 0x03,
        }
    }
}

impl TryFrom<u8> for GasMode {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Interval1s),
            0x02 => Ok(Self::Interval10s),
            0x03 => Ok(Self::Interval60s),
            other => Err(ValidationError::UnknownGasMode(other)),
        }
    }
}

/// Color sensor LED intensities, 0-255 each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedCalibration {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Environment service configuration written to the sensor hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationProfile {
    temperature_interval_ms: u16,
    pressure_interval_ms: u16,
    humidity_interval_ms: u16,
    color_interval_ms: u16,
    gas_mode: GasMode,
    led_calibration: LedCalibration,
}

impl ConfigurationProfile {
    pub fn new(
        temperature_interval_ms: u16,
        pressure_interval_ms: u16,
        humidity_interval_ms: u16,
        color_interval_ms: u16,
        gas_mode: GasMode,
        led_calibration: LedCalibration,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            temperature_interval_ms: check_range(
                "temperature_interval_ms",
                temperature_interval_ms,
                &TEMPERATURE_INTERVAL_MS,
            )?,
            pressure_interval_ms: check_range(
                "pressure_interval_ms",
                pressure_interval_ms,
                &PRESSURE_INTERVAL_MS,
            )?,
            humidity_interval_ms: check_range(
                "humidity_interval_ms",
                humidity_interval_ms,
                &HUMIDITY_INTERVAL_MS,
            )?,
            color_interval_ms: check_range(
                "color_interval_ms",
                color_interval_ms,
                &COLOR_INTERVAL_MS,
            )?,
            gas_mode,
            led_calibration,
        })
    }

    pub fn temperature_interval_ms(&self) -> u16 {
        self.temperature_interval_ms
    }

    pub fn pressure_interval_ms(&self) -> u16 {
        self.pressure_interval_ms
    }

    pub fn humidity_interval_ms(&self) -> u16 {
        self.humidity_interval_ms
    }

    pub fn color_interval_ms(&self) -> u16 {
        self.color_interval_ms
    }

    pub fn gas_mode(&self) -> GasMode {
        self.gas_mode
    }

    pub fn led_calibration(&self) -> LedCalibration {
        self.led_calibration
    }
}

/// Preferred BLE connection parameters requested from the sensor hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParameters {
    min_interval_units: u16,
    max_interval_units: u16,
    slave_latency_events: u16,
    supervision_timeout_units: u16,
}

impl ConnectionParameters {
    /// Validates every field and the link-layer constraint
    /// `timeout_ms > (1 + latency) * max_interval_ms * 2`.
    pub fn new(
        min_interval_units: u16,
        max_interval_units: u16,
        slave_latency_events: u16,
        supervision_timeout_units: u16,
    ) -> Result<Self, ValidationError> {
        check_range(
            "min_interval_units",
            min_interval_units,
            &CONNECTION_INTERVAL_UNITS,
        )?;
        check_range(
            "max_interval_units",
            max_interval_units,
            &CONNECTION_INTERVAL_UNITS,
        )?;
        if max_interval_units < min_interval_units {
            return Err(ValidationError::MaxIntervalBelowMin {
                min: min_interval_units,
                max: max_interval_units,
            });
        }
        check_range(
            "slave_latency_events",
            slave_latency_events,
            &SLAVE_LATENCY_EVENTS,
        )?;
        check_range(
            "supervision_timeout_units",
            supervision_timeout_units,
            &SUPERVISION_TIMEOUT_UNITS,
        )?;

        // Both sides scaled to 0.25 ms: timeout * 10 ms vs (1 + latency) * max * 1.25 ms * 2.
        let timeout_quarter_ms = u32::from(supervision_timeout_units) * 40;
        let required_quarter_ms =
            (1 + u32::from(slave_latency_events)) * u32::from(max_interval_units) * 10;
        if timeout_quarter_ms <= required_quarter_ms {
            return Err(ValidationError::SupervisionTimeoutTooShort {
                timeout_ms: u32::from(supervision_timeout_units) * 10,
                required_ms: f64::from(required_quarter_ms) / 4.0,
            });
        }

        Ok(Self {
            min_interval_units,
            max_interval_units,
            slave_latency_events,
            supervision_timeout_units,
        })
    }

    pub fn min_interval_units(&self) -> u16 {
        self.min_interval_units
    }

    pub fn max_interval_units(&self) -> u16 {
        self.max_interval_units
    }

    pub fn slave_latency_events(&self) -> u16 {
        self.slave_latency_events
    }

    pub fn supervision_timeout_units(&self) -> u16 {
        self.supervision_timeout_units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with_temperature(interval: u16) -> Result<ConfigurationProfile, ValidationError> {
        ConfigurationProfile::new(
            interval,
            60_000,
            20_000,
            60_000,
            GasMode::Interval10s,
            LedCalibration::default(),
        )
    }

    #[test]
    fn test_profile_bounds() {
        assert!(profile_with_temperature(100).is_ok());
        assert!(profile_with_temperature(60_000).is_ok());
        assert_eq!(
            profile_with_temperature(99),
            Err(ValidationError::OutOfRange {
                field: "temperature_interval_ms",
                value: 99,
                min: 100,
                max: 60_000,
            })
        );
        assert!(profile_with_temperature(60_001).is_err());
    }

    #[test]
    fn test_pressure_and_color_have_their_own_minimums() {
        let led = LedCalibration::default();
        assert!(ConfigurationProfile::new(100, 50, 100, 200, GasMode::Interval1s, led).is_ok());
        assert!(ConfigurationProfile::new(100, 49, 100, 200, GasMode::Interval1s, led).is_err());
        assert!(ConfigurationProfile::new(100, 50, 100, 199, GasMode::Interval1s, led).is_err());
    }

    #[test]
    fn test_gas_mode_bytes() {
        for mode in [GasMode::Interval1s, GasMode::Interval10s, GasMode::Interval60s] {
            assert_eq!(GasMode::try_from(mode.as_byte()), Ok(mode));
        }
        assert_eq!(GasMode::try_from(0), Err(ValidationError::UnknownGasMode(0)));
        assert_eq!(GasMode::try_from(4), Err(ValidationError::UnknownGasMode(4)));
    }

    #[test]
    fn test_connection_parameters_constraint() {
        assert!(ConnectionParameters::new(6, 3200, 0, 3200).is_ok());
        assert!(matches!(
            ConnectionParameters::new(6, 3200, 499, 10),
            Err(ValidationError::SupervisionTimeoutTooShort { .. })
        ));
    }

    #[test]
    fn test_connection_parameters_constraint_is_strict() {
        // timeout * 4 == (1 + latency) * max is not enough
        assert!(ConnectionParameters::new(6, 40, 0, 10).is_err());
        assert!(ConnectionParameters::new(6, 39, 0, 10).is_ok());
    }

    #[test]
    fn test_connection_parameters_field_bounds() {
        assert!(ConnectionParameters::new(5, 3200, 0, 3200).is_err());
        assert!(ConnectionParameters::new(6, 3201, 0, 3200).is_err());
        assert!(ConnectionParameters::new(6, 100, 500, 3200).is_err());
        assert!(ConnectionParameters::new(6, 6, 0, 9).is_err());
        assert_eq!(
            ConnectionParameters::new(100, 50, 0, 3200),
            Err(ValidationError::MaxIntervalBelowMin { min: 100, max: 50 })
        );
    }
}
