//! Thingy:52 Environment Protocol
//!
//! This module contains the characteristic identifiers and the binary frame
//! codec for the sensor hub's environment service.
//! See <https://nordicsemiconductor.github.io/Nordic-Thingy52-FW/documentation/firmware_architecture.html>

use crate::domain::models::{Channel, SensorReading};
use crate::domain::profile::{ConfigurationProfile, ConnectionParameters};
use crate::error::FrameError;
use uuid::Uuid;

/// Temperature notifications (2 bytes)
pub const TEMPERATURE_UUID: Uuid = Uuid::from_u128(0xEF680201_9B35_4933_9B10_52FFA9740042);

/// Humidity notifications (1 byte)
pub const HUMIDITY_UUID: Uuid = Uuid::from_u128(0xEF680203_9B35_4933_9B10_52FFA9740042);

/// Air quality notifications (eCO2 + TVOC, 4 bytes)
pub const AIR_QUALITY_UUID: Uuid = Uuid::from_u128(0xEF680204_9B35_4933_9B10_52FFA9740042);

/// Environment configuration characteristic (write, 12 bytes)
pub const CONFIG_UUID: Uuid = Uuid::from_u128(0xEF680206_9B35_4933_9B10_52FFA9740042);

/// Preferred connection parameters characteristic (write, 8 bytes)
pub const CONN_PARAM_UUID: Uuid = Uuid::from_u128(0xEF680104_9B35_4933_9B10_52FFA9740042);

pub const TEMPERATURE_FRAME_LEN: usize = 2;
pub const HUMIDITY_FRAME_LEN: usize = 1;
pub const AIR_QUALITY_MIN_FRAME_LEN: usize = 4;

pub const CONFIGURATION_PAYLOAD_LEN: usize = 12;
pub const CONNECTION_PARAMETERS_PAYLOAD_LEN: usize = 8;

/// Decode a notification payload for the given channel.
///
/// Returns `Ok(None)` for channels that never carry sensor data.
pub fn decode(channel: Channel, payload: &[u8]) -> Result<Option<SensorReading>, FrameError> {
    let reading = match channel {
        Channel::Temperature => decode_temperature(payload)?,
        Channel::Humidity => decode_humidity(payload)?,
        Channel::AirQuality => decode_air_quality(payload)?,
        Channel::EnvironmentConfig | Channel::ConnectionParameters => return Ok(None),
    };
    Ok(Some(reading))
}

/// Parse a temperature frame
///
/// ```text
/// [0] : Integer part (i8)
/// [1] : Decimal part (u8, hundredths of a degree)
/// ```
///
/// The decimal part is added regardless of the sign of the integer part,
/// matching the firmware: `[-5, 50]` reads as -4.50 °C.
pub fn decode_temperature(payload: &[u8]) -> Result<SensorReading, FrameError> {
    let [integer, decimal] = payload else {
        return Err(malformed(Channel::Temperature, "exactly 2", payload));
    };

    let celsius = f64::from(*integer as i8) + f64::from(*decimal) / 100.0;
    Ok(SensorReading::Temperature(celsius))
}

/// Parse a humidity frame: a single unsigned percentage byte, not clamped.
pub fn decode_humidity(payload: &[u8]) -> Result<SensorReading, FrameError> {
    let [percent] = payload else {
        return Err(malformed(Channel::Humidity, "exactly 1", payload));
    };
    Ok(SensorReading::Humidity(*percent))
}

/// Parse an air quality frame
///
/// ```text
/// [0-1] : eCO2 in ppm (u16 little-endian)
/// [2-3] : TVOC in ppb (u16 little-endian)
/// [4..] : ignored
/// ```
pub fn decode_air_quality(payload: &[u8]) -> Result<SensorReading, FrameError> {
    if payload.len() < AIR_QUALITY_MIN_FRAME_LEN {
        return Err(malformed(Channel::AirQuality, "at least 4", payload));
    }

    let eco2_ppm = u16::from_le_bytes([payload[0], payload[1]]);
    let tvoc_ppb = u16::from_le_bytes([payload[2], payload[3]]);
    Ok(SensorReading::AirQuality { eco2_ppm, tvoc_ppb })
}

fn malformed(channel: Channel, expected: &'static str, payload: &[u8]) -> FrameError {
    FrameError::MalformedFrame {
        channel,
        expected,
        actual: payload.len(),
    }
}

/// Encode the environment configuration
///
/// ```text
/// [0-1]  : Temperature interval ms (u16 little-endian)
/// [2-3]  : Pressure interval ms
/// [4-5]  : Humidity interval ms
/// [6-7]  : Color interval ms
/// [8]    : Gas mode (1 = 1 s, 2 = 10 s, 3 = 60 s)
/// [9-11] : Color sensor LED calibration (red, green, blue)
/// ```
pub fn encode_configuration(profile: &ConfigurationProfile) -> [u8; CONFIGURATION_PAYLOAD_LEN] {
    let mut bytes = [0u8; CONFIGURATION_PAYLOAD_LEN];
    bytes[0..2].copy_from_slice(&profile.temperature_interval_ms().to_le_bytes());
    bytes[2..4].copy_from_slice(&profile.pressure_interval_ms().to_le_bytes());
    bytes[4..6].copy_from_slice(&profile.humidity_interval_ms().to_le_bytes());
    bytes[6..8].copy_from_slice(&profile.color_interval_ms().to_le_bytes());
    bytes[8] = profile.gas_mode().as_byte();

    let led = profile.led_calibration();
    bytes[9] = led.red;
    bytes[10] = led.green;
    bytes[11] = led.blue;
    bytes
}

/// Encode the preferred connection parameters
///
/// ```text
/// [0-1] : Min connection interval, 1.25 ms units (u16 little-endian)
/// [2-3] : Max connection interval, 1.25 ms units
/// [4-5] : Slave latency, connection events
/// [6-7] : Supervision timeout, 10 ms units
/// ```
pub fn encode_connection_parameters(
    params: &ConnectionParameters,
) -> [u8; CONNECTION_PARAMETERS_PAYLOAD_LEN] {
    let mut bytes = [0u8; CONNECTION_PARAMETERS_PAYLOAD_LEN];
    bytes[0..2].copy_from_slice(&params.min_interval_units().to_le_bytes());
    bytes[2..4].copy_from_slice(&params.max_interval_units().to_le_bytes());
    bytes[4..6].copy_from_slice(&params.slave_latency_events().to_le_bytes());
    bytes[6..8].copy_from_slice(&params.supervision_timeout_units().to_le_bytes());
    bytes
}
