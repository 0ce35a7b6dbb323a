use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::infrastructure::bluetooth::protocol;

/// GATT characteristics the monitor talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Temperature,
    Humidity,
    AirQuality,
    EnvironmentConfig,
    ConnectionParameters,
}

impl Channel {
    /// Channels subscribed for the observation window, in subscription order.
    pub const NOTIFY: [Channel; 3] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::AirQuality,
    ];

    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Temperature => protocol::TEMPERATURE_UUID,
            Self::Humidity => protocol::HUMIDITY_UUID,
            Self::AirQuality => protocol::AIR_QUALITY_UUID,
            Self::EnvironmentConfig => protocol::CONFIG_UUID,
            Self::ConnectionParameters => protocol::CONN_PARAM_UUID,
        }
    }

    /// Resolve a characteristic UUID. Unknown UUIDs yield `None`.
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        [
            Self::Temperature,
            Self::Humidity,
            Self::AirQuality,
            Self::EnvironmentConfig,
            Self::ConnectionParameters,
        ]
        .into_iter()
        .find(|c| c.uuid() == uuid)
    }
}

/// A notification as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub channel_id: Uuid,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(channel_id: Uuid, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel_id,
            payload: payload.into(),
        }
    }
}

/// A decoded sensor notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    /// Degrees Celsius
    Temperature(f64),
    /// Relative humidity in percent
    Humidity(u8),
    AirQuality { eco2_ppm: u16, tvoc_ppb: u16 },
}

impl SensorReading {
    /// Split the reading into one measurement per metric.
    pub fn measurements(&self) -> Vec<Measurement> {
        match *self {
            Self::Temperature(celsius) => {
                vec![Measurement::new(ReadingKind::Temperature, celsius)]
            }
            Self::Humidity(percent) => {
                vec![Measurement::new(ReadingKind::Humidity, f64::from(percent))]
            }
            Self::AirQuality { eco2_ppm, tvoc_ppb } => vec![
                Measurement::new(ReadingKind::Co2, f64::from(eco2_ppm)),
                Measurement::new(ReadingKind::Tvoc, f64::from(tvoc_ppb)),
            ],
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temperature(celsius) => write!(f, "Temperature: {:.2} °C", celsius),
            Self::Humidity(percent) => write!(f, "Humidity: {}%", percent),
            Self::AirQuality { eco2_ppm, tvoc_ppb } => {
                write!(f, "eCO2: {} ppm, TVOC: {} ppb", eco2_ppm, tvoc_ppb)
            }
        }
    }
}

/// Measurement names as stored by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReadingKind {
    Temperature,
    Humidity,
    #[serde(rename = "CO2")]
    Co2,
    #[serde(rename = "VOC")]
    Tvoc,
}

impl ReadingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Co2 => "CO2",
            Self::Tvoc => "VOC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub kind: ReadingKind,
    pub value: f64,
}

impl Measurement {
    pub fn new(kind: ReadingKind, value: f64) -> Self {
        Self { kind, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordTags {
    pub device: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecordFields {
    pub value: f64,
}

/// One measurement ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingRecord {
    pub measurement: ReadingKind,
    pub tags: RecordTags,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub fields: RecordFields,
}

impl ReadingRecord {
    pub fn new(measurement: Measurement, device_address: &str, time: OffsetDateTime) -> Self {
        Self {
            measurement: measurement.kind,
            tags: RecordTags {
                device: format!("BLE_Thingy_{}", device_address),
            },
            time,
            fields: RecordFields {
                value: measurement.value,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Configuring,
    Subscribed,
    Observing,
    Unsubscribing,
    Idle,
    Terminated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    State(SessionState),
    Reading(ReadingRecord),
    CycleFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_channel_uuid_lookup() {
        for channel in Channel::NOTIFY {
            assert_eq!(Channel::from_uuid(channel.uuid()), Some(channel));
        }
        assert_eq!(Channel::from_uuid(Uuid::nil()), None);
    }

    #[test]
    fn test_air_quality_splits_into_two_measurements() {
        let reading = SensorReading::AirQuality {
            eco2_ppm: 1000,
            tvoc_ppb: 300,
        };
        assert_eq!(
            reading.measurements(),
            vec![
                Measurement::new(ReadingKind::Co2, 1000.0),
                Measurement::new(ReadingKind::Tvoc, 300.0),
            ]
        );
    }

    #[test]
    fn test_reading_display() {
        assert_eq!(
            SensorReading::Temperature(22.35).to_string(),
            "Temperature: 22.35 °C"
        );
        assert_eq!(
            SensorReading::AirQuality {
                eco2_ppm: 1000,
                tvoc_ppb: 300
            }
            .to_string(),
            "eCO2: 1000 ppm, TVOC: 300 ppb"
        );
    }

    #[test]
    fn test_record_serialization() {
        let record = ReadingRecord::new(
            Measurement::new(ReadingKind::Co2, 400.0),
            "AA:BB:CC:DD:EE:FF",
            datetime!(2024-05-01 12:30:00 UTC),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["measurement"], "CO2");
        assert_eq!(json["tags"]["device"], "BLE_Thingy_AA:BB:CC:DD:EE:FF");
        assert_eq!(json["time"], "2024-05-01T12:30:00Z");
        assert_eq!(json["fields"]["value"], 400.0);
    }
}
