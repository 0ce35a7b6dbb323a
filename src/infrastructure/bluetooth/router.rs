//! Notification Router
//!
//! Dispatches raw notification frames to the matching decoder.

use crate::domain::models::{Channel, RawFrame, SensorReading};
use crate::infrastructure::bluetooth::protocol;
use tracing::{debug, info, trace, warn};

/// Stateless dispatcher from characteristic UUID to decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationRouter;

impl NotificationRouter {
    pub fn new() -> Self {
        Self
    }

    /// Decode a frame, or return `None` if it carries no reading.
    ///
    /// Malformed frames are logged and dropped here so that a single bad
    /// notification never reaches the session.
    pub fn route(&self, frame: &RawFrame) -> Option<SensorReading> {
        trace!(channel = %frame.channel_id, "Raw frame: {:02X?}", frame.payload);

        let Some(channel) = Channel::from_uuid(frame.channel_id) else {
            debug!(channel = %frame.channel_id, "Ignoring notification from unknown channel");
            return None;
        };

        match protocol::decode(channel, &frame.payload) {
            Ok(Some(reading)) => {
                info!("{}", reading);
                Some(reading)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::protocol::{
        AIR_QUALITY_UUID, CONFIG_UUID, HUMIDITY_UUID, TEMPERATURE_UUID,
    };
    use uuid::Uuid;

    #[test]
    fn test_route_by_channel() {
        let router = NotificationRouter::new();
        assert_eq!(
            router.route(&RawFrame::new(HUMIDITY_UUID, [0x2C])),
            Some(SensorReading::Humidity(44))
        );
        assert_eq!(
            router.route(&RawFrame::new(AIR_QUALITY_UUID, [0xE8, 0x03, 0x2C, 0x01])),
            Some(SensorReading::AirQuality {
                eco2_ppm: 1000,
                tvoc_ppb: 300
            })
        );
    }

    #[test]
    fn test_unknown_channel_is_ignored() {
        let router = NotificationRouter::new();
        let unknown = Uuid::from_u128(0x1234);
        assert_eq!(router.route(&RawFrame::new(unknown, [0x01, 0x02])), None);
        assert_eq!(router.route(&RawFrame::new(CONFIG_UUID, [0x01])), None);
    }

    #[test]
    fn test_malformed_frame_is_suppressed() {
        let router = NotificationRouter::new();
        assert_eq!(router.route(&RawFrame::new(AIR_QUALITY_UUID, [0xE8])), None);
        // Router keeps working afterwards
        assert_eq!(
            router.route(&RawFrame::new(HUMIDITY_UUID, [0x10])),
            Some(SensorReading::Humidity(16))
        );
    }

    #[test]
    fn test_routing_is_idempotent() {
        let router = NotificationRouter::new();
        let frame = RawFrame::new(TEMPERATURE_UUID, [0x16, 0x23]);
        let first = router.route(&frame);
        let second = router.route(&frame);
        assert!(first.is_some());
        assert_eq!(first, second);
    }
}
