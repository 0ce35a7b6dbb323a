//! Error types shared across the crate.
//!
//! Per-frame problems ([`FrameError`]) stay inside the notification router.
//! Per-cycle problems ([`SessionError`]) end the current session cycle and are
//! reported before the orchestrator schedules the next one.

use crate::domain::models::Channel;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a BLE transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    #[error("device {address} not found within {timeout:?}")]
    DeviceNotFound { address: String, timeout: Duration },

    #[error("characteristic {0} not exposed by the device")]
    CharacteristicNotFound(Uuid),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("link rejected the operation: {0}")]
    Rejected(String),

    #[error(transparent)]
    Btleplug(#[from] btleplug::Error),
}

/// Decode-time failure for a single notification frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed {channel:?} frame: expected {expected} bytes, got {actual}")]
    MalformedFrame {
        channel: Channel,
        expected: &'static str,
        actual: usize,
    },
}

/// A configuration value outside the range the device accepts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: u16,
        min: u16,
        max: u16,
    },

    #[error("unknown gas mode {0} (expected 1, 2 or 3)")]
    UnknownGasMode(u8),

    #[error("max connection interval {max} is below min connection interval {min}")]
    MaxIntervalBelowMin { min: u16, max: u16 },

    #[error(
        "supervision timeout {timeout_ms} ms must exceed (1 + latency) * max interval * 2 = {required_ms} ms"
    )]
    SupervisionTimeoutTooShort { timeout_ms: u32, required_ms: f64 },
}

/// Failure of one orchestration cycle (or of the attempt to start one).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection to {address} failed: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("write to {characteristic} failed: {source}")]
    WriteFailed {
        characteristic: Uuid,
        #[source]
        source: TransportError,
    },

    #[error("a session is already active on this orchestrator")]
    SessionAlreadyActive,
}

impl SessionError {
    /// Errors that no amount of retrying will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectionFailed {
                source: TransportError::NoAdapter,
                ..
            }
        )
    }
}

/// Failure while handing a record to a persistence sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_adapter_is_fatal() {
        let err = SessionError::ConnectionFailed {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            source: TransportError::NoAdapter,
        };
        assert!(err.is_fatal());

        let err = SessionError::ConnectionFailed {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            source: TransportError::Timeout(Duration::from_secs(1)),
        };
        assert!(!err.is_fatal());
        assert!(!SessionError::SessionAlreadyActive.is_fatal());
    }
}
