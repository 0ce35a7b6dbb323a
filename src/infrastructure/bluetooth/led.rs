//! LED indicator commands for the companion Nordic board.
//!
//! The indicator is a separate peripheral: each command opens its own link,
//! writes one byte and disconnects.

use crate::error::{SessionError, TransportError};
use crate::infrastructure::bluetooth::transport::BleTransport;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// LED control characteristic on the indicator board
pub const LED_CONTROL_UUID: Uuid = Uuid::from_u128(0xABCD1234_5678_5678_5678_1234567890AB);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCommand {
    AllOff,
    Led1On,
    Led2On,
    Led3On,
    Led4On,
    Led1Off,
    Led2Off,
    Led3Off,
    Led4Off,
}

impl LedCommand {
    /// Get the raw bytes for this command
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::AllOff => &[0x00],
            Self::Led1On => &[0x01],
            Self::Led2On => &[0x02],
            Self::Led3On => &[0x03],
            Self::Led4On => &[0x04],
            Self::Led1Off => &[0x05],
            Self::Led2Off => &[0x06],
            Self::Led3Off => &[0x07],
            Self::Led4Off => &[0x08],
        }
    }
}

pub struct LedIndicator<T> {
    transport: T,
    address: String,
    timeout: Duration,
}

impl<T: BleTransport> LedIndicator<T> {
    pub fn new(transport: T, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect, write the command, disconnect.
    pub async fn send(&self, command: LedCommand) -> Result<(), SessionError> {
        let connection = tokio::time::timeout(self.timeout, self.transport.connect(&self.address))
            .await
            .unwrap_or(Err(TransportError::Timeout(self.timeout)))
            .map_err(|source| SessionError::ConnectionFailed {
                address: self.address.clone(),
                source,
            })?;
        info!("Connected to {}", self.address);

        let link = connection.link;
        let written = tokio::time::timeout(
            self.timeout,
            link.write(LED_CONTROL_UUID, command.as_bytes()),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout(self.timeout)));

        if let Err(e) = link.close().await {
            warn!("Failed to close LED indicator link: {}", e);
        }

        written.map_err(|source| SessionError::WriteFailed {
            characteristic: LED_CONTROL_UUID,
            source,
        })?;
        info!("LED command {:?} sent", command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::transport::mock::{MockTransport, Op, Script};

    #[test]
    fn test_command_bytes() {
        assert_eq!(LedCommand::AllOff.as_bytes(), &[0x00]);
        assert_eq!(LedCommand::Led1On.as_bytes(), &[0x01]);
        assert_eq!(LedCommand::Led4Off.as_bytes(), &[0x08]);
    }

    #[tokio::test]
    async fn test_send_writes_and_disconnects() {
        let transport = MockTransport::new([]);
        let indicator = LedIndicator::new(transport.clone(), "C0:FF:EE:00:00:01");

        indicator.send(LedCommand::Led2On).await.unwrap();
        assert_eq!(
            transport.ops(),
            vec![
                Op::Connect("C0:FF:EE:00:00:01".to_string()),
                Op::Write(LED_CONTROL_UUID, vec![0x02]),
                Op::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_write_still_disconnects() {
        let transport = MockTransport::new([Script::RejectWrite(LED_CONTROL_UUID)]);
        let indicator = LedIndicator::new(transport.clone(), "C0:FF:EE:00:00:01");

        let result = indicator.send(LedCommand::AllOff).await;
        assert!(matches!(result, Err(SessionError::WriteFailed { .. })));
        assert_eq!(transport.ops().last(), Some(&Op::Close));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let transport = MockTransport::new([Script::Fail]);
        let indicator = LedIndicator::new(transport.clone(), "C0:FF:EE:00:00:01")
            .with_timeout(Duration::from_millis(100));

        let result = indicator.send(LedCommand::Led1On).await;
        assert!(matches!(result, Err(SessionError::ConnectionFailed { .. })));
    }
}
