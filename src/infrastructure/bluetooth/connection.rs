//! BLE Connection Module
//!
//! `btleplug`-backed transport: resolves the configured address, connects,
//! discovers GATT characteristics and forwards notifications into a bounded
//! channel.

use crate::domain::models::RawFrame;
use crate::error::TransportError;
use crate::infrastructure::bluetooth::transport::{BleLink, BleTransport, Connection};
use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Delay between peripheral list polls while looking for the device
const SCAN_POLL_MS: u64 = 250;

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long to scan for the address before giving up
    pub scan_timeout: Duration,
    /// Bound on each link step: connect, service discovery, disconnect
    pub link_timeout: Duration,
    /// Capacity of the inbound notification channel
    pub notification_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(15),
            link_timeout: Duration::from_secs(10),
            notification_queue_capacity: 64,
        }
    }
}

/// Transport over the platform Bluetooth stack.
pub struct BtleplugTransport {
    manager: Manager,
    config: ConnectionConfig,
}

impl BtleplugTransport {
    pub async fn new(config: ConnectionConfig) -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        Ok(Self { manager, config })
    }

    async fn adapter(&self) -> Result<Adapter, TransportError> {
        self.manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)
    }

    /// Poll the adapter's peripheral list until one matches the address.
    ///
    /// Matches the link-layer address where the platform exposes it and
    /// falls back to the platform peripheral id (macOS hides addresses).
    async fn find_peripheral(
        &self,
        adapter: &Adapter,
        address: &str,
    ) -> Result<Peripheral, TransportError> {
        let deadline = tokio::time::Instant::now() + self.config.scan_timeout;

        loop {
            for peripheral in adapter.peripherals().await? {
                let id_matches = peripheral.id().to_string().eq_ignore_ascii_case(address);
                let address_matches = peripheral
                    .properties()
                    .await?
                    .map(|p| p.address.to_string().eq_ignore_ascii_case(address))
                    .unwrap_or(false);

                if id_matches || address_matches {
                    return Ok(peripheral);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(TransportError::DeviceNotFound {
                    address: address.to_string(),
                    timeout: self.config.scan_timeout,
                });
            }
            tokio::time::sleep(Duration::from_millis(SCAN_POLL_MS)).await;
        }
    }

    /// Connect, discover services and open the notification stream.
    async fn open(
        &self,
        peripheral: &Peripheral,
    ) -> Result<(BTreeSet<Characteristic>, NotificationStream), TransportError> {
        let limit = self.config.link_timeout;
        if !peripheral.is_connected().await? {
            bounded(limit, peripheral.connect()).await?;
        }
        bounded(limit, peripheral.discover_services()).await?;
        let characteristics = peripheral.characteristics();
        info!("Found {} characteristics", characteristics.len());

        let notifications = bounded(limit, peripheral.notifications()).await?;
        Ok((characteristics, notifications))
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn connect(&self, address: &str) -> Result<Connection, TransportError> {
        info!("Connecting to Bluetooth device: {}", address);

        // Step 1: Find the device
        let adapter = self.adapter().await?;
        let scan = ScanGuard::start(&adapter).await?;
        let found = self.find_peripheral(&adapter, address).await;
        scan.stop().await;
        let peripheral = found?;

        // Step 2: Connect and discover characteristics
        let pending = PendingLink::new(peripheral.clone());
        let (characteristics, mut notifications) = match self.open(&peripheral).await {
            Ok(opened) => opened,
            Err(e) => {
                pending.disconnect(self.config.link_timeout).await;
                return Err(e);
            }
        };
        pending.hand_over();

        // Step 3: Forward notifications into a bounded channel
        let (sender, frames) = mpsc::channel(self.config.notification_queue_capacity);
        let forwarder = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let frame = RawFrame::new(notification.uuid, notification.value);
                if sender.send(frame).await.is_err() {
                    break;
                }
            }
            debug!("Notification stream ended");
        });

        Ok(Connection {
            link: Box::new(BtleplugLink {
                peripheral,
                characteristics,
                forwarder,
            }),
            frames,
        })
    }
}

async fn bounded<T, F>(limit: Duration, step: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, btleplug::Error>>,
{
    tokio::time::timeout(limit, step)
        .await
        .map_err(|_| TransportError::Timeout(limit))?
        .map_err(TransportError::from)
}

/// Run cleanup from a `Drop` impl, if a runtime is still around.
fn spawn_cleanup<F>(task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => warn!("No runtime left to run Bluetooth cleanup"),
    }
}

/// Active scan. Stopped on [`ScanGuard::stop`] or, if the connect is
/// cancelled mid-scan, when dropped.
struct ScanGuard {
    adapter: Option<Adapter>,
}

impl ScanGuard {
    async fn start(adapter: &Adapter) -> Result<Self, TransportError> {
        adapter.start_scan(ScanFilter::default()).await?;
        Ok(Self {
            adapter: Some(adapter.clone()),
        })
    }

    async fn stop(mut self) {
        if let Some(adapter) = self.adapter.take() {
            if let Err(e) = adapter.stop_scan().await {
                debug!("Failed to stop scan cleanly: {}", e);
            }
        }
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if let Some(adapter) = self.adapter.take() {
            spawn_cleanup(async move {
                if let Err(e) = adapter.stop_scan().await {
                    debug!("Failed to stop abandoned scan: {}", e);
                }
            });
        }
    }
}

/// A peripheral that is connecting but not yet owned by a [`BtleplugLink`].
/// Disconnected when dropped unless handed over.
struct PendingLink {
    peripheral: Option<Peripheral>,
}

impl PendingLink {
    fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral: Some(peripheral),
        }
    }

    fn hand_over(mut self) {
        self.peripheral = None;
    }

    async fn disconnect(mut self, limit: Duration) {
        if let Some(peripheral) = self.peripheral.take() {
            if let Err(e) = bounded(limit, peripheral.disconnect()).await {
                warn!("Failed to drop half-open link: {}", e);
            }
        }
    }
}

impl Drop for PendingLink {
    fn drop(&mut self) {
        if let Some(peripheral) = self.peripheral.take() {
            warn!("Connect abandoned, disconnecting half-open link");
            spawn_cleanup(async move {
                if let Err(e) = peripheral.disconnect().await {
                    warn!("Failed to drop half-open link: {}", e);
                }
            });
        }
    }
}

struct BtleplugLink {
    peripheral: Peripheral,
    characteristics: BTreeSet<Characteristic>,
    forwarder: JoinHandle<()>,
}

impl BtleplugLink {
    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic, TransportError> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }
}

#[async_trait]
impl BleLink for BtleplugLink {
    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<(), TransportError> {
        let c = self.characteristic(characteristic)?;
        self.peripheral
            .write(c, payload, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let c = self.characteristic(characteristic)?;
        self.peripheral.subscribe(c).await?;
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let c = self.characteristic(characteristic)?;
        self.peripheral.unsubscribe(c).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.forwarder.abort();
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        } else {
            warn!("Device already disconnected");
        }
        info!("Disconnected from device");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stalled_link_step_times_out() {
        let limit = Duration::from_millis(20);
        let result = bounded(limit, std::future::pending::<Result<(), btleplug::Error>>()).await;
        assert!(matches!(result, Err(TransportError::Timeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn test_link_step_errors_pass_through() {
        let result = bounded(Duration::from_secs(1), async {
            Err::<(), _>(btleplug::Error::DeviceNotFound)
        })
        .await;
        assert!(matches!(
            result,
            Err(TransportError::Btleplug(btleplug::Error::DeviceNotFound))
        ));

        let value = bounded(Duration::from_secs(1), async { Ok::<_, btleplug::Error>(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }
}
