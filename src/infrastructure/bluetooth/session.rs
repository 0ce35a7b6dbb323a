//! Session Orchestrator
//!
//! Drives the repeating cycle against one sensor hub:
//!
//! ```text
//! Connecting -> Connected -> Configuring -> Subscribed -> Observing
//!      ^                                                     |
//!      |                                                     v
//!     Idle <-------------------------------------------- Unsubscribing
//! ```
//!
//! A failed cycle is logged and the next one starts after the idle period.
//! Every wait observes the shutdown signal; on shutdown the orchestrator
//! unsubscribes and closes the link before returning.

use crate::domain::models::{Channel, RawFrame, ReadingRecord, SessionEvent, SessionState};
use crate::domain::settings::{ConnectionSettings, EnvironmentSettings, Settings};
use crate::error::{SessionError, TransportError};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::router::NotificationRouter;
use crate::infrastructure::bluetooth::transport::{BleLink, BleTransport, Connection};
use crate::infrastructure::persistence::ReadingSink;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runtime configuration of the orchestrator.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device_address: String,
    pub observation_window: Duration,
    pub idle_period: Duration,
    pub connect_timeout: Duration,
    /// Bound on each write, subscribe and unsubscribe
    pub write_timeout: Duration,
    /// Pause after connecting and between the two configuration writes
    pub settle_delay: Duration,
    pub environment: EnvironmentSettings,
    pub connection: ConnectionSettings,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        if settings.device_address.trim().is_empty() {
            anyhow::bail!(
                "No device address configured (set {} or device_address in settings)",
                crate::domain::settings::DEVICE_ADDRESS_ENV
            );
        }

        Ok(Self {
            device_address: settings.device_address.trim().to_string(),
            observation_window: Duration::from_secs(settings.observation_window_secs),
            idle_period: Duration::from_secs(settings.idle_period_secs),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            write_timeout: Duration::from_secs(settings.write_timeout_secs),
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
            environment: settings.environment.clone(),
            connection: settings.connection.clone(),
        })
    }
}

/// How a single cycle ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    Shutdown,
}

pub struct SessionOrchestrator<T> {
    transport: T,
    config: SessionConfig,
    router: NotificationRouter,
    sink: Arc<dyn ReadingSink>,
    event_sender: Option<mpsc::UnboundedSender<SessionEvent>>,
    state: watch::Sender<SessionState>,
    active: Mutex<()>,
}

impl<T: BleTransport> SessionOrchestrator<T> {
    pub fn new(transport: T, config: SessionConfig, sink: Arc<dyn ReadingSink>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            transport,
            config,
            router: NotificationRouter::new(),
            sink,
            event_sender: None,
            state,
            active: Mutex::new(()),
        }
    }

    /// Report state changes, readings and cycle failures on this channel.
    pub fn with_event_sender(mut self, sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Run cycles until shutdown is requested or setup fails for good.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SessionError> {
        let _active = self
            .active
            .try_lock()
            .map_err(|_| SessionError::SessionAlreadyActive)?;
        info!(address = %self.config.device_address, "Starting session loop");

        loop {
            match self.cycle(&mut shutdown).await {
                Ok(CycleOutcome::Completed) => {}
                Ok(CycleOutcome::Shutdown) => break,
                Err(e) if e.is_fatal() => {
                    error!("Session cannot continue: {}", e);
                    self.transition(SessionState::Terminated);
                    return Err(e);
                }
                Err(e) => {
                    error!("Session cycle failed: {}", e);
                    self.emit(SessionEvent::CycleFailed(e.to_string()));
                }
            }

            self.transition(SessionState::Idle);
            let idle = tokio::time::sleep(self.config.idle_period);
            if until_shutdown(&mut shutdown, idle).await.is_none() {
                break;
            }
        }

        info!("Shutdown requested, session loop stopped");
        self.transition(SessionState::Terminated);
        Ok(())
    }

    /// Run exactly one cycle, leaving the link closed afterwards.
    pub async fn run_cycle(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome, SessionError> {
        let _active = self
            .active
            .try_lock()
            .map_err(|_| SessionError::SessionAlreadyActive)?;
        self.cycle(shutdown).await
    }

    async fn cycle(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome, SessionError> {
        self.transition(SessionState::Connecting);

        let address = self.config.device_address.as_str();
        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            self.transport.connect(address),
        );
        let source = match until_shutdown(shutdown, connect).await {
            None => {
                self.transition(SessionState::Disconnected);
                return Ok(CycleOutcome::Shutdown);
            }
            Some(Ok(Ok(connection))) => return self.session(connection, shutdown).await,
            Some(Ok(Err(source))) => source,
            Some(Err(_)) => TransportError::Timeout(self.config.connect_timeout),
        };

        self.transition(SessionState::Disconnected);
        Err(SessionError::ConnectionFailed {
            address: address.to_string(),
            source,
        })
    }

    /// Everything between a successful connect and the closed link.
    async fn session(
        &self,
        connection: Connection,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome, SessionError> {
        self.transition(SessionState::Connected);
        let Connection { link, mut frames } = connection;

        let mut subscribed = Vec::new();
        let result = self
            .configure_and_observe(link.as_ref(), &mut frames, &mut subscribed, shutdown)
            .await;

        drop(frames);
        self.teardown(link, &subscribed).await;
        if result.is_err() {
            self.transition(SessionState::Disconnected);
        }
        result
    }

    async fn configure_and_observe(
        &self,
        link: &dyn BleLink,
        frames: &mut mpsc::Receiver<RawFrame>,
        subscribed: &mut Vec<Channel>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome, SessionError> {
        let Some(()) = self.settle(shutdown).await else {
            return Ok(CycleOutcome::Shutdown);
        };

        self.transition(SessionState::Configuring);

        let params = self.config.connection.to_parameters()?;
        let payload = protocol::encode_connection_parameters(&params);
        let uuid = Channel::ConnectionParameters.uuid();
        let Some(()) = self
            .acknowledged(uuid, link.write(uuid, &payload), shutdown)
            .await?
        else {
            return Ok(CycleOutcome::Shutdown);
        };
        info!("Set connection parameters");

        let Some(()) = self.settle(shutdown).await else {
            return Ok(CycleOutcome::Shutdown);
        };

        let profile = self.config.environment.to_profile()?;
        let payload = protocol::encode_configuration(&profile);
        let uuid = Channel::EnvironmentConfig.uuid();
        let Some(()) = self
            .acknowledged(uuid, link.write(uuid, &payload), shutdown)
            .await?
        else {
            return Ok(CycleOutcome::Shutdown);
        };
        info!("Set environment configuration");

        for channel in Channel::NOTIFY {
            let uuid = channel.uuid();
            let Some(()) = self
                .acknowledged(uuid, link.subscribe(uuid), shutdown)
                .await?
            else {
                return Ok(CycleOutcome::Shutdown);
            };
            subscribed.push(channel);
        }
        self.transition(SessionState::Subscribed);

        self.transition(SessionState::Observing);
        Ok(self.observe(frames, shutdown).await)
    }

    async fn observe(
        &self,
        frames: &mut mpsc::Receiver<RawFrame>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> CycleOutcome {
        let window = tokio::time::sleep(self.config.observation_window);
        tokio::pin!(window);

        loop {
            tokio::select! {
                _ = &mut window => return CycleOutcome::Completed,
                _ = wait_for_shutdown(shutdown) => return CycleOutcome::Shutdown,
                frame = frames.recv() => match frame {
                    Some(frame) => self.handle_frame(&frame).await,
                    None => {
                        warn!("Notification stream closed, ending observation early");
                        return CycleOutcome::Completed;
                    }
                },
            }
        }
    }

    async fn handle_frame(&self, frame: &RawFrame) {
        let Some(reading) = self.router.route(frame) else {
            return;
        };

        let time = OffsetDateTime::now_utc();
        for measurement in reading.measurements() {
            let record = ReadingRecord::new(measurement, &self.config.device_address, time);
            if let Err(e) = self.sink.record(&record).await {
                warn!("Failed to persist {} reading: {}", measurement.kind.as_str(), e);
            }
            self.emit(SessionEvent::Reading(record));
        }
    }

    /// Unsubscribe and close. Runs to completion even during shutdown;
    /// each step is bounded by the write timeout.
    async fn teardown(&self, link: Box<dyn BleLink>, subscribed: &[Channel]) {
        if !subscribed.is_empty() {
            self.transition(SessionState::Unsubscribing);
        }

        for channel in subscribed {
            let uuid = channel.uuid();
            match tokio::time::timeout(self.config.write_timeout, link.unsubscribe(uuid)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to unsubscribe {:?}: {}", channel, e),
                Err(_) => warn!("Unsubscribe {:?} timed out", channel),
            }
        }

        match tokio::time::timeout(self.config.write_timeout, link.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to close connection: {}", e),
            Err(_) => warn!("Closing the connection timed out"),
        }
    }

    /// Await a write-like operation under the write timeout.
    ///
    /// `Ok(None)` means shutdown was requested before the device answered.
    async fn acknowledged<F>(
        &self,
        characteristic: Uuid,
        operation: F,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<()>, SessionError>
    where
        F: Future<Output = Result<(), TransportError>>,
    {
        let timed = tokio::time::timeout(self.config.write_timeout, operation);
        match until_shutdown(shutdown, timed).await {
            None => Ok(None),
            Some(Ok(Ok(()))) => Ok(Some(())),
            Some(Ok(Err(source))) => Err(SessionError::WriteFailed {
                characteristic,
                source,
            }),
            Some(Err(_)) => Err(SessionError::WriteFailed {
                characteristic,
                source: TransportError::Timeout(self.config.write_timeout),
            }),
        }
    }

    async fn settle(&self, shutdown: &mut watch::Receiver<bool>) -> Option<()> {
        until_shutdown(shutdown, tokio::time::sleep(self.config.settle_delay)).await
    }

    fn transition(&self, state: SessionState) {
        info!("Session state: {:?}", state);
        self.state.send_replace(state);
        self.emit(SessionEvent::State(state));
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }
}

/// Resolve `future`, or `None` if shutdown is requested first.
async fn until_shutdown<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    future: F,
) -> Option<F::Output> {
    let stop = *shutdown.borrow();
    if stop {
        return None;
    }
    tokio::select! {
        output = future => Some(output),
        _ = wait_for_shutdown(shutdown) => None,
    }
}

/// Completes once the shutdown flag is set. A dropped sender never fires.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
