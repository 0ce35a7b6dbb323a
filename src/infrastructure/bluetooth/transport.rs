//! Transport seam between the session logic and a BLE stack.

use crate::domain::models::RawFrame;
use crate::error::TransportError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opens links to a peripheral by address.
#[async_trait]
pub trait BleTransport: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Connection, TransportError>;
}

/// An open GATT link to one peripheral.
#[async_trait]
pub trait BleLink: Send + Sync {
    /// Write with response; returns once the peripheral acknowledged.
    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<(), TransportError>;

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError>;

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), TransportError>;

    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}

/// Result of a successful connect: the link plus its inbound notifications.
pub struct Connection {
    pub link: Box<dyn BleLink>,
    pub frames: mpsc::Receiver<RawFrame>,
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory transport that records every link operation.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Op {
        Connect(String),
        Write(Uuid, Vec<u8>),
        Subscribe(Uuid),
        Unsubscribe(Uuid),
        Close,
    }

    /// What the next connect attempt does.
    #[derive(Debug, Clone)]
    pub enum Script {
        /// Connect and deliver these frames once subscribed.
        Connect(Vec<RawFrame>),
        Fail,
        NoAdapter,
        /// Never complete the connect.
        Hang,
        /// Connect, but reject writes to this characteristic.
        RejectWrite(Uuid),
        /// Connect, but never acknowledge writes to this characteristic.
        StallWrite(Uuid),
        /// Connect, but refuse to subscribe to this characteristic.
        RejectSubscribe(Uuid),
    }

    /// Misbehaviour of a connected link.
    #[derive(Debug, Clone, Copy)]
    enum Fault {
        RejectWrite(Uuid),
        StallWrite(Uuid),
        RejectSubscribe(Uuid),
    }

    #[derive(Clone, Default)]
    pub struct MockTransport {
        ops: Arc<Mutex<Vec<Op>>>,
        scripts: Arc<Mutex<VecDeque<Script>>>,
    }

    impl MockTransport {
        pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
            Self {
                ops: Arc::default(),
                scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            }
        }

        pub fn ops(&self) -> Vec<Op> {
            self.ops.lock().unwrap().clone()
        }

        fn record(&self, op: Op) {
            self.ops.lock().unwrap().push(op);
        }
    }

    #[async_trait]
    impl BleTransport for MockTransport {
        async fn connect(&self, address: &str) -> Result<Connection, TransportError> {
            self.record(Op::Connect(address.to_string()));
            // Once the script runs out, every further connect succeeds quietly.
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Connect(Vec::new()));

            let (frames, fault) = match script {
                Script::Connect(frames) => (frames, None),
                Script::RejectWrite(uuid) => (Vec::new(), Some(Fault::RejectWrite(uuid))),
                Script::StallWrite(uuid) => (Vec::new(), Some(Fault::StallWrite(uuid))),
                Script::RejectSubscribe(uuid) => {
                    (Vec::new(), Some(Fault::RejectSubscribe(uuid)))
                }
                Script::Fail => return Err(TransportError::Rejected("link refused".into())),
                Script::NoAdapter => return Err(TransportError::NoAdapter),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    return Err(TransportError::Rejected("hung".into()));
                }
            };

            let (sender, receiver) = mpsc::channel(16);
            Ok(Connection {
                link: Box::new(MockLink {
                    transport: self.clone(),
                    pending: Mutex::new(frames),
                    sender,
                    fault,
                }),
                frames: receiver,
            })
        }
    }

    struct MockLink {
        transport: MockTransport,
        pending: Mutex<Vec<RawFrame>>,
        sender: mpsc::Sender<RawFrame>,
        fault: Option<Fault>,
    }

    #[async_trait]
    impl BleLink for MockLink {
        async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<(), TransportError> {
            self.transport
                .record(Op::Write(characteristic, payload.to_vec()));
            match self.fault {
                Some(Fault::RejectWrite(uuid)) if uuid == characteristic => {
                    Err(TransportError::Rejected("write not permitted".into()))
                }
                Some(Fault::StallWrite(uuid)) if uuid == characteristic => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(TransportError::Rejected("stalled".into()))
                }
                _ => Ok(()),
            }
        }

        async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
            self.transport.record(Op::Subscribe(characteristic));
            if matches!(self.fault, Some(Fault::RejectSubscribe(uuid)) if uuid == characteristic) {
                return Err(TransportError::Rejected("notifications not permitted".into()));
            }
            let frames = {
                let mut pending = self.pending.lock().unwrap();
                let (ready, rest): (Vec<RawFrame>, Vec<RawFrame>) = pending
                    .drain(..)
                    .partition(|frame| frame.channel_id == characteristic);
                *pending = rest;
                ready
            };
            for frame in frames {
                let _ = self.sender.try_send(frame);
            }
            Ok(())
        }

        async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
            self.transport.record(Op::Unsubscribe(characteristic));
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<(), TransportError> {
            self.transport.record(Op::Close);
            Ok(())
        }
    }
}
