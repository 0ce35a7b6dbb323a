//! Bluetooth Module
//!
//! BLE communication with the Thingy:52 environment service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SessionOrchestrator                     │
//! │  (connect -> configure -> subscribe -> observe -> idle)  │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │ Transport  │ │   Router   │ │  Protocol  │
//! │            │ │            │ │            │
//! │ - connect  │ │ - UUID ->  │ │ - UUIDs    │
//! │ - write    │ │   decoder  │ │ - decode   │
//! │ - notify   │ │            │ │ - encode   │
//! └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Characteristic UUIDs and the binary frame codec
//! - [`router`] - Notification dispatch to the codec
//! - [`transport`] - Transport traits used by the session
//! - [`connection`] - `btleplug` implementation of the transport
//! - [`session`] - The session orchestrator
//! - [`led`] - LED indicator commands

pub mod connection;
pub mod led;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;

// Re-export main service for convenience
pub use session::{SessionConfig, SessionOrchestrator};
