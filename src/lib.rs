//! Environmental telemetry monitor for the Nordic Thingy:52 sensor hub.
//!
//! Connects over BLE, pushes the environment configuration, collects
//! temperature, humidity and air-quality notifications for an observation
//! window, then disconnects and idles before the next cycle.

pub mod domain;
pub mod error;
pub mod infrastructure;
