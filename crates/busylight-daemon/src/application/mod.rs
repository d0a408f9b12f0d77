//! Application layer: everything that has state or timing.
//!
//! All state lives inside one [`service::BusylightService`] that runs as a
//! single task.  Timers, hot-plug notifications, inbound telemetry, and
//! caller commands all arrive as events on one channel, so nothing in here
//! needs a lock.

pub mod directory;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod timers;
pub mod transport;
