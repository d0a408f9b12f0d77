//! busylight-daemon library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # Layers
//!
//! ```text
//! infrastructure/  USB + simulated HID transports, hot-plug polling,
//!                  TOML config, WebSocket control surface
//! application/     device sessions, program scheduler, device directory,
//!                  timers, and the single event loop that owns them
//! busylight-core   frame codec, telemetry decoding, device catalog
//! ```

pub mod application;
pub mod infrastructure;
