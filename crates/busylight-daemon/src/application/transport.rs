//! Ports to the HID access layer.
//!
//! The application never touches USB directly.  It talks to a
//! [`HidTransport`] that can enumerate devices and open them, and to the
//! [`HidChannel`] that `open` returns.  Any call may fail; the session treats
//! every failure as "not connected" and retries on its next keepalive tick.

use busylight_core::DeviceDescriptor;
use thiserror::Error;

/// Callback invoked with each inbound report read from an open channel.
///
/// May run on a transport-owned thread, so it must be `Send + Sync`.
pub type DataHook = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Errors reported by a transport or channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("device enumeration failed: {0}")]
    Enumerate(String),

    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("write to {path} failed: {reason}")]
    Write { path: String, reason: String },

    #[error("channel is closed")]
    Closed,
}

/// Enumerates and opens HID devices.
#[cfg_attr(test, mockall::automock)]
pub trait HidTransport: Send + Sync {
    /// Lists every attached HID device.  Filtering to supported models is the
    /// caller's job.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, TransportError>;

    /// Opens the device at `path`.  `on_data` receives every inbound report
    /// until the channel is closed.
    fn open(&self, path: &str, on_data: DataHook) -> Result<Box<dyn HidChannel>, TransportError>;
}

/// One open device.
#[cfg_attr(test, mockall::automock)]
pub trait HidChannel: Send {
    /// Writes one complete output report, report id included.
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Releases the device.  Safe to call more than once.
    fn close(&mut self);
}
