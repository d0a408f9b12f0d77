//! HID transport implementations.
//!
//! - [`simulated`] keeps devices in memory and records every frame.  The
//!   daemon uses it for `--simulate`, and the tests use it everywhere.
//! - [`usb`] (feature `usb`) talks to real hardware through libusb.

pub mod simulated;

#[cfg(feature = "usb")]
pub mod usb;

pub use simulated::SimulatedHidTransport;

#[cfg(feature = "usb")]
pub use usb::{watch_usb_hotplug, UsbHidTransport, UsbHotplugWatch};
