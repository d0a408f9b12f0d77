//! Domain module: device catalog, colors, and status rules.
//!
//! Nothing in here performs I/O.  The daemon crate combines these rules with
//! a HID transport and timers.

pub mod color;
pub mod device;
pub mod model;
pub mod status;
