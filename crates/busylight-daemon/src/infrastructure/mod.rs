//! Infrastructure layer: concrete transports, hot-plug watching, config
//! storage, and the control surface.

pub mod control;
pub mod hid;
pub mod hotplug;
pub mod storage;
