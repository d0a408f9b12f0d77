//! # busylight-core
//!
//! Shared library for the Busylight daemon containing the command frame
//! codec, the telemetry decoder, and the device catalog (models, tones,
//! logical ids, and the status-state table).
//!
//! It has zero dependencies on OS APIs, USB libraries, timers, or sockets:
//! everything in here is a pure function of its inputs, which makes it easy
//! to test and to benchmark.
//!
//! # Architecture overview (for beginners)
//!
//! A Busylight is a USB status light with a color LED and a small buzzer.
//! The host talks to it through HID *output reports*: fixed-size 65-byte
//! frames that carry a tiny program of up to seven steps.  The firmware loops
//! through those steps on its own; the host only has to refresh the program
//! and send a keepalive every few seconds.
//!
//! - **`protocol`** – How bytes travel to and from the device.  A
//!   [`ProgramStep`] is packed into 8 bytes, up to seven of them form the
//!   payload, and [`checksum_frame`] turns the payload into the final frame.
//!   Inbound reports are decoded into a [`TelemetryReport`].
//!
//! - **`domain`** – Business rules with no I/O: color parsing and intensity
//!   scaling, the per-model tone catalog, operator aliases and logical device
//!   ids, and the table that maps a status such as `"warning"` to a color and
//!   a tone.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `busylight_core::ProgramStep` instead of the full module path.
pub use domain::color::{parse_color, ColorError, Rgb};
pub use domain::device::{logical_device_id, AliasError, DeviceAlias, DeviceDescriptor};
pub use domain::model::{BusylightModel, ToneCatalog, PRODUCT_IDS, VENDOR_ID};
pub use domain::status::{AudioChoice, DeviceState, Pattern, StatusError};
pub use protocol::codec::{checksum_frame, decode_telemetry, encode_program, encode_step};
pub use protocol::frame::{StepBuffer, FRAME_LEN, PAYLOAD_LEN};
pub use protocol::step::{ProgramStep, StepCommand};
pub use protocol::telemetry::{ProductKind, TelemetryReport};
