//! Protocol module containing the program step model, the frame layout, and
//! the codec that converts between them.

pub mod codec;
pub mod frame;
pub mod step;
pub mod telemetry;

pub use codec::{checksum_frame, decode_telemetry, encode_program, encode_step};
pub use frame::*;
pub use step::{ProgramStep, StepCommand};
pub use telemetry::{ProductKind, TelemetryReport};
