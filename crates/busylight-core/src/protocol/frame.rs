//! Wire layout of the 65-byte output report.
//!
//! ```text
//! [report id: 1 = 0x00][slot 0..6: 7 x 8 bytes][trailer: 8 bytes]
//! ```
//!
//! The trailer slot is fixed (`04 04 55 FF FF FF 00 00`).  When the frame is
//! finalised by [`crate::protocol::codec::checksum_frame`], the last two
//! trailer bytes are replaced by a 16-bit checksum.

use std::fmt;

/// Bytes in one program step.
pub const STEP_LEN: usize = 8;

/// Program slots available to callers.
pub const STEP_SLOTS: usize = 7;

/// Payload length (slots plus trailer), excluding the report id.
pub const PAYLOAD_LEN: usize = 64;

/// Full frame length including the leading report id.
pub const FRAME_LEN: usize = PAYLOAD_LEN + 1;

/// Offset of the trailer slot within the payload.
pub const TRAILER_OFFSET: usize = STEP_SLOTS * STEP_LEN;

/// Fixed contents of the eighth slot.
pub const TRAILER: [u8; STEP_LEN] = [0x04, 0x04, 0x55, 0xFF, 0xFF, 0xFF, 0x00, 0x00];

/// Payload that refreshes the firmware watchdog without changing the program.
pub const KEEPALIVE_PAYLOAD: [u8; PAYLOAD_LEN] =
    payload_with_first_slot([0x8F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

/// Payload that darkens the device and silences the buzzer.
pub const OFF_PAYLOAD: [u8; PAYLOAD_LEN] =
    payload_with_first_slot([0x10, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80]);

const fn payload_with_first_slot(slot: [u8; STEP_LEN]) -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    let mut i = 0;
    while i < STEP_LEN {
        payload[i] = slot[i];
        payload[TRAILER_OFFSET + i] = TRAILER[i];
        i += 1;
    }
    payload
}

/// The 64-byte program payload a session holds and re-sends.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepBuffer(pub [u8; PAYLOAD_LEN]);

impl StepBuffer {
    pub const OFF: StepBuffer = StepBuffer(OFF_PAYLOAD);
    pub const KEEPALIVE: StepBuffer = StepBuffer(KEEPALIVE_PAYLOAD);

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    /// The 8 bytes of slot `index` (0..=7, 7 being the trailer).
    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(STEP_LEN)?;
        self.0.get(start..start.checked_add(STEP_LEN)?)
    }
}

impl Default for StepBuffer {
    fn default() -> Self {
        Self::OFF
    }
}

/// Eight lines of eight lower-case hex bytes, each followed by a space.
impl fmt::Display for StepBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.0.chunks(STEP_LEN) {
            for byte in row {
                write!(f, "{byte:02x} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for StepBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepBuffer(\n{self})")
    }
}
