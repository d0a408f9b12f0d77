//! Encoding of program steps into output reports, and decoding of input
//! reports into [`TelemetryReport`]s.
//!
//! Step wire format (8 bytes per slot):
//! ```text
//! [cmd|arg:1][repeat:1][red:1][green:1][blue:1][on:1][off:1][audio:1]
//! audio = 0x00                      audio disabled
//!       = 0x80                      armed, no tone (or volume 0)
//!       = 0x80 | tone<<3 | volume   playing
//! ```
//!
//! None of these functions can fail: unknown commands are skipped, surplus
//! steps are dropped, and short telemetry yields empty fields.

use tracing::trace;

use crate::protocol::frame::{StepBuffer, FRAME_LEN, PAYLOAD_LEN, STEP_LEN, STEP_SLOTS};
use crate::protocol::step::ProgramStep;
use crate::protocol::telemetry::{ProductKind, TelemetryReport};

/// Bytes a complete report carries (through the software version field).
const TELEMETRY_LEN: usize = 46;

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Packs one step into its 8-byte slot, or `None` if the command tag is not
/// one the firmware understands.
pub fn encode_step(step: &ProgramStep) -> Option<[u8; STEP_LEN]> {
    let tag = step.command.tag()?;
    let audio = match (step.audio, step.tone) {
        (false, _) => 0x00,
        (true, Some(tone)) if step.volume > 0 => {
            0x80 | ((tone & 0x0F) << 3) | (step.volume & 0x07)
        }
        (true, _) => 0x80,
    };
    Some([
        tag | (step.command_arg & 0x0F),
        step.repeat,
        step.color.red,
        step.color.green,
        step.color.blue,
        step.on_ticks,
        step.off_ticks,
        audio,
    ])
}

/// Builds the 64-byte payload for `steps`.
///
/// Encoding starts from the OFF payload, so an empty program is OFF and the
/// trailer slot is always present.  Steps with an unrecognised command are
/// skipped without using a slot; anything past the seventh slot is dropped.
///
/// # Examples
///
/// ```rust
/// use busylight_core::{encode_program, ProgramStep, Rgb, StepBuffer};
///
/// assert_eq!(encode_program(&[]), StepBuffer::OFF);
///
/// let buf = encode_program(&[ProgramStep::solid(Rgb::new(1, 2, 3))]);
/// assert_eq!(buf.slot(0), Some(&[0x10, 0, 1, 2, 3, 0xFF, 0, 0][..]));
/// ```
pub fn encode_program(steps: &[ProgramStep]) -> StepBuffer {
    let mut buffer = StepBuffer::OFF;
    let packed = steps.iter().filter_map(encode_step).take(STEP_SLOTS);
    for (slot, bytes) in packed.enumerate() {
        let start = slot * STEP_LEN;
        buffer.0[start..start + STEP_LEN].copy_from_slice(&bytes);
    }
    buffer
}

/// Produces the final 65-byte frame for a payload.
///
/// Byte 0 is the report id (always 0).  Bytes 60..=62 are forced to `0xFF`
/// as the firmware expects, then the sum of bytes 0..=62 is stored
/// big-endian in bytes 63 and 64.  The sum is purely additive, so two
/// compensating byte changes cancel out.
pub fn checksum_frame(payload: &[u8; PAYLOAD_LEN]) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[1..].copy_from_slice(payload);
    frame[60..=62].fill(0xFF);

    let sum: u16 = frame[..63]
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
    let [high, low] = sum.to_be_bytes();
    frame[63] = high;
    frame[64] = low;
    frame
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes an input report.  Never fails; missing data yields empty fields.
pub fn decode_telemetry(bytes: &[u8]) -> TelemetryReport {
    if bytes.is_empty() {
        return TelemetryReport::default();
    }
    if bytes.len() < TELEMETRY_LEN {
        trace!("short telemetry report: {} of {TELEMETRY_LEN} bytes", bytes.len());
    }

    TelemetryReport {
        activity: Some(ascii_field(bytes, 0, 0) == "1"),
        product: Some(if ascii_field(bytes, 1, 3) == "001" {
            ProductKind::Busylight
        } else {
            ProductKind::KuandoBox
        }),
        customer: ascii_field(bytes, 4, 11),
        model: ascii_field(bytes, 12, 15),
        serial: ascii_field(bytes, 16, 23),
        manufacturer: ascii_field(bytes, 24, 31),
        build_date: ascii_field(bytes, 32, 39),
        software_version: ascii_field(bytes, 40, 45),
    }
}

/// Bytes `first..=last` as characters, or empty when either boundary byte is
/// missing or zero.
fn ascii_field(bytes: &[u8], first: usize, last: usize) -> String {
    let present = |i: usize| bytes.get(i).is_some_and(|&b| b != 0);
    if !present(first) || !present(last) {
        return String::new();
    }
    bytes[first..=last].iter().map(|&b| char::from(b)).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::color::Rgb;
    use crate::protocol::frame::{KEEPALIVE_PAYLOAD, OFF_PAYLOAD, TRAILER};
    use crate::protocol::step::StepCommand;

    // ── encode_step ───────────────────────────────────────────────────────────

    #[test]
    fn test_encode_step_packs_every_field() {
        // Arrange
        let step = ProgramStep::blink(Rgb::new(0x11, 0x22, 0x33), 7, 9)
            .with_repeat(10)
            .with_jump_target(3)
            .with_audio(10, 4);

        // Act
        let bytes = encode_step(&step).unwrap();

        // Assert
        assert_eq!(bytes, [0x13, 10, 0x11, 0x22, 0x33, 7, 9, 0x80 | (10 << 3) | 4]);
    }

    #[test]
    fn test_encode_step_masks_argument_tone_and_volume() {
        let mut step = ProgramStep::jump(Rgb::BLACK).with_audio(0x1F, 0x0F);
        step.command_arg = 0xF5;
        let bytes = encode_step(&step).unwrap();
        assert_eq!(bytes[0], 0x15);
        assert_eq!(bytes[7], 0x80 | (0x0F << 3) | 0x07);
    }

    #[test]
    fn test_encode_step_audio_byte_variants() {
        let base = ProgramStep::jump(Rgb::BLACK);
        assert_eq!(encode_step(&base).unwrap()[7], 0x00);
        assert_eq!(encode_step(&ProgramStep::mute(Rgb::BLACK)).unwrap()[7], 0x80);
        // Tone chosen but volume zero: armed only.
        assert_eq!(encode_step(&base.with_audio(3, 0)).unwrap()[7], 0x80);
        // Tone data without the audio flag is ignored.
        let mut silent = base.with_audio(3, 5);
        silent.audio = false;
        assert_eq!(encode_step(&silent).unwrap()[7], 0x00);
    }

    #[test]
    fn test_encode_step_rejects_unrecognized_command() {
        let mut step = ProgramStep::solid(Rgb::BLACK);
        step.command = StepCommand::Unrecognized(0x33);
        assert_eq!(encode_step(&step), None);
    }

    // ── encode_program ────────────────────────────────────────────────────────

    #[test]
    fn test_encode_program_empty_is_off() {
        assert_eq!(encode_program(&[]).0, OFF_PAYLOAD);
    }

    #[test]
    fn test_encode_program_single_step_clears_other_slots() {
        let buf = encode_program(&[ProgramStep::solid(Rgb::new(9, 8, 7))]);
        assert_eq!(buf.slot(0), Some(&[0x10, 0, 9, 8, 7, 0xFF, 0, 0][..]));
        for i in 1..STEP_SLOTS {
            assert_eq!(buf.slot(i), Some(&[0u8; STEP_LEN][..]), "slot {i}");
        }
        assert_eq!(buf.slot(7), Some(&TRAILER[..]));
    }

    #[test]
    fn test_encode_program_skips_unknown_without_consuming_slot() {
        // Arrange
        let mut bogus = ProgramStep::solid(Rgb::new(1, 1, 1));
        bogus.command = StepCommand::Unrecognized(0x00);
        let good = ProgramStep::solid(Rgb::new(2, 2, 2));

        // Act
        let buf = encode_program(&[bogus, good]);

        // Assert: the good step lands in slot 0.
        assert_eq!(buf.slot(0).unwrap()[2], 2);
        assert_eq!(buf.slot(1), Some(&[0u8; STEP_LEN][..]));
    }

    #[test]
    fn test_encode_program_drops_eighth_step() {
        let ramp = ProgramStep::pulse_ramp(Rgb::new(0xFF, 0, 0));
        let buf = encode_program(&ramp);
        // Slot 6 holds the seventh ramp step (3/7) and the trailer survives.
        assert_eq!(buf.slot(6).unwrap()[2], 109);
        assert_eq!(buf.slot(7), Some(&TRAILER[..]));
    }

    // ── checksum_frame ────────────────────────────────────────────────────────

    #[test]
    fn test_checksum_frame_off_pattern() {
        let frame = checksum_frame(&OFF_PAYLOAD);
        assert_eq!(frame[0], 0);
        assert_eq!(&frame[1..9], &[0x10, 0x01, 0, 0, 0, 0, 0, 0x80]);
        // 0x10 + 0x01 + 0x80 + 0x04 + 0x04 + 0x55 + 3 * 0xFF = 0x03EB
        assert_eq!((frame[63], frame[64]), (0x03, 0xEB));
    }

    #[test]
    fn test_checksum_frame_keepalive_pattern() {
        let frame = checksum_frame(&KEEPALIVE_PAYLOAD);
        assert_eq!((frame[63], frame[64]), (0x03, 0xE9));
    }

    #[test]
    fn test_checksum_frame_forces_ff_bytes() {
        // Arrange: a payload of zeros except where the FF bytes will be forced.
        let payload = [0u8; PAYLOAD_LEN];

        // Act
        let frame = checksum_frame(&payload);

        // Assert
        assert_eq!(&frame[60..=62], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(u16::from_be_bytes([frame[63], frame[64]]), 3 * 0xFF);
    }

    #[test]
    fn test_checksum_frame_detects_single_byte_change() {
        let mut payload = OFF_PAYLOAD;
        let before = checksum_frame(&payload);
        payload[20] = 0x01;
        let after = checksum_frame(&payload);
        assert_ne!(&before[63..], &after[63..]);
    }

    #[test]
    fn test_checksum_frame_compensating_changes_cancel() {
        let mut payload = OFF_PAYLOAD;
        let before = checksum_frame(&payload);
        payload[10] = 0x05;
        payload[0] -= 0x05;
        let after = checksum_frame(&payload);
        assert_eq!(&before[63..], &after[63..]);
    }

    // ── decode_telemetry ──────────────────────────────────────────────────────

    fn sample_report() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"1");
        bytes.extend_from_slice(b"001");
        bytes.extend_from_slice(b"CUST0001");
        bytes.extend_from_slice(b"OMG2");
        bytes.extend_from_slice(b"SER12345");
        bytes.extend_from_slice(b"Plenom  ");
        bytes.extend_from_slice(b"20240131");
        bytes.extend_from_slice(b"v1.2.3");
        bytes.resize(64, 0);
        bytes
    }

    #[test]
    fn test_decode_telemetry_reads_every_field() {
        let report = decode_telemetry(&sample_report());
        assert_eq!(report.activity, Some(true));
        assert_eq!(report.product, Some(ProductKind::Busylight));
        assert_eq!(report.customer, "CUST0001");
        assert_eq!(report.model, "OMG2");
        assert_eq!(report.serial, "SER12345");
        assert_eq!(report.manufacturer, "Plenom  ");
        assert_eq!(report.build_date, "20240131");
        assert_eq!(report.software_version, "v1.2.3");
    }

    #[test]
    fn test_decode_telemetry_empty_input_is_all_empty() {
        let report = decode_telemetry(&[]);
        assert!(report.is_empty());
        assert_eq!(report.activity, None);
    }

    #[test]
    fn test_decode_telemetry_zero_boundary_yields_empty_field() {
        // Arrange
        let mut bytes = sample_report();
        bytes[15] = 0; // last model byte

        // Act
        let report = decode_telemetry(&bytes);

        // Assert
        assert_eq!(report.model, "");
        assert_eq!(report.serial, "SER12345");
    }

    #[test]
    fn test_decode_telemetry_short_input_never_panics() {
        let report = decode_telemetry(b"0002");
        assert_eq!(report.activity, Some(false));
        assert_eq!(report.product, Some(ProductKind::KuandoBox));
        assert_eq!(report.customer, "");
        assert_eq!(report.software_version, "");
    }
}
