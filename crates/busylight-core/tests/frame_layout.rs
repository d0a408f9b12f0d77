//! Integration tests for the busylight-core frame codec.
//!
//! These exercise the public API the daemon uses: building the step programs
//! for each status row, packing them, and finalising the frame.

use busylight_core::{
    checksum_frame, decode_telemetry, encode_program, parse_color, protocol::frame::TRAILER,
    AudioChoice, BusylightModel, DeviceState, ProgramStep, Rgb, StepBuffer, FRAME_LEN,
};

/// Sums frame bytes 0..=62 the way the firmware does.
fn expected_checksum(frame: &[u8; FRAME_LEN]) -> u16 {
    frame[..63].iter().map(|&b| u16::from(b)).sum()
}

#[test]
fn test_every_status_row_encodes_a_valid_frame() {
    let model = BusylightModel::from_product_id(0x3BCD).expect("known model");

    for state in [
        DeviceState::Ok,
        DeviceState::Info1,
        DeviceState::Info2,
        DeviceState::Info3,
        DeviceState::Warning,
        DeviceState::Error,
    ] {
        // Arrange
        let profile = state.profile().expect("non-off state has a profile");
        let (tone_name, _) = profile.audio(AudioChoice::Audible).expect("audible");
        let tone = model.tones.index_of(tone_name).expect("tone in catalog") as u8;
        let step = ProgramStep::blink(profile.color, 10, 10)
            .with_repeat(10)
            .with_audio(tone, 4);

        // Act
        let frame = checksum_frame(encode_program(&[step]).as_bytes());

        // Assert
        assert_eq!(frame[0], 0, "{state}: report id");
        assert_eq!(frame[1], 0x10, "{state}: jump command");
        assert_eq!(frame[2], 10, "{state}: repeat");
        assert_eq!(&frame[3..6], &[profile.color.red, profile.color.green, profile.color.blue]);
        assert_eq!(frame[8], 0x80 | (tone << 3) | 4, "{state}: audio byte");
        assert_eq!(&frame[57..63], &TRAILER[..6], "{state}: trailer");
        assert_eq!(
            u16::from_be_bytes([frame[63], frame[64]]),
            expected_checksum(&frame),
            "{state}: checksum"
        );
    }
}

#[test]
fn test_intensity_scaled_white_packs_127() {
    // Arrange
    let white = parse_color("#FFFFFF").expect("valid color");

    // Act
    let buffer = encode_program(&[ProgramStep::solid(white.scaled(50))]);

    // Assert
    assert_eq!(&buffer.as_bytes()[2..5], &[127, 127, 127]);
}

#[test]
fn test_checksum_frame_is_deterministic() {
    let buffer = encode_program(&ProgramStep::pulse_ramp(Rgb::new(0x12, 0x34, 0x56)));
    assert_eq!(checksum_frame(buffer.as_bytes()), checksum_frame(buffer.as_bytes()));
}

#[test]
fn test_state_dump_of_off_buffer() {
    let expected = "\
10 01 00 00 00 00 00 80 
00 00 00 00 00 00 00 00 
00 00 00 00 00 00 00 00 
00 00 00 00 00 00 00 00 
00 00 00 00 00 00 00 00 
00 00 00 00 00 00 00 00 
00 00 00 00 00 00 00 00 
04 04 55 ff ff ff 00 00 
";
    assert_eq!(StepBuffer::OFF.to_string(), expected);
}

#[test]
fn test_decode_telemetry_from_full_report() {
    let mut bytes = b"0001ACME0000BL01SN000042PLENOM--20231102fw-1.0".to_vec();
    bytes.resize(64, 0);

    let report = decode_telemetry(&bytes);

    assert_eq!(report.activity, Some(false));
    assert_eq!(report.customer, "ACME0000");
    assert_eq!(report.model, "BL01");
    assert_eq!(report.serial, "SN000042");
    assert_eq!(report.manufacturer, "PLENOM--");
    assert_eq!(report.build_date, "20231102");
    assert_eq!(report.software_version, "fw-1.0");
}
