//! Criterion benchmarks for the Busylight frame codec.
//!
//! A session encodes and checksums a frame on every program change and every
//! keepalive, so these paths should stay far below a microsecond.
//!
//! Run with:
//! ```bash
//! cargo bench --package busylight-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use busylight_core::protocol::frame::KEEPALIVE_PAYLOAD;
use busylight_core::{checksum_frame, decode_telemetry, encode_program, ProgramStep, Rgb};

// ── Program fixtures ──────────────────────────────────────────────────────────

fn programs() -> Vec<(&'static str, Vec<ProgramStep>)> {
    let red = Rgb::new(0xCC, 0x00, 0x00);
    vec![
        ("empty", Vec::new()),
        ("solid", vec![ProgramStep::solid(red)]),
        (
            "scheduled_tone",
            vec![ProgramStep::blink(red, 12, 12).with_repeat(10).with_audio(2, 7)],
        ),
        ("pulse_ramp", ProgramStep::pulse_ramp(red)),
    ]
}

fn bench_encode_program(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_program");
    for (name, steps) in programs() {
        group.bench_with_input(BenchmarkId::new("program", name), &steps, |b, steps| {
            b.iter(|| encode_program(black_box(steps)))
        });
    }
    group.finish();
}

fn bench_checksum_frame(c: &mut Criterion) {
    c.bench_function("checksum_frame/keepalive", |b| {
        b.iter(|| checksum_frame(black_box(&KEEPALIVE_PAYLOAD)))
    });
}

fn bench_full_frame(c: &mut Criterion) {
    let steps = ProgramStep::pulse_ramp(Rgb::new(0x00, 0x66, 0x00));
    c.bench_function("encode_and_checksum/pulse_ramp", |b| {
        b.iter(|| checksum_frame(encode_program(black_box(&steps)).as_bytes()))
    });
}

fn bench_decode_telemetry(c: &mut Criterion) {
    let mut report = b"1001CUST0001OMG2SER12345Plenom  20240131v1.2.3".to_vec();
    report.resize(64, 0);
    c.bench_function("decode_telemetry", |b| {
        b.iter(|| decode_telemetry(black_box(&report)))
    });
}

criterion_group!(
    benches,
    bench_encode_program,
    bench_checksum_frame,
    bench_full_frame,
    bench_decode_telemetry
);
criterion_main!(benches);
