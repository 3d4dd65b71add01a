use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chrono::Utc;
use terminal_persist_core::{EnvelopeConfig, SessionEnvelope, TerminalSessionRecord};
use terminal_persist_storage::SessionCodec;

/// Build shell-like scrollback of the given number of lines
fn scrollback(lines: usize) -> Vec<String> {
    (0..lines)
        .map(|i| match i % 4 {
            0 => format!("user@host:~/project$ cargo test --package crate-{i}"),
            1 => format!("   Compiling crate-{i} v0.1.0 (/home/user/project)"),
            2 => format!("test module_{i}::tests::test_case ... \x1b[32mok\x1b[0m"),
            _ => String::new(),
        })
        .collect()
}

fn envelope(terminals: usize, lines: usize) -> SessionEnvelope {
    let records = (0..terminals)
        .map(|i| {
            let mut record = TerminalSessionRecord::new(format!("t{i}"), "bash", i as u32 + 1);
            record.scrollback = Some(scrollback(lines));
            record
        })
        .collect();
    SessionEnvelope::new(records, None, EnvelopeConfig::default(), Utc::now())
}

fn bench_encode_content(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_content");
    let codec = SessionCodec::gzip();

    for lines in [10, 100, 1000, 5000].iter() {
        let content = scrollback(*lines).join("\n");
        group.bench_with_input(BenchmarkId::from_parameter(lines), &content, |b, c| {
            b.iter(|| {
                let encoded = codec.encode(black_box(c)).unwrap();
                black_box(encoded);
            });
        });
    }

    group.finish();
}

fn bench_decode_content(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_content");
    let codec = SessionCodec::gzip();

    for lines in [100, 1000, 5000].iter() {
        let encoded = codec.encode(&scrollback(*lines).join("\n")).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(lines), &encoded, |b, e| {
            b.iter(|| {
                let decoded = codec.decode(black_box(&e.content), e.compressed).unwrap();
                black_box(decoded);
            });
        });
    }

    group.finish();
}

fn bench_encode_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_envelope");
    let codec = SessionCodec::gzip();

    for terminals in [1, 5, 10].iter() {
        let envelope = envelope(*terminals, 1000);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{terminals}x1000")),
            &envelope,
            |b, env| {
                b.iter(|| {
                    let stored = codec.encode_envelope(black_box(env)).unwrap();
                    black_box(serde_json::to_string(&stored).unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_content,
    bench_decode_content,
    bench_encode_envelope
);
criterion_main!(benches);
