//! Codec benchmarks for relay-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use relay_protocol::{codec, Envelope};
use serde_json::json;

fn stats_payload() -> serde_json::Value {
    json!({
        "front": {"camera_fps": 5.0, "process_fps": 5.0, "detection_fps": 1.2},
        "side": {"camera_fps": 5.0, "process_fps": 4.9, "detection_fps": 0.0},
        "service": {"uptime": 1234, "version": "0.10.0"},
    })
}

fn bench_encode(c: &mut Criterion) {
    let envelope = Envelope::publish("stats", &stats_payload(), false).unwrap();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(envelope.payload_size() as u64));
    group.bench_function("stats", |b| b.iter(|| codec::encode(black_box(&envelope))));
    group.finish();
}

fn bench_decode_twice(c: &mut Criterion) {
    let envelope = Envelope::publish("stats", &stats_payload(), false).unwrap();
    let text = codec::encode(&envelope).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("stats", |b| {
        b.iter(|| {
            let envelope = codec::decode(black_box(&text)).unwrap();
            envelope.decode_payload().unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode_twice);
criterion_main!(benches);
