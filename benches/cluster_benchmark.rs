//! Micro-benchmarks for slot hashing and the wire codec.
//!
//! Run with `cargo bench --bench cluster_benchmark`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use slotmux::key_slot;
use slotmux::proto::codec::{Decoder, Encoder};
use slotmux::Frame;

/// Builds the raw wire bytes for `GET <key>`.
fn build_get_bytes(key: &str) -> Vec<u8> {
    format!("*2\r\n$3\r\nGET\r\n${}\r\n{}\r\n", key.len(), key).into_bytes()
}

fn bench_key_slot(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_slot");

    group.bench_function("short", |b| {
        b.iter(|| black_box(key_slot(black_box(b"user:1000"))));
    });

    group.bench_function("hash_tag", |b| {
        b.iter(|| black_box(key_slot(black_box(b"{user:1000}:followers"))));
    });

    let long_key = "k".repeat(4096);
    group.throughput(Throughput::Bytes(long_key.len() as u64));
    group.bench_function("long_4KB", |b| {
        b.iter(|| black_box(key_slot(black_box(long_key.as_bytes()))));
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for batch in [1usize, 16, 256].iter() {
        let mut bytes = Vec::new();
        for i in 0..*batch {
            bytes.extend_from_slice(&build_get_bytes(&format!("key:{}", i)));
        }
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.append(&bytes);
                for _ in 0..batch {
                    black_box(decoder.decode().unwrap().unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let frame = Frame::Array(vec![
        Frame::BulkString(Some("SET".into())),
        Frame::BulkString(Some("key:12345".into())),
        Frame::BulkString(Some("x".repeat(64).into())),
    ]);
    group.bench_function("set_64B", |b| {
        b.iter(|| {
            let mut encoder = Encoder::new();
            encoder.encode(black_box(&frame));
            black_box(encoder.take());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_key_slot, bench_decode, bench_encode);
criterion_main!(benches);
