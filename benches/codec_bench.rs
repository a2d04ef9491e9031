//! Benchmarks for the worker's hot paths
//!
//! Run with: cargo bench

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use ws_worker::frame::{OpCode, decode_frame, encode_frame};
use ws_worker::handshake::{HandshakeOutcome, try_handshake};
use ws_worker::mask::apply_mask;
use ws_worker::utf8::validate_utf8;

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

fn bench_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask");

    for size in [64, 256, 1024, 4096, 16384, 65536] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("apply_mask", size), &size, |b, &size| {
            let mut data = vec![0x42u8; size];
            b.iter(|| apply_mask(black_box(&mut data), black_box(MASK)));
        });
    }

    group.finish();
}

fn bench_utf8(c: &mut Criterion) {
    let mut group = c.benchmark_group("utf8");

    for size in [64, 1024, 16384] {
        let ascii = "a".repeat(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("ascii", size), &ascii, |b, data| {
            b.iter(|| validate_utf8(black_box(data.as_bytes())));
        });
    }

    for size in [64, 1024, 4096] {
        let mixed = "Hello, 世界! 🎉 ".repeat(size / 20);
        group.throughput(Throughput::Bytes(mixed.len() as u64));
        group.bench_with_input(BenchmarkId::new("mixed", mixed.len()), &mixed, |b, data| {
            b.iter(|| validate_utf8(black_box(data.as_bytes())));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    // One size per length tier
    for size in [8, 125, 1024, 65536, 131072] {
        let payload = vec![b'x'; size];
        let mut encoded = BytesMut::new();
        encode_frame(&mut encoded, OpCode::Text, &payload, Some(MASK));
        let encoded = encoded.freeze();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::new("masked", size), &encoded, |b, data| {
            b.iter(|| {
                let mut buf = BytesMut::from(&data[..]);
                black_box(decode_frame(&mut buf, usize::MAX).ok())
            });
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [8, 125, 1024, 65536, 131072] {
        let payload = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("text", size), &payload, |b, payload| {
            let mut buf = BytesMut::with_capacity(size + 14);
            b.iter(|| {
                buf.clear();
                encode_frame(&mut buf, OpCode::Text, black_box(payload), None);
            });
        });
    }

    group.finish();
}

fn bench_handshake(c: &mut Criterion) {
    let request: &[u8] = b"GET /ws HTTP/1.1\r\n\
        Host: localhost\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    c.bench_function("handshake", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(request);
            match try_handshake(&mut buf, 8192) {
                HandshakeOutcome::Completed { response, .. } => black_box(response),
                _ => unreachable!(),
            }
        });
    });
}

criterion_group!(
    benches,
    bench_mask,
    bench_utf8,
    bench_decode,
    bench_encode,
    bench_handshake
);
criterion_main!(benches);
