//! Performance benchmarks for command processing.
//!
//! These benchmarks measure the hot paths of the command channel:
//! - Line framing of incoming bytes
//! - Command classification
//! - Response encoding

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use protocol::{classify_ftp, classify_general, Line, LineCodec, Response, ServiceCode};

/// Benchmark decoding a burst of command lines.
fn bench_line_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_decoding");
    let codec = LineCodec::new();

    let single = b"AT+BTF=\"Workshop\"\r\n".to_vec();
    group.throughput(Throughput::Bytes(single.len() as u64));
    group.bench_function("single_line", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(black_box(&single[..]));
            codec.decode(&mut buf).unwrap()
        });
    });

    let burst: Vec<u8> = (0..64)
        .flat_map(|i| format!("CD \"folder {}\"\r", i).into_bytes())
        .collect();
    group.throughput(Throughput::Bytes(burst.len() as u64));
    group.bench_function("burst_64_lines", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(black_box(&burst[..]));
            let mut count = 0;
            while let Some(_line) = codec.decode(&mut buf).unwrap() {
                count += 1;
            }
            count
        });
    });

    group.finish();
}

/// Benchmark classifying commands in both grammars.
fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification");

    let general: Vec<Line> = [
        "ATE0",
        "ATS12=345",
        "AT+BTF=\"Workshop\"",
        "AT+BTIN",
        "AT+BTWA0B1C2D3E4F5,1106",
        "ATDA0B1C2D3E4F5,1106",
        "AT+UNKNOWN",
    ]
    .iter()
    .map(|text| Line::new(*text))
    .collect();
    group.bench_function("general", |b| {
        b.iter(|| {
            for line in &general {
                black_box(classify_general(black_box(line)));
            }
        });
    });

    let ftp: Vec<Line> = [
        "CD \"Photos\"",
        "MD \"New\"",
        "PUT \"notes.txt\"",
        "DIR -RAW",
        "MAX",
        "ABORT",
        "QUIT",
    ]
    .iter()
    .map(|text| Line::new(*text))
    .collect();
    group.bench_function("ftp", |b| {
        b.iter(|| {
            for line in &ftp {
                black_box(classify_ftp(black_box(line)));
            }
        });
    });

    group.finish();
}

/// Benchmark encoding responses, including a listing line.
fn bench_response_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_encoding");

    group.bench_function("status", |b| {
        b.iter(|| black_box(Response::Ftp(ServiceCode::Success)).encode());
    });

    let entry = Response::Data("  <file name=\"IMG_0001.JPG\" size=\"2483712\"/>".to_string());
    group.bench_function("listing_entry", |b| {
        b.iter(|| black_box(&entry).encode());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_line_decoding,
    bench_classification,
    bench_response_encoding
);
criterion_main!(benches);
