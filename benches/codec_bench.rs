// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Compress/decompress throughput for the posting codecs (§4.1), at delta
//! distributions representative of a short common term (dense, small gaps)
//! and a rare term (sparse, large gaps).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use wumpus::binary::{compress, decompress};
use wumpus::types::{CompressionMode, Posting};

fn dense_postings(count: u64) -> Vec<Posting> {
    (0..count).collect()
}

fn sparse_postings(count: u64) -> Vec<Posting> {
    (0..count).map(|i| i * 997).collect()
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    for &count in &[100u64, 10_000, 1_000_000] {
        let dense = dense_postings(count);
        let sparse = sparse_postings(count);
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("vbyte/dense", count), &dense, |b, postings| {
            b.iter(|| {
                let mut out = Vec::new();
                compress(black_box(postings), CompressionMode::VByte, &mut out);
                out
            });
        });
        group.bench_with_input(BenchmarkId::new("vbyte/sparse", count), &sparse, |b, postings| {
            b.iter(|| {
                let mut out = Vec::new();
                compress(black_box(postings), CompressionMode::VByte, &mut out);
                out
            });
        });
        group.bench_with_input(BenchmarkId::new("gamma/dense", count), &dense, |b, postings| {
            b.iter(|| {
                let mut out = Vec::new();
                compress(black_box(postings), CompressionMode::Gamma, &mut out);
                out
            });
        });
        group.bench_with_input(BenchmarkId::new("gamma/sparse", count), &sparse, |b, postings| {
            b.iter(|| {
                let mut out = Vec::new();
                compress(black_box(postings), CompressionMode::Gamma, &mut out);
                out
            });
        });
    }
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");
    for &count in &[100u64, 10_000, 1_000_000] {
        let dense = dense_postings(count);

        let mut vbyte_buf = Vec::new();
        compress(&dense, CompressionMode::VByte, &mut vbyte_buf);
        let mut gamma_buf = Vec::new();
        compress(&dense, CompressionMode::Gamma, &mut gamma_buf);

        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("vbyte", count), &vbyte_buf, |b, buf| {
            b.iter(|| decompress(black_box(buf), Some(CompressionMode::VByte), count as usize).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("gamma", count), &gamma_buf, |b, buf| {
            b.iter(|| decompress(black_box(buf), Some(CompressionMode::Gamma), count as usize).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress);
criterion_main!(benches);
