//! Criterion benchmarks for cache flushes and replay.

use std::hint::black_box;
use std::io::Cursor;

use blocklog_bench::{bench_codec, populated_writer, recorded_stream};
use blocklog_stream::{CachedReader, ReaderConfig};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

const ENTITIES: usize = 1_000;

/// Full flush of a 1K-entity cache, framing and draining.
fn bench_full_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_flush_1k");
    for compress in [false, true] {
        let label = if compress { "zstd" } else { "plain" };
        group.bench_function(label, |b| {
            b.iter_batched(
                || populated_writer(ENTITIES, 7, compress).unwrap(),
                |writer| {
                    black_box(writer.write_buffer(1, false).unwrap());
                    black_box(writer.flush_to_stream().unwrap());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Partial flush right after a full one: nothing touched, so only the
/// scan cost remains.
fn bench_idle_partial_flush(c: &mut Criterion) {
    let writer = populated_writer(ENTITIES, 7, false).unwrap();
    writer.write_buffer(0, false).unwrap();

    c.bench_function("partial_flush_idle_1k", |b| {
        b.iter(|| black_box(writer.write_buffer(1, true).unwrap()));
    });
}

/// Replay a recorded stream of one full and 20 partial flushes.
fn bench_replay(c: &mut Criterion) {
    let bytes = recorded_stream(ENTITIES, 20, 11).unwrap();

    c.bench_function("replay_full_plus_20_partial", |b| {
        b.iter(|| {
            let mut reader = CachedReader::new(
                Cursor::new(bytes.as_slice()),
                bench_codec(),
                ReaderConfig::default(),
            );
            reader.read_from_stream().unwrap();
            reader.read_header().unwrap();
            black_box(reader.records(None).filter(Result::is_ok).count());
        });
    });
}

criterion_group!(benches, bench_full_flush, bench_idle_partial_flush, bench_replay);
criterion_main!(benches);
