//! Benchmark profiles for blocklog.
//!
//! Pre-built writers and streams shared by the criterion benches:
//!
//! - [`populated_writer`]: a writer whose cache holds `entities` records
//! - [`recorded_stream`]: a complete stream of one full flush and many
//!   partial flushes
//! - [`bench_codec`]: the codec every profile uses

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use blocklog_core::{BlockKind, Codec};
use blocklog_stream::{CachedWriter, LogError, WriterConfig};
use blocklog_test_utils::{test_codec, TestData, TestDataSmall};

/// The codec shared by every profile. Knows the fixture record types.
pub fn bench_codec() -> Arc<dyn Codec> {
    Arc::new(test_codec())
}

/// A writer over an in-memory sink with `entities` cached records.
///
/// Even indices are [`TestData`] (FULL | PARTIAL), odd indices
/// [`TestDataSmall`] (PARTIAL only). Nothing has been framed yet.
pub fn populated_writer(
    entities: usize,
    seed: u64,
    compress: bool,
) -> Result<CachedWriter<Vec<u8>>, LogError> {
    let writer = CachedWriter::new(
        Vec::with_capacity(entities * 96),
        bench_codec(),
        WriterConfig {
            compress,
            clear_cache_on_write: false,
        },
    );
    writer.register::<TestData>(BlockKind::FULL | BlockKind::PARTIAL)?;
    writer.register::<TestDataSmall>(BlockKind::PARTIAL)?;

    for i in 0..entities as u64 {
        let s = seed.wrapping_add(i);
        if i % 2 == 0 {
            writer.update(Arc::new(TestData::seeded(s)))?;
        } else {
            writer.update(Arc::new(TestDataSmall::seeded(s)))?;
        }
    }
    Ok(writer)
}

/// A complete stream: one full flush of `entities` records, then
/// `frames` partial flushes that each modify every fourth entity.
pub fn recorded_stream(entities: usize, frames: usize, seed: u64) -> Result<Vec<u8>, LogError> {
    let writer = populated_writer(entities, seed, false)?;
    writer.write_buffer(0, false)?;
    for frame in 1..=frames as i64 {
        for i in (0..entities as u64).step_by(4) {
            let mut value = TestData::seeded(seed.wrapping_add(i));
            value.long_value = frame;
            writer.update(Arc::new(value))?;
        }
        writer.write_buffer(frame, true)?;
    }
    writer.flush_to_stream()?;
    writer.into_inner().ok_or(LogError::NoOutput)
}
