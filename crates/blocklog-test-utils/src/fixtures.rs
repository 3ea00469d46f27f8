//! Reusable record and codec fixtures.
//!
//! - [`TestData`]: every primitive the codec has to carry.
//! - [`TestDataSmall`]: a second registrable type with a smaller payload.
//! - [`UnmarkedTestData`]: a type the test codec refuses to register, so
//!   it can only travel on the untyped path.
//! - [`FailingCodec`]: wraps a codec and fails deterministically after N
//!   encodes.
//!
//! Record values are generated from a seed so a test can rebuild the
//! exact value it wrote and compare against what it read back.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};

use blocklog_core::{Codec, CodecError, EntityId, NamedRecord, Record};
use rand::distr::Alphanumeric;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

fn word(rng: &mut ChaCha8Rng) -> String {
    let len = rng.random_range(4..24);
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

/// Implements `Record` and `NamedRecord` for a fixture keyed by `id`.
macro_rules! fixture_record {
    ($ty:ty, $name:literal) => {
        impl Record for $ty {
            fn record_id(&self) -> EntityId {
                EntityId(self.id)
            }

            fn type_name(&self) -> &str {
                $name
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        impl NamedRecord for $ty {
            const TYPE_NAME: &'static str = $name;
        }
    };
}

// ── TestData ────────────────────────────────────────────────────

/// Carries one value of each primitive the wire tests care about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestData {
    pub id: Uuid,
    pub int_value: i32,
    pub long_value: i64,
    pub double_value: f64,
    pub string_value: String,
}

impl TestData {
    /// Deterministic value for `seed`. Distinct seeds give distinct ids.
    pub fn seeded(seed: u64) -> Self {
        let mut rng = rng(seed);
        Self {
            id: Uuid::from_u128(rng.random()),
            int_value: rng.random(),
            long_value: rng.random(),
            double_value: rng.random_range(-1.0e6..1.0e6),
            string_value: word(&mut rng),
        }
    }

    /// `count` values with consecutive seeds starting at `first_seed`.
    pub fn batch(first_seed: u64, count: usize) -> Vec<Self> {
        (0..count as u64).map(|i| Self::seeded(first_seed + i)).collect()
    }
}

fixture_record!(TestData, "TestData");

// ── TestDataSmall ───────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDataSmall {
    pub id: Uuid,
    pub int_value: i32,
}

impl TestDataSmall {
    pub fn seeded(seed: u64) -> Self {
        // Offset so a TestDataSmall never shares an id with the
        // TestData built from the same seed.
        let mut rng = rng(seed ^ 0x5A5A_0000_0000_0000);
        Self {
            id: Uuid::from_u128(rng.random()),
            int_value: rng.random(),
        }
    }
}

fixture_record!(TestDataSmall, "TestDataSmall");

// ── UnmarkedTestData ────────────────────────────────────────────

/// Serializable, but never registrable with [`test_codec`](crate::test_codec).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnmarkedTestData {
    pub id: Uuid,
    pub int_value: i32,
    pub label: String,
}

impl UnmarkedTestData {
    pub fn seeded(seed: u64) -> Self {
        let mut rng = rng(seed ^ 0xA5A5_0000_0000_0000);
        Self {
            id: Uuid::from_u128(rng.random()),
            int_value: rng.random(),
            label: word(&mut rng),
        }
    }
}

fixture_record!(UnmarkedTestData, "UnmarkedTestData");

// ── FailingCodec ────────────────────────────────────────────────

/// Delegates to an inner codec, but fails every encode after the first
/// `succeed_count`.
///
/// Decoding and registration checks always delegate.
pub struct FailingCodec<C> {
    inner: C,
    succeed_count: usize,
    call_count: AtomicUsize,
}

impl<C: Codec> FailingCodec<C> {
    pub fn new(inner: C, succeed_count: usize) -> Self {
        Self {
            inner,
            succeed_count,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of encode calls so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl<C: Codec> Codec for FailingCodec<C> {
    fn encode(
        &self,
        typed: bool,
        compress: bool,
        type_name: &str,
        value: &dyn Record,
    ) -> Result<Vec<u8>, CodecError> {
        let count = self.call_count.fetch_add(1, Ordering::Relaxed);
        if count >= self.succeed_count {
            return Err(CodecError::Encode {
                detail: format!(
                    "failing codec: encode {} exceeds succeed_count {}",
                    count + 1,
                    self.succeed_count
                ),
            });
        }
        self.inner.encode(typed, compress, type_name, value)
    }

    fn decode(
        &self,
        typed: bool,
        compress: bool,
        type_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<Box<dyn Record>, CodecError> {
        self.inner.decode(typed, compress, type_name, bytes)
    }

    fn is_type_valid(&self, type_name: &str) -> bool {
        self.inner.is_type_valid(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_codec;

    #[test]
    fn seeded_is_deterministic() {
        assert_eq!(TestData::seeded(4), TestData::seeded(4));
        assert_ne!(TestData::seeded(4).id, TestData::seeded(5).id);
        assert_ne!(TestData::seeded(4).id, TestDataSmall::seeded(4).id);
    }

    #[test]
    fn test_codec_rejects_unmarked() {
        let codec = test_codec();
        assert!(codec.is_type_valid(TestData::TYPE_NAME));
        assert!(codec.is_type_valid(TestDataSmall::TYPE_NAME));
        assert!(!codec.is_type_valid(UnmarkedTestData::TYPE_NAME));
    }

    #[test]
    fn failing_codec_fails_after_threshold() {
        let codec = FailingCodec::new(test_codec(), 2);
        let value = TestData::seeded(0);
        assert!(codec.encode(true, false, TestData::TYPE_NAME, &value).is_ok());
        assert!(codec.encode(true, false, TestData::TYPE_NAME, &value).is_ok());
        assert!(codec.encode(true, false, TestData::TYPE_NAME, &value).is_err());
        assert_eq!(codec.calls(), 3);
    }
}
