//! blocklog: cached, block-framed binary logging with timestamped replay.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the blocklog sub-crates. For most users, adding `blocklog` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::any::Any;
//! use std::io::Cursor;
//! use std::sync::Arc;
//!
//! use blocklog::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Heat { id: EntityId, celsius: f32 }
//!
//! impl Record for Heat {
//!     fn record_id(&self) -> EntityId { self.id }
//!     fn type_name(&self) -> &str { Self::TYPE_NAME }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//! impl NamedRecord for Heat { const TYPE_NAME: &'static str = "Heat"; }
//!
//! let codec = Arc::new(MsgPackCodec::new().with_type::<Heat>());
//!
//! // Record two ticks: a full snapshot, then only what changed.
//! let writer = CachedWriter::new(Vec::new(), codec.clone(), WriterConfig::default());
//! writer.register::<Heat>(BlockKind::FULL | BlockKind::PARTIAL).unwrap();
//! let (a, b) = (EntityId::new_v4(), EntityId::new_v4());
//! writer.update(Arc::new(Heat { id: a, celsius: 20.0 })).unwrap();
//! writer.update(Arc::new(Heat { id: b, celsius: 21.0 })).unwrap();
//! writer.write_buffer(1, false).unwrap();
//! writer.update(Arc::new(Heat { id: a, celsius: 25.0 })).unwrap();
//! writer.write_buffer(2, true).unwrap();
//! writer.flush_to_stream().unwrap();
//! let bytes = writer.into_inner().unwrap();
//!
//! // Replay only the first tick.
//! let mut reader = CachedReader::new(Cursor::new(bytes), codec, ReaderConfig::default());
//! reader.read_header().unwrap();
//! reader.subscribe(|rec: &ReadRecord| assert!(rec.downcast_ref::<Heat>().is_some()));
//! assert_eq!(reader.read_data(Some(2)).unwrap(), 2);
//! assert_eq!(reader.read_data(None).unwrap(), 1);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `blocklog-core` | Ids, block kinds, the `Record` and `Codec` traits |
//! | [`codec`] | `blocklog-codec` | MessagePack/JSON codec with optional zstd |
//! | [`stream`] | `blocklog-stream` | Framing, cached writer, replay reader, direct peers |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Ids, block kinds and the core traits (`blocklog-core`).
///
/// Implement [`types::Record`] for anything you want to log and
/// [`types::Codec`] to plug in a different payload encoding.
pub use blocklog_core as types;

/// The bundled payload codec (`blocklog-codec`).
///
/// [`codec::MsgPackCodec`] encodes registered types as compact MessagePack
/// and everything else as JSON, decoded back into a
/// [`codec::DynamicRecord`].
pub use blocklog_codec as codec;

/// Framing, writers and readers (`blocklog-stream`).
///
/// [`stream::CachedWriter`] and [`stream::CachedReader`] for header-bearing
/// streams, [`stream::DirectWriter`] and [`stream::DirectReader`] for
/// single-block exchange between peers.
pub use blocklog_stream as stream;

/// Common imports for typical blocklog usage.
///
/// ```rust
/// use blocklog::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use blocklog_core::{BlockKind, Codec, CodecError, EntityId, NamedRecord, Record, RefId};

    // Codec
    pub use blocklog_codec::{DynamicRecord, MsgPackCodec};

    // Stream
    pub use blocklog_stream::{
        CachedReader, CachedWriter, DirectReader, DirectWriter, Header, LogError, ReadRecord,
        ReaderConfig, WriterConfig,
    };
}
