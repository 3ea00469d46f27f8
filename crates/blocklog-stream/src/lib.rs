//! Block framing, write cache and replay reader for blocklog streams.
//!
//! Applications register record types, push entity updates into a cache,
//! and periodically frame a consistent snapshot of that cache into an
//! appendable binary stream. A matching reader replays the stream block
//! by block, optionally stopping at a timestamp ceiling.
//!
//! # Architecture
//!
//! - [`CachedWriter`] caches updates and frames them on demand
//! - [`CachedReader`] replays a stream to subscribers or an iterator
//! - [`DirectWriter`] / [`DirectReader`] exchange single blocks between
//!   peers that share a registry, with no header
//! - [`Header`] maps type names to dense registration ids
//! - [`WriteBuffer`] / [`ReadBuffer`] implement the framing itself
//! - payload bytes are produced by an injected
//!   [`Codec`](blocklog_core::Codec); framing never depends on it
//!
//! # Format
//!
//! ```text
//! block  := metadata_len:i32 | type_id:i32 | timestamp:i64 | block_size:i32 | kind:u32 | payload
//! stream := [SIGNATURE: 16-byte id] [SIGNATURE: encoding flag] [HEADER] [data block]*
//! ```
//!
//! All integers are little-endian. Framing blocks carry
//! `type_id = -1`; data blocks carry the registration id of their
//! payload type, or `-1` when the type is unregistered.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod direct;
pub mod error;
pub mod header;
pub mod metadata;
pub mod read_buffer;
pub mod reader;
pub mod wire;
pub mod write_buffer;
pub mod writer;

pub use direct::{DirectReader, DirectWriter};
pub use error::{ErrorKind, LogError, ResultExt};
pub use header::{Header, TypeRegistration};
pub use metadata::{Block, BlockMetadata, METADATA_LEN};
pub use read_buffer::{ReadBuffer, ReadSeek};
pub use reader::{CachedReader, ReadRecord, ReaderConfig, RecordSink, Records};
pub use write_buffer::WriteBuffer;
pub use writer::{CachedWriter, WriterConfig, WriterPhase};

use uuid::Uuid;

/// Identifies a stream produced by this crate. Written as the payload of
/// the first block, in big-endian byte order.
pub const SIGNATURE: Uuid = Uuid::from_u128(0x46429DF1_46C8_4C0D_8479_A3BCB6A87643);
