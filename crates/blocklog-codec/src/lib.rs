//! Default payload codec for blocklog streams.
//!
//! [`MsgPackCodec`] resolves types through an explicit table built at
//! construction time. Nothing is discovered at runtime: a type the table
//! does not contain, or contains for the untyped path only, is rejected
//! by [`is_type_valid`](blocklog_core::Codec::is_type_valid) and cannot
//! be registered in a stream header.
//!
//! # Encodings
//!
//! | Path | Format | Used for |
//! |------|--------|----------|
//! | typed | compact MessagePack (struct as array) | types registered in the stream header |
//! | untyped | JSON (self-describing) | everything else |
//!
//! Either path is optionally wrapped in zstd when `compress` is set.
//! An untyped payload decoded without a type name becomes a
//! [`DynamicRecord`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod dynamic;
mod msgpack;

pub use dynamic::DynamicRecord;
pub use msgpack::{MsgPackCodec, DEFAULT_COMPRESSION_LEVEL};
