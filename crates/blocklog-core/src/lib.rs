//! Core types and traits for the blocklog binary logging engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the blocklog workspace:
//! entity and registration IDs, the block kind bitmask, the version
//! triple, codec errors, and the [`Record`] / [`Codec`] traits.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod kind;
pub mod traits;

pub use error::CodecError;
pub use id::{EntityId, RefId, Version};
pub use kind::BlockKind;
pub use traits::{Codec, NamedRecord, Record};
