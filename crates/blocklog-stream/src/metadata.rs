//! Per-block metadata and decoded blocks.

use blocklog_core::{BlockKind, RefId};

/// Encoded size of [`BlockMetadata`], written as the `i32` prefix of
/// every block.
pub const METADATA_LEN: i32 = 20;

/// Describes one framed block.
///
/// Written immediately before its payload. `block_size` is the exact
/// payload length in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockMetadata {
    /// Registration id of the payload type, or [`RefId::UNTYPED`].
    pub type_id: RefId,
    /// Caller-supplied timestamp.
    pub timestamp: i64,
    /// Payload length in bytes. Never negative.
    pub block_size: i32,
    /// Role of the block.
    pub kind: BlockKind,
}

impl BlockMetadata {
    /// Build a metadata record.
    pub fn new(type_id: RefId, timestamp: i64, block_size: i32, kind: BlockKind) -> Self {
        Self {
            type_id,
            timestamp,
            block_size,
            kind,
        }
    }

    /// `block_size` as a buffer length.
    pub fn payload_len(&self) -> usize {
        usize::try_from(self.block_size).unwrap_or(0)
    }
}

/// A decoded block: its metadata and the raw payload bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// The block's metadata.
    pub metadata: BlockMetadata,
    /// Payload bytes, exactly `metadata.block_size` long.
    pub payload: Vec<u8>,
}

impl Block {
    /// True for data blocks carrying a registered type.
    pub fn is_typed(&self) -> bool {
        self.metadata.type_id.is_registered()
    }
}
