//! In-memory accumulation buffer for framed blocks.

use std::io::Write;

use blocklog_core::{BlockKind, RefId};

use crate::error::LogError;
use crate::metadata::BlockMetadata;
use crate::wire::encode_block;

const RESOURCE: &str = "write buffer";

/// Append-only buffer of framed blocks awaiting a flush.
///
/// [`write_to`](WriteBuffer::write_to) is the only way bytes leave the
/// buffer, and it resets the buffer once they have all been written, so
/// a successful flush never repeats a block.
#[derive(Debug)]
pub struct WriteBuffer {
    buf: Option<Vec<u8>>,
    blocks: usize,
}

impl WriteBuffer {
    /// An empty, open buffer.
    pub fn new() -> Self {
        Self {
            buf: Some(Vec::new()),
            blocks: 0,
        }
    }

    /// Frame `payload` and append it.
    pub fn write_block(
        &mut self,
        payload: &[u8],
        type_id: RefId,
        kind: BlockKind,
        timestamp: i64,
    ) -> Result<(), LogError> {
        let buf = self.buf.as_mut().ok_or(LogError::Closed { resource: RESOURCE })?;
        let block_size = i32::try_from(payload.len()).map_err(|_| {
            LogError::malformed(format!("payload of {} bytes is too large", payload.len()))
        })?;
        let metadata = BlockMetadata::new(type_id, timestamp, block_size, kind);
        encode_block(buf, &metadata, payload)?;
        self.blocks += 1;
        Ok(())
    }

    /// Copy every buffered byte to `target`, then reset the buffer.
    ///
    /// Returns the number of bytes written. If `target` fails the buffer
    /// is kept intact.
    pub fn write_to<W: Write + ?Sized>(&mut self, target: &mut W) -> Result<usize, LogError> {
        let buf = self.buf.as_mut().ok_or(LogError::Closed { resource: RESOURCE })?;
        target.write_all(buf.as_slice())?;
        let written = buf.len();
        buf.clear();
        self.blocks = 0;
        Ok(written)
    }

    /// Number of buffered bytes. Zero once closed.
    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, Vec::len)
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of blocks framed since the last flush.
    pub fn block_count(&self) -> usize {
        self.blocks
    }

    /// Drop the buffer. Idempotent; returns how many bytes were discarded.
    pub fn close(&mut self) -> usize {
        self.blocks = 0;
        self.buf.take().map_or(0, |b| b.len())
    }

    /// False once [`close`](WriteBuffer::close) has been called.
    pub fn is_open(&self) -> bool {
        self.buf.is_some()
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}
