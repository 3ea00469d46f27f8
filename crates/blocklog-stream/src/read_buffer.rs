//! Sequential block decoding with one-block rewind.
//!
//! A [`ReadBuffer`] works in one of two modes:
//!
//! - **bulk**: [`read_from`](ReadBuffer::read_from) copies the whole
//!   source into memory once and every later call decodes from that copy;
//! - **incremental**: no copy is made and each call is handed the live
//!   stream to decode from directly.
//!
//! Both modes share the same decode path. The start of the most recently
//! decoded block is remembered so it can be re-read after a
//! [`rewind_one_block`](ReadBuffer::rewind_one_block).

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::error::LogError;
use crate::metadata::Block;
use crate::wire::decode_block;

const RESOURCE: &str = "read buffer";

/// Object-safe `Read + Seek`.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Decodes framed blocks from a bulk-loaded copy or a live stream.
#[derive(Debug)]
pub struct ReadBuffer {
    filled: Option<Cursor<Vec<u8>>>,
    last_block_start: Option<u64>,
    /// Last measured length of the live stream.
    live_len: Option<u64>,
    closed: bool,
}

impl ReadBuffer {
    /// An open, unfilled buffer.
    pub fn new() -> Self {
        Self {
            filled: None,
            last_block_start: None,
            live_len: None,
            closed: false,
        }
    }

    /// Bulk-load `source` from its start. Returns the number of bytes
    /// copied.
    ///
    /// Replaces any previously loaded contents.
    pub fn read_from<R: ReadSeek + ?Sized>(&mut self, source: &mut R) -> Result<u64, LogError> {
        self.check_open()?;
        source.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        let len = bytes.len() as u64;
        self.filled = Some(Cursor::new(bytes));
        self.last_block_start = None;
        self.live_len = None;
        Ok(len)
    }

    /// Decode the next block.
    ///
    /// Decodes from the loaded copy when [`is_filled`](Self::is_filled),
    /// otherwise from `live`. Fails with [`LogError::NoInput`] if there is
    /// neither.
    pub fn read_block(&mut self, live: Option<&mut dyn ReadSeek>) -> Result<Block, LogError> {
        self.check_open()?;
        if let Some(cursor) = self.filled.as_mut() {
            let start = cursor.position();
            let block = decode_block(cursor)?;
            self.last_block_start = Some(start);
            return Ok(block);
        }
        let live = live.ok_or(LogError::NoInput)?;
        let start = live.stream_position()?;
        let block = decode_block(live)?;
        self.last_block_start = Some(start);
        Ok(block)
    }

    /// True if the active source is exhausted, or there is no source.
    ///
    /// In incremental mode the live stream's length is measured once and
    /// re-measured only when the position reaches it.
    pub fn is_end_of_stream(&mut self, live: Option<&mut dyn ReadSeek>) -> Result<bool, LogError> {
        self.check_open()?;
        if let Some(cursor) = self.filled.as_ref() {
            return Ok(cursor.position() >= cursor.get_ref().len() as u64);
        }
        let Some(live) = live else {
            return Ok(true);
        };
        let pos = live.stream_position()?;
        if self.live_len.is_some_and(|len| pos < len) {
            return Ok(false);
        }
        // Measure again only when the cached length is reached, so data
        // appended since the last measurement is still seen.
        let end = live.seek(SeekFrom::End(0))?;
        if pos != end {
            live.seek(SeekFrom::Start(pos))?;
        }
        self.live_len = Some(end);
        Ok(pos >= end)
    }

    /// Move back to the start of the most recently decoded block.
    ///
    /// Returns `false` if no block has been decoded since the last load,
    /// reset or rewind.
    pub fn rewind_one_block(&mut self, live: Option<&mut dyn ReadSeek>) -> Result<bool, LogError> {
        self.check_open()?;
        let Some(start) = self.last_block_start else {
            return Ok(false);
        };
        if let Some(cursor) = self.filled.as_mut() {
            cursor.set_position(start);
        } else {
            let live = live.ok_or(LogError::NoInput)?;
            live.seek(SeekFrom::Start(start))?;
        }
        self.last_block_start = None;
        Ok(true)
    }

    /// Move the loaded copy back to its first byte.
    pub fn reset_to_start(&mut self) -> Result<(), LogError> {
        self.check_open()?;
        let cursor = self.filled.as_mut().ok_or(LogError::NoInput)?;
        cursor.set_position(0);
        self.last_block_start = None;
        Ok(())
    }

    /// Position within the loaded copy, if there is one.
    pub fn position(&self) -> Option<u64> {
        self.filled.as_ref().map(Cursor::position)
    }

    /// True once a bulk load has happened.
    pub fn is_filled(&self) -> bool {
        self.filled.is_some()
    }

    /// False once [`close`](Self::close) has been called.
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Drop any loaded bytes. Idempotent.
    pub fn close(&mut self) {
        self.filled = None;
        self.last_block_start = None;
        self.live_len = None;
        self.closed = true;
    }

    fn check_open(&self) -> Result<(), LogError> {
        if self.closed {
            Err(LogError::Closed { resource: RESOURCE })
        } else {
            Ok(())
        }
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_buffer::WriteBuffer;
    use blocklog_core::{BlockKind, RefId};

    fn three_blocks() -> Vec<u8> {
        let mut wb = WriteBuffer::new();
        for ts in 1..=3 {
            wb.write_block(&[ts as u8; 4], RefId(0), BlockKind::FULL, ts)
                .unwrap();
        }
        let mut out = Vec::new();
        wb.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn bulk_mode_reads_to_end() {
        let mut source = Cursor::new(three_blocks());
        source.set_position(7);

        let mut rb = ReadBuffer::new();
        rb.read_from(&mut source).unwrap();
        assert!(rb.is_filled());

        let stamps: Vec<i64> = (0..3)
            .map(|_| rb.read_block(None).unwrap().metadata.timestamp)
            .collect();
        assert_eq!(stamps, vec![1, 2, 3]);
        assert!(rb.is_end_of_stream(None).unwrap());
    }

    #[test]
    fn rewind_rereads_same_block() {
        let mut rb = ReadBuffer::new();
        rb.read_from(&mut Cursor::new(three_blocks())).unwrap();

        rb.read_block(None).unwrap();
        let second = rb.read_block(None).unwrap();
        assert!(rb.rewind_one_block(None).unwrap());
        assert_eq!(rb.read_block(None).unwrap(), second);
    }

    #[test]
    fn rewind_is_single_step() {
        let mut rb = ReadBuffer::new();
        rb.read_from(&mut Cursor::new(three_blocks())).unwrap();
        rb.read_block(None).unwrap();
        assert!(rb.rewind_one_block(None).unwrap());
        assert!(!rb.rewind_one_block(None).unwrap());
        assert_eq!(rb.read_block(None).unwrap().metadata.timestamp, 1);
    }

    #[test]
    fn incremental_mode_uses_live_stream() {
        let mut live = Cursor::new(three_blocks());
        let mut rb = ReadBuffer::new();

        let first = rb.read_block(Some(&mut live)).unwrap();
        assert_eq!(first.metadata.timestamp, 1);
        let second = rb.read_block(Some(&mut live)).unwrap();
        assert!(rb.rewind_one_block(Some(&mut live)).unwrap());
        assert_eq!(rb.read_block(Some(&mut live)).unwrap(), second);

        assert!(!rb.is_end_of_stream(Some(&mut live)).unwrap());
        rb.read_block(Some(&mut live)).unwrap();
        assert!(rb.is_end_of_stream(Some(&mut live)).unwrap());
        assert!(!rb.is_filled());
    }

    struct CountingSeeks {
        inner: Cursor<Vec<u8>>,
        end_seeks: usize,
    }

    impl Read for CountingSeeks {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for CountingSeeks {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            if matches!(pos, SeekFrom::End(_)) {
                self.end_seeks += 1;
            }
            self.inner.seek(pos)
        }
    }

    #[test]
    fn incremental_end_check_measures_length_rarely() {
        let mut live = CountingSeeks {
            inner: Cursor::new(three_blocks()),
            end_seeks: 0,
        };
        let mut rb = ReadBuffer::new();
        let mut blocks = 0;
        while !rb.is_end_of_stream(Some(&mut live)).unwrap() {
            rb.read_block(Some(&mut live)).unwrap();
            blocks += 1;
        }
        assert_eq!(blocks, 3);
        // Once up front, once more on reaching the end.
        assert_eq!(live.end_seeks, 2);
    }

    #[test]
    fn incremental_end_check_sees_appended_blocks() {
        let mut live = Cursor::new(three_blocks());
        let mut rb = ReadBuffer::new();
        while !rb.is_end_of_stream(Some(&mut live)).unwrap() {
            rb.read_block(Some(&mut live)).unwrap();
        }

        let pos = live.position();
        let more = three_blocks();
        live.get_mut().extend_from_slice(&more);
        live.set_position(pos);
        assert!(!rb.is_end_of_stream(Some(&mut live)).unwrap());
        assert_eq!(rb.read_block(Some(&mut live)).unwrap().metadata.timestamp, 1);
    }

    #[test]
    fn no_source_is_end_of_stream() {
        let mut rb = ReadBuffer::new();
        assert!(rb.is_end_of_stream(None).unwrap());
        assert!(matches!(rb.read_block(None), Err(LogError::NoInput)));
        assert!(matches!(rb.reset_to_start(), Err(LogError::NoInput)));
    }

    #[test]
    fn reset_to_start_replays_everything() {
        let mut rb = ReadBuffer::new();
        rb.read_from(&mut Cursor::new(three_blocks())).unwrap();
        while !rb.is_end_of_stream(None).unwrap() {
            rb.read_block(None).unwrap();
        }
        rb.reset_to_start().unwrap();
        assert_eq!(rb.position(), Some(0));
        assert_eq!(rb.read_block(None).unwrap().metadata.timestamp, 1);
    }

    #[test]
    fn closed_buffer_refuses_everything() {
        let mut rb = ReadBuffer::new();
        rb.read_from(&mut Cursor::new(three_blocks())).unwrap();
        rb.close();
        rb.close();
        assert!(!rb.is_open());
        assert!(!rb.is_filled());
        assert!(matches!(rb.read_block(None), Err(LogError::Closed { .. })));
        assert!(matches!(
            rb.is_end_of_stream(None),
            Err(LogError::Closed { .. })
        ));
        assert!(matches!(
            rb.read_from(&mut Cursor::new(Vec::new())),
            Err(LogError::Closed { .. })
        ));
    }
}
