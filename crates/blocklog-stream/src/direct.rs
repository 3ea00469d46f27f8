//! Header-less, cache-less point-to-point framing.
//!
//! Both peers register the same types in the same order, so the
//! registration ids agree without a header ever being exchanged. Every
//! call frames or decodes exactly one block.

use std::io::{Read, Write};
use std::sync::Arc;

use blocklog_core::{BlockKind, Codec, NamedRecord, Record, RefId};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{LogError, ResultExt};
use crate::header::Header;
use crate::metadata::BlockMetadata;
use crate::reader::ReadRecord;
use crate::wire::{decode_block, encode_block};

/// Frames single records straight to a caller-supplied stream.
pub struct DirectWriter {
    header: Mutex<Header>,
    codec: Arc<dyn Codec>,
    compress: bool,
}

impl DirectWriter {
    /// Create a writer. `compress` must match the peer's reader.
    pub fn new(codec: Arc<dyn Codec>, compress: bool) -> Self {
        Self {
            header: Mutex::new(Header::new()),
            codec,
            compress,
        }
    }

    /// Register a type under the next id.
    pub fn register_type(&self, type_name: &str) -> Result<RefId, LogError> {
        self.header
            .lock()
            .register_type(self.codec.as_ref(), type_name, BlockKind::NONE)
    }

    /// [`register_type`](Self::register_type) for a statically named type.
    pub fn register<T: NamedRecord>(&self) -> Result<RefId, LogError> {
        self.register_type(T::TYPE_NAME)
    }

    /// Snapshot of the registry.
    pub fn header(&self) -> Header {
        self.header.lock().clone()
    }

    /// Frame `record` to `output` as one block of kind `NONE`.
    ///
    /// The block is assembled in memory and written with a single
    /// `write_all`.
    pub fn write<W: Write + ?Sized>(
        &self,
        output: &mut W,
        record: &dyn Record,
        timestamp: i64,
    ) -> Result<(), LogError> {
        self.frame(output, record, timestamp)
            .context("error writing to data buffer")
    }

    fn frame<W: Write + ?Sized>(
        &self,
        output: &mut W,
        record: &dyn Record,
        timestamp: i64,
    ) -> Result<(), LogError> {
        let header = self.header.lock();
        let type_name = record.type_name();
        let type_id = header
            .registration_id(type_name)
            .ok_or_else(|| LogError::UnregisteredType {
                type_name: type_name.to_string(),
            })?;
        let payload = self.codec.encode(true, self.compress, type_name, record)?;
        let block_size = i32::try_from(payload.len()).map_err(|_| {
            LogError::malformed(format!("payload of {} bytes is too large", payload.len()))
        })?;

        let mut frame = Vec::with_capacity(payload.len() + 24);
        encode_block(
            &mut frame,
            &BlockMetadata::new(type_id, timestamp, block_size, BlockKind::NONE),
            &payload,
        )?;
        output.write_all(&frame)?;
        debug!(type_name, type_id = type_id.0, timestamp, bytes = frame.len(), "direct write");
        Ok(())
    }
}

/// Decodes single blocks framed by a [`DirectWriter`].
pub struct DirectReader {
    header: Mutex<Header>,
    codec: Arc<dyn Codec>,
    compress: bool,
}

impl DirectReader {
    /// Create a reader. `compress` must match the peer's writer.
    pub fn new(codec: Arc<dyn Codec>, compress: bool) -> Self {
        Self {
            header: Mutex::new(Header::new()),
            codec,
            compress,
        }
    }

    /// Register a type under the next id.
    pub fn register_type(&self, type_name: &str) -> Result<RefId, LogError> {
        self.header
            .lock()
            .register_type(self.codec.as_ref(), type_name, BlockKind::NONE)
    }

    /// [`register_type`](Self::register_type) for a statically named type.
    pub fn register<T: NamedRecord>(&self) -> Result<RefId, LogError> {
        self.register_type(T::TYPE_NAME)
    }

    /// Decode the next block from `input`.
    ///
    /// The whole block is consumed before its type is resolved, so the
    /// stream stays aligned even when the id is unknown
    /// ([`LogError::UnknownTypeId`]).
    pub fn read<R: Read + ?Sized>(&self, input: &mut R) -> Result<ReadRecord, LogError> {
        self.decode(input).context("error reading buffer information")
    }

    fn decode<R: Read + ?Sized>(&self, input: &mut R) -> Result<ReadRecord, LogError> {
        let block = decode_block(input)?;
        let meta = block.metadata;
        let header = self.header.lock();
        let type_name = header
            .registration_type(meta.type_id)
            .ok_or(LogError::UnknownTypeId { id: meta.type_id })?;
        let payload = self
            .codec
            .decode(true, self.compress, Some(type_name), &block.payload)?;
        debug!(type_name, type_id = meta.type_id.0, timestamp = meta.timestamp, "direct read");
        Ok(ReadRecord {
            timestamp: meta.timestamp,
            payload: Arc::from(payload),
            kind: meta.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocklog_test_utils::{test_codec, TestData, TestDataSmall, UnmarkedTestData};
    use std::io::Cursor;

    fn pair() -> (DirectWriter, DirectReader) {
        let codec: Arc<dyn Codec> = Arc::new(test_codec());
        (
            DirectWriter::new(codec.clone(), false),
            DirectReader::new(codec, false),
        )
    }

    #[test]
    fn roundtrip_single_record() {
        let (writer, reader) = pair();
        writer.register::<TestData>().unwrap();
        reader.register::<TestData>().unwrap();

        let sent = TestData::seeded(11);
        let mut wire = Vec::new();
        writer.write(&mut wire, &sent, 42).unwrap();
        assert!(!wire.is_empty());

        let got = reader.read(&mut wire.as_slice()).unwrap();
        assert_eq!(got.timestamp, 42);
        assert_eq!(got.kind, BlockKind::NONE);
        assert_eq!(got.downcast_ref::<TestData>(), Some(&sent));
    }

    #[test]
    fn unregistered_write_fails_and_writes_nothing() {
        let (writer, _) = pair();
        writer.register::<TestData>().unwrap();
        let mut wire = Vec::new();
        let err = writer
            .write(&mut wire, &TestDataSmall::seeded(0), 0)
            .unwrap_err();
        assert!(matches!(err.root(), LogError::UnregisteredType { .. }));
        assert!(wire.is_empty());
    }

    #[test]
    fn unknown_id_consumes_block() {
        let (writer, reader) = pair();
        writer.register::<TestData>().unwrap();
        writer.register::<TestDataSmall>().unwrap();
        reader.register::<TestData>().unwrap();

        let mut wire = Cursor::new(Vec::new());
        writer.write(&mut wire, &TestDataSmall::seeded(1), 1).unwrap();
        writer.write(&mut wire, &TestData::seeded(2), 2).unwrap();
        wire.set_position(0);

        let err = reader.read(&mut wire).unwrap_err();
        assert!(matches!(err.root(), LogError::UnknownTypeId { id } if *id == RefId(1)));
        let next = reader.read(&mut wire).unwrap();
        assert_eq!(next.downcast_ref::<TestData>(), Some(&TestData::seeded(2)));
    }

    #[test]
    fn compressed_peers_agree() {
        let codec: Arc<dyn Codec> = Arc::new(test_codec());
        let writer = DirectWriter::new(codec.clone(), true);
        let reader = DirectReader::new(codec, true);
        writer.register::<TestData>().unwrap();
        reader.register::<TestData>().unwrap();

        let sent = TestData::seeded(5);
        let mut wire = Vec::new();
        writer.write(&mut wire, &sent, 0).unwrap();
        let got = reader.read(&mut wire.as_slice()).unwrap();
        assert_eq!(got.downcast_ref::<TestData>(), Some(&sent));
    }

    #[test]
    fn codec_rejected_type_cannot_register() {
        let (writer, _) = pair();
        assert!(matches!(
            writer.register::<UnmarkedTestData>(),
            Err(LogError::TypeRejected { .. })
        ));
    }

    #[test]
    fn empty_input_is_stream_error() {
        let (_, reader) = pair();
        let err = reader.read(&mut std::io::empty()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Stream);
    }
}
