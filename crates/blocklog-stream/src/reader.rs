//! Block stream reader.
//!
//! [`CachedReader`] decodes the stream preamble, then replays data blocks
//! in stream order. Decoded records are pushed to subscribers
//! ([`read_data`](CachedReader::read_data),
//! [`read_next_data`](CachedReader::read_next_data)) or pulled through
//! [`records`](CachedReader::records).

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::Arc;

use blocklog_core::{BlockKind, Codec, Record};
use crossbeam_channel::Sender;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{LogError, ResultExt};
use crate::header::Header;
use crate::metadata::Block;
use crate::read_buffer::{ReadBuffer, ReadSeek};
use crate::wire::decode_header;
use crate::SIGNATURE;

const RESOURCE: &str = "reader";

/// Reader settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Fail [`read_header`](CachedReader::read_header) when the stream
    /// signature does not match. When `false` the mismatch is logged and
    /// reading continues.
    pub strict_signature: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            strict_signature: true,
        }
    }
}

/// One decoded data block.
#[derive(Clone, Debug)]
pub struct ReadRecord {
    /// Timestamp the block was written with.
    pub timestamp: i64,
    /// The decoded payload.
    pub payload: Arc<dyn Record>,
    /// How the block was written.
    pub kind: BlockKind,
}

impl ReadRecord {
    /// Downcast the payload to a concrete record type.
    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

/// Receives decoded records, synchronously and in stream order.
///
/// Implemented for closures and for `crossbeam_channel::Sender`. A
/// bounded channel blocks decoding while it is full.
pub trait RecordSink: Send {
    /// Accept one record.
    fn deliver(&mut self, record: &ReadRecord) -> Result<(), LogError>;
}

impl<F> RecordSink for F
where
    F: FnMut(&ReadRecord) + Send,
{
    fn deliver(&mut self, record: &ReadRecord) -> Result<(), LogError> {
        self(record);
        Ok(())
    }
}

impl RecordSink for Sender<ReadRecord> {
    fn deliver(&mut self, record: &ReadRecord) -> Result<(), LogError> {
        self.send(record.clone())
            .map_err(|_| LogError::SinkDisconnected)
    }
}

/// Replays a block stream written by a
/// [`CachedWriter`](crate::CachedWriter).
///
/// Reads either from a bulk-loaded copy of the input
/// ([`read_from_stream`](Self::read_from_stream)) or incrementally from
/// the live input. A timestamp ceiling stops the replay just before the
/// first block at or past it; that block is left unconsumed and a later
/// read resumes exactly there.
///
/// A stream may hold several writer sessions back to back. When a later
/// session's preamble is reached, its header and encoding flag replace
/// the active ones for every block that follows.
pub struct CachedReader<R> {
    input: Option<R>,
    codec: Arc<dyn Codec>,
    config: ReaderConfig,
    buffer: ReadBuffer,
    header: Option<Header>,
    header_read: bool,
    signature: Option<Uuid>,
    compressed: bool,
    sinks: Vec<Box<dyn RecordSink>>,
    records_read: u64,
}

impl<R: Read + Seek> CachedReader<R> {
    /// Create a reader over `input`.
    pub fn new(input: R, codec: Arc<dyn Codec>, config: ReaderConfig) -> Self {
        Self {
            input: Some(input),
            codec,
            config,
            buffer: ReadBuffer::new(),
            header: None,
            header_read: false,
            signature: None,
            compressed: false,
            sinks: Vec::new(),
            records_read: 0,
        }
    }

    /// Supply a header up front.
    ///
    /// [`read_header`](Self::read_header) still decodes the stream's own
    /// header but keeps this one, warning if they differ.
    pub fn set_header(&mut self, header: Header) {
        self.header = Some(header);
    }

    /// Add a subscriber. Subscribers are called in the order added.
    pub fn subscribe(&mut self, sink: impl RecordSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Bulk-load the whole input into memory. Optional: without it the
    /// reader decodes directly from the input.
    ///
    /// Returns the number of bytes loaded.
    pub fn read_from_stream(&mut self) -> Result<u64, LogError> {
        self.load().context("error reading from input stream")
    }

    fn load(&mut self) -> Result<u64, LogError> {
        self.check_open()?;
        let input = self.input.as_mut().ok_or(LogError::NoInput)?;
        let bytes = self.buffer.read_from(input)?;
        debug!(bytes, "loaded input stream");
        Ok(bytes)
    }

    /// Decode the signature, encoding flag and header blocks.
    ///
    /// With a bulk-loaded buffer this always starts from the first byte;
    /// otherwise it reads from the input's current position.
    pub fn read_header(&mut self) -> Result<(), LogError> {
        self.decode_preamble().context("error reading header")
    }

    fn decode_preamble(&mut self) -> Result<(), LogError> {
        self.check_open()?;
        if self.buffer.is_filled() {
            self.buffer.reset_to_start()?;
        } else if self.input.is_none() {
            return Err(LogError::NoInput);
        }

        let sig_block = self.next_block()?;
        let decoded = self.decode_session(&sig_block)?;
        debug!(
            version = %decoded.version(),
            types = decoded.len(),
            compressed = self.compressed,
            "read stream header"
        );

        match self.header.as_ref() {
            Some(existing) => {
                if *existing != decoded {
                    warn!(
                        supplied = %existing.version(),
                        stream = %decoded.version(),
                        "stream header differs from supplied header"
                    );
                }
            }
            None => self.header = Some(decoded),
        }
        self.header_read = true;
        Ok(())
    }

    /// Decode one session preamble, starting from its already-read
    /// signature block. Adopts the session's encoding flag and returns its
    /// header with the reverse index rebuilt.
    fn decode_session(&mut self, sig_block: &Block) -> Result<Header, LogError> {
        let signature = expect_framing(sig_block, BlockKind::SIGNATURE, 16, "signature")?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(signature);
        let signature = Uuid::from_bytes(raw);
        self.signature = Some(signature);
        if signature != SIGNATURE {
            if self.config.strict_signature {
                return Err(LogError::InvalidSignature { found: signature });
            }
            warn!(found = %signature, "stream signature mismatch");
        }

        let enc_block = self.next_block()?;
        let flag = expect_framing(&enc_block, BlockKind::SIGNATURE, 1, "encoding flag")?;
        self.compressed = flag[0] != 0;

        let header_block = self.next_block()?;
        if header_block.metadata.kind != BlockKind::HEADER {
            return Err(LogError::malformed(format!(
                "expected header block, found {}",
                header_block.metadata.kind
            )));
        }
        let mut decoded = decode_header(&header_block.payload)?;
        decoded.reset_registration_ids()?;
        Ok(decoded)
    }

    /// Replay data blocks until the end of the stream, or until the first
    /// block with `timestamp >= ceiling`.
    ///
    /// Each record is delivered to every subscriber before the next block
    /// is decoded. Returns the number of records delivered.
    pub fn read_data(&mut self, ceiling: Option<i64>) -> Result<usize, LogError> {
        let mut delivered = 0;
        while let Some(record) = self.next_record(None, ceiling).context("error reading data")? {
            self.publish(&record).context("error reading data")?;
            delivered += 1;
        }
        debug!(records = delivered, ?ceiling, "read data");
        Ok(delivered)
    }

    /// Decode and deliver exactly one data block.
    ///
    /// `read_type` overrides the header lookup to choose the type to
    /// decode into. Returns `false` at the end of the stream.
    pub fn read_next_data(&mut self, read_type: Option<&str>) -> Result<bool, LogError> {
        match self.next_record(read_type, None).context("error reading data")? {
            Some(record) => {
                self.publish(&record).context("error reading data")?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pull decoded records instead of pushing them to subscribers.
    ///
    /// Subscribers are not called. The iterator ends at the end of the
    /// stream, at the ceiling, or after yielding the first error.
    pub fn records(&mut self, ceiling: Option<i64>) -> Records<'_, R> {
        Records {
            reader: self,
            ceiling,
            done: false,
        }
    }

    fn publish(&mut self, record: &ReadRecord) -> Result<(), LogError> {
        for sink in &mut self.sinks {
            sink.deliver(record)?;
        }
        Ok(())
    }

    fn next_block(&mut self) -> Result<Block, LogError> {
        let live = self.input.as_mut().map(|r| r as &mut dyn ReadSeek);
        self.buffer.read_block(live)
    }

    fn at_end(&mut self) -> Result<bool, LogError> {
        if !self.buffer.is_filled() && self.input.is_none() {
            return Err(LogError::NoInput);
        }
        let live = self.input.as_mut().map(|r| r as &mut dyn ReadSeek);
        self.buffer.is_end_of_stream(live)
    }

    fn rewind(&mut self) -> Result<bool, LogError> {
        let live = self.input.as_mut().map(|r| r as &mut dyn ReadSeek);
        self.buffer.rewind_one_block(live)
    }

    fn next_record(
        &mut self,
        read_type: Option<&str>,
        ceiling: Option<i64>,
    ) -> Result<Option<ReadRecord>, LogError> {
        self.check_open()?;
        if !self.header_read {
            return Err(LogError::HeaderNotRead);
        }

        let block = loop {
            if self.at_end()? {
                return Ok(None);
            }
            let block = self.next_block()?;
            if let Some(ceiling) = ceiling {
                if block.metadata.timestamp >= ceiling {
                    self.rewind()?;
                    trace!(
                        timestamp = block.metadata.timestamp,
                        ceiling,
                        "stopped at ceiling"
                    );
                    return Ok(None);
                }
            }
            // A later writer session appended to the same stream opens
            // with its own preamble; its registry and encoding replace the
            // active ones.
            if block
                .metadata
                .kind
                .intersects(BlockKind::SIGNATURE | BlockKind::HEADER)
            {
                let decoded = self.decode_session(&block)?;
                debug!(
                    timestamp = block.metadata.timestamp,
                    version = %decoded.version(),
                    types = decoded.len(),
                    compressed = self.compressed,
                    "switched to appended session"
                );
                self.header = Some(decoded);
                continue;
            }
            break block;
        };

        let header = self.header.as_ref().ok_or(LogError::HeaderNotRead)?;
        let meta = block.metadata;
        let typed = block.is_typed();
        let type_name = match read_type {
            Some(name) => Some(name),
            None if typed => Some(
                header
                    .registration_type(meta.type_id)
                    .ok_or(LogError::UnknownTypeId { id: meta.type_id })?,
            ),
            None => None,
        };
        let payload = self
            .codec
            .decode(typed, self.compressed, type_name, &block.payload)?;

        self.records_read += 1;
        trace!(
            timestamp = meta.timestamp,
            type_id = meta.type_id.0,
            kind = %meta.kind,
            bytes = block.payload.len(),
            "decoded record"
        );
        Ok(Some(ReadRecord {
            timestamp: meta.timestamp,
            payload: Arc::from(payload),
            kind: meta.kind,
        }))
    }

    /// The signature found by [`read_header`](Self::read_header).
    pub fn signature(&self) -> Option<Uuid> {
        self.signature
    }

    /// True if the stream's signature is the blocklog signature.
    pub fn signature_matches(&self) -> bool {
        self.signature == Some(SIGNATURE)
    }

    /// True if the stream's payloads are compressed.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// The active header: the supplied one, else the decoded one.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Version check against the active header. `false` if there is none.
    pub fn verify(&self, major: u32, minor: u32, revision: u32) -> bool {
        self.header
            .as_ref()
            .is_some_and(|h| h.verify(major, minor, revision))
    }

    /// Number of data records decoded so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Release the input, the buffer and every subscriber. Idempotent.
    pub fn close(&mut self) {
        if !self.buffer.is_open() {
            return;
        }
        self.buffer.close();
        self.input = None;
        self.sinks.clear();
        debug!(records = self.records_read, "reader closed");
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        !self.buffer.is_open()
    }

    fn check_open(&self) -> Result<(), LogError> {
        if self.buffer.is_open() {
            Ok(())
        } else {
            Err(LogError::Closed { resource: RESOURCE })
        }
    }
}

impl CachedReader<BufReader<File>> {
    /// Open the file at `path` for reading.
    pub fn open(
        path: impl AsRef<Path>,
        codec: Arc<dyn Codec>,
        config: ReaderConfig,
    ) -> Result<Self, LogError> {
        let file = File::open(path.as_ref()).context("error initializing input file")?;
        debug!(path = %path.as_ref().display(), "opened input file");
        Ok(Self::new(BufReader::new(file), codec, config))
    }
}

impl<R> fmt::Debug for CachedReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedReader")
            .field("config", &self.config)
            .field("header_read", &self.header_read)
            .field("signature", &self.signature)
            .field("compressed", &self.compressed)
            .field("subscribers", &self.sinks.len())
            .field("records_read", &self.records_read)
            .finish_non_exhaustive()
    }
}

/// Pull iterator over decoded records. See [`CachedReader::records`].
pub struct Records<'a, R> {
    reader: &'a mut CachedReader<R>,
    ceiling: Option<i64>,
    done: bool,
}

impl<R: Read + Seek> Iterator for Records<'_, R> {
    type Item = Result<ReadRecord, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_record(None, self.ceiling) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Check a framing block's kind and payload length; return its payload.
fn expect_framing<'a>(
    block: &'a Block,
    kind: BlockKind,
    len: usize,
    what: &str,
) -> Result<&'a [u8], LogError> {
    if block.metadata.kind != kind || block.payload.len() != len {
        return Err(LogError::malformed(format!(
            "expected {what} block of {len} bytes, found {} block of {} bytes",
            block.metadata.kind,
            block.payload.len()
        )));
    }
    Ok(&block.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::writer::{CachedWriter, WriterConfig};
    use blocklog_codec::DynamicRecord;
    use blocklog_core::NamedRecord;
    use blocklog_test_utils::{test_codec, TestData, UnmarkedTestData};
    use std::io::Cursor;

    fn stream(stamps: &[i64]) -> Vec<u8> {
        let codec = Arc::new(test_codec());
        let w = CachedWriter::new(Vec::new(), codec, WriterConfig::default());
        w.register::<TestData>(BlockKind::FULL).unwrap();
        for (i, &ts) in stamps.iter().enumerate() {
            w.write(ts, &TestData::seeded(i as u64)).unwrap();
        }
        w.flush_to_stream().unwrap();
        w.into_inner().unwrap()
    }

    fn reader(bytes: Vec<u8>) -> CachedReader<Cursor<Vec<u8>>> {
        CachedReader::new(
            Cursor::new(bytes),
            Arc::new(test_codec()),
            ReaderConfig::default(),
        )
    }

    #[test]
    fn data_before_header_fails() {
        let mut r = reader(stream(&[1]));
        let err = r.read_data(None).unwrap_err();
        assert!(matches!(err.root(), LogError::HeaderNotRead));
        assert!(r.read_next_data(None).is_err());
    }

    #[test]
    fn read_next_data_steps_one_block() {
        let mut r = reader(stream(&[1, 2]));
        r.read_header().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        r.subscribe(tx);

        assert!(r.read_next_data(None).unwrap());
        assert_eq!(rx.try_recv().unwrap().timestamp, 1);
        assert!(rx.try_recv().is_err());
        assert!(r.read_next_data(None).unwrap());
        assert!(!r.read_next_data(None).unwrap());
        assert_eq!(r.records_read(), 2);
    }

    #[test]
    fn ceiling_is_exclusive_and_resumable() {
        let mut r = reader(stream(&[10, 20, 30]));
        r.read_from_stream().unwrap();
        r.read_header().unwrap();

        let head: Vec<i64> = r
            .records(Some(20))
            .map(|rec| rec.unwrap().timestamp)
            .collect();
        assert_eq!(head, vec![10]);

        let rest: Vec<i64> = r.records(None).map(|rec| rec.unwrap().timestamp).collect();
        assert_eq!(rest, vec![20, 30]);
    }

    #[test]
    fn incremental_ceiling_rewinds_live_stream() {
        let mut r = reader(stream(&[10, 20, 30]));
        r.read_header().unwrap();
        assert_eq!(r.read_data(Some(25)).unwrap(), 2);
        assert_eq!(r.read_data(None).unwrap(), 1);
    }

    #[test]
    fn strict_signature_rejects_foreign_stream() {
        let mut bytes = stream(&[1]);
        // Signature payload starts after the i32 length and 20-byte metadata.
        bytes[24] ^= 0xff;
        let mut r = reader(bytes.clone());
        let err = r.read_header().unwrap_err();
        assert!(matches!(err.root(), LogError::InvalidSignature { .. }));

        let mut lenient = CachedReader::new(
            Cursor::new(bytes),
            Arc::new(test_codec()),
            ReaderConfig {
                strict_signature: false,
            },
        );
        lenient.read_header().unwrap();
        assert!(!lenient.signature_matches());
        assert_eq!(lenient.read_data(None).unwrap(), 1);
    }

    #[test]
    fn supplied_header_is_kept() {
        let mut supplied = Header::new();
        supplied.register_version(9, 9, 9);
        let mut r = reader(stream(&[1]));
        r.set_header(supplied.clone());
        r.read_header().unwrap();
        assert_eq!(r.header(), Some(&supplied));
        assert!(r.verify(9, 9, 9));
    }

    #[test]
    fn verify_without_header_is_false() {
        let r = reader(stream(&[1]));
        assert!(!r.verify(0, 0, 0));
    }

    #[test]
    fn untyped_block_decodes_with_override() {
        let codec = Arc::new(test_codec());
        let w = CachedWriter::new(Vec::new(), codec, WriterConfig::default());
        let unmarked = UnmarkedTestData::seeded(3);
        w.write(7, &unmarked).unwrap();
        w.write(8, &unmarked).unwrap();
        w.flush_to_stream().unwrap();

        let mut r = reader(w.into_inner().unwrap());
        r.read_header().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        r.subscribe(tx);

        assert!(r.read_next_data(Some(UnmarkedTestData::TYPE_NAME)).unwrap());
        let rec = rx.try_recv().unwrap();
        assert_eq!(rec.downcast_ref::<UnmarkedTestData>(), Some(&unmarked));
        assert_eq!(rec.kind, BlockKind::IMMEDIATE);

        // Without an override the payload comes back schema-less.
        assert!(r.read_next_data(None).unwrap());
        let rec = rx.try_recv().unwrap();
        let dynamic = rec.downcast_ref::<DynamicRecord>().unwrap();
        assert_eq!(
            dynamic.field("label"),
            Some(&serde_json::Value::from(unmarked.label.clone()))
        );
    }

    #[test]
    fn closure_and_channel_sinks_both_see_records() {
        let mut r = reader(stream(&[1, 2, 3]));
        r.read_header().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let (count_tx, count_rx) = crossbeam_channel::unbounded();
        r.subscribe(move |rec: &ReadRecord| {
            count_tx.send(rec.timestamp).unwrap();
        });
        r.subscribe(tx);

        assert_eq!(r.read_data(None).unwrap(), 3);
        assert_eq!(count_rx.try_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(rx.try_iter().count(), 3);
    }

    #[test]
    fn dropped_channel_is_sink_disconnected() {
        let mut r = reader(stream(&[1]));
        r.read_header().unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        r.subscribe(tx);
        let err = r.read_data(None).unwrap_err();
        assert!(matches!(err.root(), LogError::SinkDisconnected));
    }

    #[test]
    fn closed_reader_refuses_everything() {
        let mut r = reader(stream(&[1]));
        r.read_header().unwrap();
        r.close();
        r.close();
        assert!(r.is_closed());
        for err in [
            r.read_header().unwrap_err(),
            r.read_data(None).unwrap_err(),
            r.read_from_stream().unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Stream);
        }
    }
}
