//! Cached block writer.
//!
//! [`CachedWriter`] keeps the latest state of every entity it has been
//! given and frames a consistent snapshot of that cache on demand. The
//! caller controls both when the cache is framed
//! ([`write_buffer`](CachedWriter::write_buffer)) and when framed bytes
//! reach the output ([`flush_to_stream`](CachedWriter::flush_to_stream)).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use blocklog_core::{BlockKind, Codec, EntityId, NamedRecord, Record, RefId};
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{LogError, ResultExt};
use crate::header::Header;
use crate::wire::encode_header;
use crate::write_buffer::WriteBuffer;
use crate::SIGNATURE;

const RESOURCE: &str = "writer";

/// Writer settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterConfig {
    /// Ask the codec to compress every data payload.
    pub compress: bool,
    /// Empty the cache after every [`write_buffer`](CachedWriter::write_buffer).
    pub clear_cache_on_write: bool,
}

/// Where a [`CachedWriter`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterPhase {
    /// Types and the version may still be registered.
    HeaderPending,
    /// The signature, encoding and header blocks have been framed.
    HeaderWritten,
    /// [`close`](CachedWriter::close) has been called.
    Closed,
}

struct WriterState<W> {
    header: Header,
    phase: WriterPhase,
    cache: IndexMap<EntityId, Arc<dyn Record>>,
    touched: IndexSet<EntityId>,
    buffer: WriteBuffer,
    output: Option<W>,
}

impl<W> WriterState<W> {
    fn check_open(&self) -> Result<(), LogError> {
        if self.phase == WriterPhase::Closed {
            Err(LogError::Closed { resource: RESOURCE })
        } else {
            Ok(())
        }
    }

    fn check_registrable(&self) -> Result<(), LogError> {
        self.check_open()?;
        if self.phase == WriterPhase::HeaderWritten {
            return Err(LogError::HeaderAlreadyWritten);
        }
        Ok(())
    }

    /// Frame the signature, encoding flag and header blocks, once.
    fn ensure_header(&mut self, compress: bool, timestamp: i64) -> Result<(), LogError> {
        if self.phase != WriterPhase::HeaderPending {
            return Ok(());
        }
        let header_bytes = encode_header(&self.header)?;
        self.buffer.write_block(
            SIGNATURE.as_bytes(),
            RefId::UNTYPED,
            BlockKind::SIGNATURE,
            timestamp,
        )?;
        self.buffer.write_block(
            &[u8::from(compress)],
            RefId::UNTYPED,
            BlockKind::SIGNATURE,
            timestamp,
        )?;
        self.buffer
            .write_block(&header_bytes, RefId::UNTYPED, BlockKind::HEADER, timestamp)?;
        self.phase = WriterPhase::HeaderWritten;
        debug!(
            timestamp,
            types = self.header.len(),
            version = %self.header.version(),
            compress,
            "framed stream header"
        );
        Ok(())
    }

    /// Frame every eligible cached record. Leaves `touched` alone on error.
    fn frame_cache(
        &mut self,
        codec: &dyn Codec,
        config: WriterConfig,
        timestamp: i64,
        partial: bool,
    ) -> Result<usize, LogError> {
        let flush = if partial {
            BlockKind::PARTIAL
        } else {
            BlockKind::FULL
        };
        let Self {
            header,
            cache,
            touched,
            buffer,
            ..
        } = self;

        let candidates: Vec<&Arc<dyn Record>> = if partial {
            touched.iter().filter_map(|id| cache.get(id)).collect()
        } else {
            cache.values().collect()
        };

        let mut framed = 0;
        for record in candidates {
            if !header.registration_output(record.type_name()).admits(flush) {
                continue;
            }
            let (type_id, payload) = encode_record(codec, header, config.compress, record.as_ref())
                .inspect_err(|e| {
                    warn!(
                        record_id = %record.record_id(),
                        type_name = record.type_name(),
                        error = %e,
                        "failed to frame cached record"
                    );
                })?;
            buffer.write_block(&payload, type_id, flush, timestamp)?;
            framed += 1;
        }

        touched.clear();
        if config.clear_cache_on_write {
            cache.clear();
        }
        Ok(framed)
    }
}

/// Encode one record, typed if its type is registered in `header`.
pub(crate) fn encode_record(
    codec: &dyn Codec,
    header: &Header,
    compress: bool,
    record: &dyn Record,
) -> Result<(RefId, Vec<u8>), LogError> {
    let type_name = record.type_name();
    let type_id = header.registration_id(type_name);
    let payload = codec.encode(type_id.is_some(), compress, type_name, record)?;
    Ok((type_id.unwrap_or(RefId::UNTYPED), payload))
}

/// Caches entity updates and frames them into a block stream.
///
/// Every method takes `&self`: the cache, the framing buffer and the
/// output sink sit behind one writer-wide lock, so concurrent
/// [`update`](Self::update) calls serialize against each other and
/// against writes and flushes.
///
/// The stream preamble (signature, encoding flag, header) is framed
/// lazily by the first [`write`](Self::write) or
/// [`write_buffer`](Self::write_buffer), exactly once. After that the
/// header is frozen and further registrations fail with
/// [`LogError::HeaderAlreadyWritten`].
///
/// If [`write_buffer`](Self::write_buffer) fails part-way, blocks framed
/// before the failure stay in the buffer and the touched set is kept, so
/// the caller may flush what was framed and retry the cycle.
///
/// # Examples
///
/// ```
/// use std::any::Any;
/// use std::io::Cursor;
/// use std::sync::Arc;
///
/// use blocklog_codec::MsgPackCodec;
/// use blocklog_core::{BlockKind, EntityId, NamedRecord, Record};
/// use blocklog_stream::{CachedReader, CachedWriter, ReaderConfig, WriterConfig};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Position { id: EntityId, x: f64 }
///
/// impl Record for Position {
///     fn record_id(&self) -> EntityId { self.id }
///     fn type_name(&self) -> &str { Self::TYPE_NAME }
///     fn as_any(&self) -> &dyn Any { self }
/// }
/// impl NamedRecord for Position { const TYPE_NAME: &'static str = "Position"; }
///
/// let codec = Arc::new(MsgPackCodec::new().with_type::<Position>());
///
/// let writer = CachedWriter::new(Vec::new(), codec.clone(), WriterConfig::default());
/// writer.register::<Position>(BlockKind::FULL).unwrap();
/// let id = EntityId::new_v4();
/// writer.update(Arc::new(Position { id, x: 1.0 })).unwrap();
/// writer.update(Arc::new(Position { id, x: 2.0 })).unwrap();
/// writer.write_buffer(10, false).unwrap();
/// writer.flush_to_stream().unwrap();
/// let bytes = writer.into_inner().unwrap();
///
/// let mut reader = CachedReader::new(Cursor::new(bytes), codec, ReaderConfig::default());
/// reader.read_header().unwrap();
/// let records: Vec<_> = reader.records(None).collect::<Result<_, _>>().unwrap();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].downcast_ref::<Position>(), Some(&Position { id, x: 2.0 }));
/// ```
pub struct CachedWriter<W: Write> {
    state: Mutex<WriterState<W>>,
    codec: Arc<dyn Codec>,
    config: WriterConfig,
}

impl<W: Write> CachedWriter<W> {
    /// Create a writer that flushes to `output`.
    pub fn new(output: W, codec: Arc<dyn Codec>, config: WriterConfig) -> Self {
        Self::with_output(Some(output), codec, config)
    }

    /// Create a writer with no output. Framing works as usual;
    /// [`flush_to_stream`](Self::flush_to_stream) fails with
    /// [`LogError::NoOutput`] until one is attached.
    pub fn detached(codec: Arc<dyn Codec>, config: WriterConfig) -> Self {
        Self::with_output(None, codec, config)
    }

    fn with_output(output: Option<W>, codec: Arc<dyn Codec>, config: WriterConfig) -> Self {
        Self {
            state: Mutex::new(WriterState {
                header: Header::new(),
                phase: WriterPhase::HeaderPending,
                cache: IndexMap::new(),
                touched: IndexSet::new(),
                buffer: WriteBuffer::new(),
                output,
            }),
            codec,
            config,
        }
    }

    /// Attach an output, returning the previous one.
    pub fn set_output(&self, output: W) -> Result<Option<W>, LogError> {
        let mut state = self.state.lock();
        state.check_open()?;
        Ok(state.output.replace(output))
    }

    /// Register a type with its output mask.
    ///
    /// Fails if the codec rejects the type, if it is already registered,
    /// or once the header has been framed.
    pub fn register_type(&self, type_name: &str, output: BlockKind) -> Result<RefId, LogError> {
        let mut state = self.state.lock();
        state.check_registrable()?;
        let id = state
            .header
            .register_type(self.codec.as_ref(), type_name, output)?;
        debug!(type_name, type_id = id.0, output = %output, "registered type");
        Ok(id)
    }

    /// [`register_type`](Self::register_type) for a statically named type.
    pub fn register<T: NamedRecord>(&self, output: BlockKind) -> Result<RefId, LogError> {
        self.register_type(T::TYPE_NAME, output)
    }

    /// Set the header's version triple.
    pub fn register_version(&self, major: u32, minor: u32, revision: u32) -> Result<(), LogError> {
        let mut state = self.state.lock();
        state.check_registrable()?;
        state.header.register_version(major, minor, revision);
        Ok(())
    }

    /// Snapshot of the current header.
    pub fn header(&self) -> Header {
        self.state.lock().header.clone()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> WriterPhase {
        self.state.lock().phase
    }

    /// The settings this writer was built with.
    pub fn config(&self) -> WriterConfig {
        self.config
    }

    /// Insert or replace the cached state of `record.record_id()` and mark
    /// it as touched. Nothing is framed.
    ///
    /// A replaced entity keeps its original position in the cache order.
    pub fn update(&self, record: Arc<dyn Record>) -> Result<(), LogError> {
        let mut state = self.state.lock();
        state.check_open()?;
        let id = record.record_id();
        state.cache.insert(id, record);
        state.touched.insert(id);
        Ok(())
    }

    /// Frame one record immediately, bypassing the cache.
    ///
    /// Unregistered types are framed untyped.
    pub fn write(&self, timestamp: i64, record: &dyn Record) -> Result<(), LogError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.check_open().context("error writing to data buffer")?;
        state
            .ensure_header(self.config.compress, timestamp)
            .context("error writing to data buffer")?;
        let (type_id, payload) =
            encode_record(self.codec.as_ref(), &state.header, self.config.compress, record)
                .context("error writing to data buffer")?;
        state
            .buffer
            .write_block(&payload, type_id, BlockKind::IMMEDIATE, timestamp)
            .context("error writing to data buffer")?;
        trace!(timestamp, type_id = type_id.0, bytes = payload.len(), "framed immediate record");
        Ok(())
    }

    /// Frame the cache.
    ///
    /// A full write (`partial = false`) visits every cached entity; a
    /// partial write visits only those touched since the last call. An
    /// entity is framed if its type's output mask admits the flush kind
    /// (see [`BlockKind::admits`]); unregistered types always are.
    /// Returns the number of data blocks framed.
    pub fn write_buffer(&self, timestamp: i64, partial: bool) -> Result<usize, LogError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.check_open().context("error writing to data buffer")?;
        state
            .ensure_header(self.config.compress, timestamp)
            .context("error writing to data buffer")?;
        let framed = state
            .frame_cache(self.codec.as_ref(), self.config, timestamp, partial)
            .context("error writing to data buffer")?;
        debug!(
            timestamp,
            partial,
            blocks = framed,
            cached = state.cache.len(),
            "framed cache"
        );
        Ok(framed)
    }

    /// Move every framed byte to the output and reset the buffer.
    ///
    /// Returns the number of bytes written.
    pub fn flush_to_stream(&self) -> Result<usize, LogError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.check_open().context("error writing to output stream")?;
        let output = state
            .output
            .as_mut()
            .ok_or(LogError::NoOutput)
            .context("error writing to output stream")?;
        let written = state
            .buffer
            .write_to(output)
            .context("error writing to output stream")?;
        output.flush().context("error writing to output stream")?;
        debug!(bytes = written, "flushed to stream");
        Ok(written)
    }

    /// Bytes framed but not yet flushed.
    pub fn pending_bytes(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Number of cached entities.
    pub fn cached_len(&self) -> usize {
        self.state.lock().cache.len()
    }

    /// Number of entities touched since the last successful
    /// [`write_buffer`](Self::write_buffer).
    pub fn touched_len(&self) -> usize {
        self.state.lock().touched.len()
    }

    /// Close the writer and release its output. Idempotent.
    ///
    /// The output sink is flushed and handed back; a later call returns
    /// `None`. Blocks framed but never passed to
    /// [`flush_to_stream`](Self::flush_to_stream) are discarded. Every
    /// later operation fails with [`LogError::Closed`].
    pub fn close(&self) -> Result<Option<W>, LogError> {
        let mut state = self.state.lock();
        if state.phase == WriterPhase::Closed {
            return Ok(None);
        }
        state.phase = WriterPhase::Closed;
        let discarded = state.buffer.close();
        if discarded > 0 {
            warn!(bytes = discarded, "discarding unflushed blocks on close");
        }
        state.cache.clear();
        state.touched.clear();
        let mut output = state.output.take();
        if let Some(output) = output.as_mut() {
            output.flush().context("error closing output stream")?;
        }
        debug!("writer closed");
        Ok(output)
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().phase == WriterPhase::Closed
    }

    /// Consume the writer and return its output, if any.
    ///
    /// Framed but unflushed blocks are dropped. `None` once
    /// [`close`](Self::close) has taken the output.
    pub fn into_inner(self) -> Option<W> {
        self.state.into_inner().output
    }
}

impl CachedWriter<BufWriter<File>> {
    /// Create (or truncate) the file at `path` and write to it.
    pub fn create(
        path: impl AsRef<Path>,
        codec: Arc<dyn Codec>,
        config: WriterConfig,
    ) -> Result<Self, LogError> {
        let file = File::create(path.as_ref()).context("error initializing output file")?;
        debug!(path = %path.as_ref().display(), "opened output file");
        Ok(Self::new(BufWriter::new(file), codec, config))
    }
}
