//! Error types for block framing, caching and replay.

use std::io;

use blocklog_core::{CodecError, RefId};
use thiserror::Error;
use uuid::Uuid;

/// Broad classification of a [`LogError`].
///
/// Stream errors concern the underlying byte stream or a resource that
/// has been closed; the caller decides whether to reopen and retry.
/// Serializer errors concern the content being framed or decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O failure, missing stream, or use after close.
    Stream,
    /// Codec failure, malformed framing, or a registry violation.
    Serializer,
}

/// Errors that can occur while writing or reading a block stream.
#[derive(Debug, Error)]
pub enum LogError {
    /// An I/O error occurred during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The buffer, writer or reader has already been closed.
    #[error("{resource} is closed")]
    Closed {
        /// Which resource was used after close.
        resource: &'static str,
    },
    /// A flush was requested but the writer has no output stream.
    #[error("no output stream is attached")]
    NoOutput,
    /// A read was requested but there is neither a filled buffer nor a
    /// live input stream.
    #[error("no input stream is attached")]
    NoInput,
    /// A channel subscriber hung up while records were being delivered.
    #[error("record subscriber disconnected")]
    SinkDisconnected,
    /// The payload codec failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The codec refuses to handle this type, so it cannot be registered.
    #[error("type `{type_name}` is not accepted by the codec")]
    TypeRejected {
        /// The rejected type name.
        type_name: String,
    },
    /// The type already has a registration in this header.
    #[error("type `{type_name}` is already registered")]
    DuplicateType {
        /// The duplicated type name.
        type_name: String,
    },
    /// The operation needs a registered type and this one is not.
    #[error("type `{type_name}` is not registered")]
    UnregisteredType {
        /// The unregistered type name.
        type_name: String,
    },
    /// A block references a registration id the header does not contain.
    #[error("unknown registration id {id}")]
    UnknownTypeId {
        /// The unresolved id.
        id: RefId,
    },
    /// Types can no longer be registered once the header block is written.
    #[error("header has already been written")]
    HeaderAlreadyWritten,
    /// Data blocks cannot be decoded before the header has been read.
    #[error("header has not been read")]
    HeaderNotRead,
    /// A block or header could not be decoded (corrupt framing).
    #[error("malformed block: {detail}")]
    MalformedBlock {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The stream does not open with the expected signature.
    #[error("invalid stream signature {found}")]
    InvalidSignature {
        /// The signature found in the stream.
        found: Uuid,
    },
    /// Another error, annotated with the operation that raised it.
    #[error("{context}: {source}")]
    Context {
        /// The failing operation, e.g. "error reading header".
        context: &'static str,
        /// The underlying error.
        source: Box<LogError>,
    },
}

impl LogError {
    /// Classify this error, looking through any context layers.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::Io(_)
            | Self::Closed { .. }
            | Self::NoOutput
            | Self::NoInput
            | Self::SinkDisconnected => ErrorKind::Stream,
            _ => ErrorKind::Serializer,
        }
    }

    /// The innermost error beneath any context layers.
    pub fn root(&self) -> &LogError {
        let mut err = self;
        while let Self::Context { source, .. } = err {
            err = source.as_ref();
        }
        err
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedBlock {
            detail: detail.into(),
        }
    }
}

/// Attach operation context to a fallible result.
pub trait ResultExt<T> {
    /// Wrap the error, if any, in [`LogError::Context`].
    fn context(self, context: &'static str) -> Result<T, LogError>;
}

impl<T, E: Into<LogError>> ResultExt<T> for Result<T, E> {
    fn context(self, context: &'static str) -> Result<T, LogError> {
        self.map_err(|e| LogError::Context {
            context,
            source: Box::new(e.into()),
        })
    }
}
