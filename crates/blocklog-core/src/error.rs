//! Error type shared by every [`Codec`](crate::Codec) implementation.

use std::io;

use thiserror::Error;

/// Errors raised by a payload codec while encoding or decoding.
///
/// Stream-level code wraps these with context; codecs only describe
/// what went wrong with the payload itself.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The codec has no entry for this type name.
    #[error("type `{type_name}` is not known to the codec")]
    UnknownType {
        /// The unrecognized type name.
        type_name: String,
    },
    /// The value handed to the codec is not the type its name claims.
    #[error("value is not an instance of `{expected}`")]
    TypeMismatch {
        /// The type name the value was registered under.
        expected: String,
    },
    /// Serialization failed.
    #[error("encode failed: {detail}")]
    Encode {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// Deserialization failed (truncated or corrupt payload).
    #[error("decode failed: {detail}")]
    Decode {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The compression layer failed.
    #[error("compression failed: {0}")]
    Compression(#[source] io::Error),
}
