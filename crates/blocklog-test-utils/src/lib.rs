//! Test utilities for blocklog development.
//!
//! Provides the reference record types, a pre-built codec that knows
//! them, and codecs with scripted behavior for exercising error paths.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub mod fixtures;

use blocklog_codec::MsgPackCodec;
use blocklog_core::{Codec, CodecError, Record};

pub use fixtures::{FailingCodec, TestData, TestDataSmall, UnmarkedTestData};

/// A codec that knows the three fixture record types.
///
/// [`TestData`] and [`TestDataSmall`] may be registered in a header;
/// [`UnmarkedTestData`] is only accepted on the untyped path.
pub fn test_codec() -> MsgPackCodec {
    MsgPackCodec::new()
        .with_type::<TestData>()
        .with_type::<TestDataSmall>()
        .with_untyped::<UnmarkedTestData>()
}

/// Refuses every type at registration and every payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAllCodec;

impl Codec for RejectAllCodec {
    fn encode(
        &self,
        _typed: bool,
        _compress: bool,
        type_name: &str,
        _value: &dyn Record,
    ) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::UnknownType {
            type_name: type_name.to_string(),
        })
    }

    fn decode(
        &self,
        _typed: bool,
        _compress: bool,
        type_name: Option<&str>,
        _bytes: &[u8],
    ) -> Result<Box<dyn Record>, CodecError> {
        Err(CodecError::UnknownType {
            type_name: type_name.unwrap_or("<untyped>").to_string(),
        })
    }

    fn is_type_valid(&self, _type_name: &str) -> bool {
        false
    }
}

/// Accepts any type name at registration.
///
/// Encodes every value to an empty payload and cannot decode anything.
/// Useful for header tests that register synthetic type names.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllCodec;

impl Codec for AcceptAllCodec {
    fn encode(
        &self,
        _typed: bool,
        _compress: bool,
        _type_name: &str,
        _value: &dyn Record,
    ) -> Result<Vec<u8>, CodecError> {
        Ok(Vec::new())
    }

    fn decode(
        &self,
        _typed: bool,
        _compress: bool,
        _type_name: Option<&str>,
        _bytes: &[u8],
    ) -> Result<Box<dyn Record>, CodecError> {
        Err(CodecError::Decode {
            detail: "accept-all codec cannot decode".into(),
        })
    }

    fn is_type_valid(&self, _type_name: &str) -> bool {
        true
    }
}

