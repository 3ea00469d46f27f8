//! Core abstraction traits for logged records and payload codecs.

use std::any::Any;
use std::fmt;

use crate::error::CodecError;
use crate::id::EntityId;

/// A value that can be cached, framed, and replayed.
///
/// The writer keys its cache by [`record_id`](Record::record_id) and
/// looks up the output mask by [`type_name`](Record::type_name). The
/// type name is the stable tag persisted in stream headers, so it must
/// not change between the build that writes a stream and the build
/// that reads it.
pub trait Record: Any + Send + Sync + fmt::Debug {
    /// Stable identity used as the cache key.
    fn record_id(&self) -> EntityId;

    /// Stable type tag, unique per concrete type.
    fn type_name(&self) -> &str;

    /// Upcast for downcasting back to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Record {
    /// Downcast to a concrete record type.
    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// True if the concrete type is `T`.
    pub fn is<T: Record>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A [`Record`] whose type tag is known statically.
///
/// Codecs use this to build their type tables without an instance in
/// hand.
pub trait NamedRecord: Record + Sized {
    /// The tag returned by [`Record::type_name`] for every instance.
    const TYPE_NAME: &'static str;
}

/// Encodes and decodes record payloads.
///
/// The block framing never depends on the codec: a codec only sees the
/// payload bytes of data blocks. Writers and readers hold their codec as
/// an explicitly injected `Arc<dyn Codec>`.
///
/// `typed = false` selects the self-describing path used for values
/// whose type has no registration in the stream header. A typed decode
/// is always given the type name; an untyped decode may not be.
pub trait Codec: Send + Sync {
    /// Encode `value`, registered (or claimed) as `type_name`.
    fn encode(
        &self,
        typed: bool,
        compress: bool,
        type_name: &str,
        value: &dyn Record,
    ) -> Result<Vec<u8>, CodecError>;

    /// Decode a payload into a boxed record.
    fn decode(
        &self,
        typed: bool,
        compress: bool,
        type_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<Box<dyn Record>, CodecError>;

    /// True if this codec is able to encode and decode `type_name`.
    ///
    /// Registering a type the codec rejects fails up front rather than at
    /// the first flush.
    fn is_type_valid(&self, type_name: &str) -> bool;
}
