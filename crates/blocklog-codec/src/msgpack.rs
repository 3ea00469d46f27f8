//! MessagePack codec with an explicit type table.

use blocklog_core::{Codec, CodecError, NamedRecord, Record};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dynamic::DynamicRecord;

/// zstd level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 1;

type EncodeFn = fn(&dyn Record) -> Result<Vec<u8>, CodecError>;
type DecodeFn = fn(&[u8]) -> Result<Box<dyn Record>, CodecError>;

/// Monomorphized entry points for one known type.
#[derive(Clone, Copy)]
struct TypeEntry {
    registrable: bool,
    encode_typed: EncodeFn,
    encode_untyped: EncodeFn,
    decode_typed: DecodeFn,
    decode_untyped: DecodeFn,
}

impl TypeEntry {
    fn of<T>(registrable: bool) -> Self
    where
        T: NamedRecord + Serialize + DeserializeOwned,
    {
        Self {
            registrable,
            encode_typed: encode_typed::<T>,
            encode_untyped: encode_untyped::<T>,
            decode_typed: decode_typed::<T>,
            decode_untyped: decode_untyped::<T>,
        }
    }
}

/// The default [`Codec`]: MessagePack for typed payloads, JSON for
/// untyped ones, optional zstd on top.
///
/// # Examples
///
/// ```
/// use std::any::Any;
/// use blocklog_codec::MsgPackCodec;
/// use blocklog_core::{Codec, EntityId, NamedRecord, Record};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Ping { seq: u32 }
///
/// impl Record for Ping {
///     fn record_id(&self) -> EntityId { EntityId::nil() }
///     fn type_name(&self) -> &str { Self::TYPE_NAME }
///     fn as_any(&self) -> &dyn Any { self }
/// }
/// impl NamedRecord for Ping { const TYPE_NAME: &'static str = "Ping"; }
///
/// let codec = MsgPackCodec::new().with_type::<Ping>();
/// assert!(codec.is_type_valid("Ping"));
///
/// let bytes = codec.encode(true, true, "Ping", &Ping { seq: 7 }).unwrap();
/// let back = codec.decode(true, true, Some("Ping"), &bytes).unwrap();
/// assert_eq!(back.downcast_ref::<Ping>(), Some(&Ping { seq: 7 }));
/// ```
#[derive(Clone)]
pub struct MsgPackCodec {
    types: IndexMap<&'static str, TypeEntry>,
    level: i32,
}

impl MsgPackCodec {
    /// Create a codec with an empty type table.
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_type<T>(mut self) -> Self
    where
        T: NamedRecord + Serialize + DeserializeOwned,
    {
        self.register::<T>();
        self
    }

    /// Builder form of [`register_untyped`](Self::register_untyped).
    pub fn with_untyped<T>(mut self) -> Self
    where
        T: NamedRecord + Serialize + DeserializeOwned,
    {
        self.register_untyped::<T>();
        self
    }

    /// Add `T` to the type table under [`NamedRecord::TYPE_NAME`].
    ///
    /// Re-registering a name replaces its entry.
    pub fn register<T>(&mut self)
    where
        T: NamedRecord + Serialize + DeserializeOwned,
    {
        self.types.insert(T::TYPE_NAME, TypeEntry::of::<T>(true));
    }

    /// Add `T` for the untyped path only.
    ///
    /// `T` can be encoded and decoded self-describing, but
    /// [`is_type_valid`](Codec::is_type_valid) reports `false` for it, so
    /// it can never be registered in a stream header.
    pub fn register_untyped<T>(&mut self)
    where
        T: NamedRecord + Serialize + DeserializeOwned,
    {
        self.types.insert(T::TYPE_NAME, TypeEntry::of::<T>(false));
    }

    /// Set the zstd level used when `compress` is requested.
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Known type names, in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.types.keys().copied()
    }

    fn entry(&self, type_name: &str, typed: bool) -> Result<&TypeEntry, CodecError> {
        self.types
            .get(type_name)
            .filter(|entry| entry.registrable || !typed)
            .ok_or_else(|| CodecError::UnknownType {
                type_name: type_name.to_string(),
            })
    }
}

impl Default for MsgPackCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MsgPackCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgPackCodec")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("level", &self.level)
            .finish()
    }
}

impl Codec for MsgPackCodec {
    fn encode(
        &self,
        typed: bool,
        compress: bool,
        type_name: &str,
        value: &dyn Record,
    ) -> Result<Vec<u8>, CodecError> {
        let entry = self.entry(type_name, typed)?;
        let raw = if typed {
            (entry.encode_typed)(value)?
        } else {
            (entry.encode_untyped)(value)?
        };
        if compress {
            zstd::encode_all(raw.as_slice(), self.level).map_err(CodecError::Compression)
        } else {
            Ok(raw)
        }
    }

    fn decode(
        &self,
        typed: bool,
        compress: bool,
        type_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<Box<dyn Record>, CodecError> {
        let inflated;
        let raw = if compress {
            inflated = zstd::decode_all(bytes).map_err(CodecError::Compression)?;
            inflated.as_slice()
        } else {
            bytes
        };

        match (typed, type_name) {
            (true, Some(name)) => (self.entry(name, true)?.decode_typed)(raw),
            (true, None) => Err(CodecError::Decode {
                detail: "typed payload has no type name to decode into".into(),
            }),
            (false, Some(name)) => (self.entry(name, false)?.decode_untyped)(raw),
            (false, None) => {
                let value = serde_json::from_slice(raw).map_err(|e| CodecError::Decode {
                    detail: e.to_string(),
                })?;
                Ok(Box::new(DynamicRecord::new(value)))
            }
        }
    }

    fn is_type_valid(&self, type_name: &str) -> bool {
        self.types.get(type_name).is_some_and(|entry| entry.registrable)
    }
}

// ── Per-type entry points ───────────────────────────────────────

fn downcast<T: NamedRecord>(value: &dyn Record) -> Result<&T, CodecError> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| CodecError::TypeMismatch {
            expected: T::TYPE_NAME.to_string(),
        })
}

fn encode_typed<T: NamedRecord + Serialize>(value: &dyn Record) -> Result<Vec<u8>, CodecError> {
    rmp_serde::to_vec(downcast::<T>(value)?).map_err(|e| CodecError::Encode {
        detail: e.to_string(),
    })
}

fn encode_untyped<T: NamedRecord + Serialize>(value: &dyn Record) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(downcast::<T>(value)?).map_err(|e| CodecError::Encode {
        detail: e.to_string(),
    })
}

fn decode_typed<T: NamedRecord + DeserializeOwned>(
    bytes: &[u8],
) -> Result<Box<dyn Record>, CodecError> {
    let value: T = rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode {
        detail: e.to_string(),
    })?;
    Ok(Box::new(value))
}

fn decode_untyped<T: NamedRecord + DeserializeOwned>(
    bytes: &[u8],
) -> Result<Box<dyn Record>, CodecError> {
    let value: T = serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
        detail: e.to_string(),
    })?;
    Ok(Box::new(value))
}
