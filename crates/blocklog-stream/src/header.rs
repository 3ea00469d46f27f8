//! The stream header: type registry plus version triple.

use std::collections::HashMap;
use std::fmt;

use blocklog_core::{BlockKind, Codec, RefId, Version};

use crate::error::LogError;

/// One registered type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeRegistration {
    ref_id: RefId,
    type_name: String,
    output: BlockKind,
}

impl TypeRegistration {
    pub(crate) fn new(ref_id: RefId, type_name: String, output: BlockKind) -> Self {
        Self {
            ref_id,
            type_name,
            output,
        }
    }

    /// The id assigned at registration.
    pub fn ref_id(&self) -> RefId {
        self.ref_id
    }

    /// The persisted type tag.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Which cache flushes emit this type.
    pub fn output(&self) -> BlockKind {
        self.output
    }
}

/// Ordered type registry and version triple, persisted as the
/// `HEADER` block of every stream.
///
/// Registration ids are dense and zero-based: the n-th registered type
/// has `RefId(n)`. Only the forward table is persisted. The name-keyed
/// reverse index is derived state; after decoding a header it must be
/// rebuilt with [`reset_registration_ids`](Header::reset_registration_ids).
///
/// Not synchronized. Writers and readers hold their header behind their
/// own lock.
///
/// # Examples
///
/// ```
/// use blocklog_core::{BlockKind, Codec, CodecError, Record, RefId};
/// use blocklog_stream::Header;
///
/// struct AcceptAll;
/// impl Codec for AcceptAll {
///     fn encode(&self, _: bool, _: bool, _: &str, _: &dyn Record) -> Result<Vec<u8>, CodecError> {
///         Ok(Vec::new())
///     }
///     fn decode(&self, _: bool, _: bool, _: Option<&str>, _: &[u8]) -> Result<Box<dyn Record>, CodecError> {
///         Err(CodecError::Decode { detail: "unused".into() })
///     }
///     fn is_type_valid(&self, _: &str) -> bool { true }
/// }
///
/// let mut header = Header::new();
/// header.register_version(1, 2, 3);
/// let id = header.register_type(&AcceptAll, "Position", BlockKind::FULL).unwrap();
///
/// assert_eq!(id, RefId(0));
/// assert_eq!(header.registration_id("Position"), Some(RefId(0)));
/// assert_eq!(header.registration_output("Velocity"), BlockKind::NONE);
/// assert!(header.verify(1, 2, 3));
/// assert!(!header.verify(1, 1, 9));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Header {
    version: Version,
    registrations: Vec<TypeRegistration>,
    index: HashMap<String, RefId>,
}

impl Header {
    /// An empty, unversioned header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a decoded header. The reverse index starts empty.
    pub(crate) fn from_parts(version: Version, registrations: Vec<TypeRegistration>) -> Self {
        Self {
            version,
            registrations,
            index: HashMap::new(),
        }
    }

    /// Register a type under the next sequential id.
    ///
    /// Fails with [`LogError::TypeRejected`] if `codec` cannot handle the
    /// type and [`LogError::DuplicateType`] if it is already registered.
    /// The header is unchanged on failure.
    pub fn register_type(
        &mut self,
        codec: &dyn Codec,
        type_name: &str,
        output: BlockKind,
    ) -> Result<RefId, LogError> {
        if !codec.is_type_valid(type_name) {
            return Err(LogError::TypeRejected {
                type_name: type_name.to_string(),
            });
        }
        if self.index.contains_key(type_name)
            || self.registrations.iter().any(|r| r.type_name == type_name)
        {
            return Err(LogError::DuplicateType {
                type_name: type_name.to_string(),
            });
        }
        let raw = i32::try_from(self.registrations.len())
            .map_err(|_| LogError::malformed("registration table is full"))?;
        let ref_id = RefId(raw);
        self.registrations.push(TypeRegistration::new(
            ref_id,
            type_name.to_string(),
            output,
        ));
        self.index.insert(type_name.to_string(), ref_id);
        Ok(ref_id)
    }

    /// Overwrite the version triple.
    pub fn register_version(&mut self, major: u32, minor: u32, revision: u32) {
        self.version = Version::new(major, minor, revision);
    }

    /// The version triple.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Id assigned to `type_name`, or `None` if it is not registered.
    pub fn registration_id(&self, type_name: &str) -> Option<RefId> {
        self.index.get(type_name).copied()
    }

    /// Output mask of `type_name`; `NONE` if it is not registered.
    pub fn registration_output(&self, type_name: &str) -> BlockKind {
        self.registration_id(type_name)
            .and_then(|id| self.registration(id))
            .map_or(BlockKind::NONE, TypeRegistration::output)
    }

    /// Type name registered under `id`.
    pub fn registration_type(&self, id: RefId) -> Option<&str> {
        self.registration(id).map(TypeRegistration::type_name)
    }

    /// Full registration under `id`.
    pub fn registration(&self, id: RefId) -> Option<&TypeRegistration> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.registrations.get(i))
    }

    /// All registrations in id order.
    pub fn registrations(&self) -> &[TypeRegistration] {
        &self.registrations
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// True if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Rebuild the name-keyed reverse index from the registration table.
    ///
    /// On failure (two registrations sharing a name) the index is left
    /// empty, so every name lookup misses.
    pub fn reset_registration_ids(&mut self) -> Result<(), LogError> {
        self.index.clear();
        let mut index = HashMap::with_capacity(self.registrations.len());
        for reg in &self.registrations {
            if index.insert(reg.type_name.clone(), reg.ref_id).is_some() {
                return Err(LogError::malformed(format!(
                    "type `{}` registered twice",
                    reg.type_name
                )));
            }
        }
        self.index = index;
        Ok(())
    }

    /// Minimum-compatibility check against a reader's version.
    ///
    /// See [`Version::accepts`].
    pub fn verify(&self, major: u32, minor: u32, revision: u32) -> bool {
        self.version.accepts(Version::new(major, minor, revision))
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.registrations == other.registrations
    }
}

impl Eq for Header {}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "version {}", self.version)?;
        for reg in &self.registrations {
            write!(f, "\n  [{}] {} ({})", reg.ref_id, reg.type_name, reg.output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{decode_header, encode_header};
    use blocklog_codec::MsgPackCodec;
    use blocklog_test_utils::{test_codec, RejectAllCodec, TestData, TestDataSmall};
    use blocklog_core::NamedRecord;
    use proptest::prelude::*;

    #[test]
    fn ids_are_sequential_from_zero() {
        let codec = test_codec();
        let mut header = Header::new();
        let a = header
            .register_type(&codec, TestData::TYPE_NAME, BlockKind::FULL)
            .unwrap();
        let b = header
            .register_type(&codec, TestDataSmall::TYPE_NAME, BlockKind::PARTIAL)
            .unwrap();
        assert_eq!((a, b), (RefId(0), RefId(1)));
        assert_eq!(header.registration_type(RefId(1)), Some(TestDataSmall::TYPE_NAME));
        assert_eq!(header.registration_type(RefId(2)), None);
        assert_eq!(header.registration_type(RefId::UNTYPED), None);
    }

    #[test]
    fn rejected_type_leaves_header_unchanged() {
        let mut header = Header::new();
        let err = header
            .register_type(&RejectAllCodec, TestData::TYPE_NAME, BlockKind::FULL)
            .unwrap_err();
        assert!(matches!(err, LogError::TypeRejected { .. }));
        assert!(header.is_empty());
        assert_eq!(header.registration_id(TestData::TYPE_NAME), None);
    }

    #[test]
    fn type_unknown_to_codec_is_rejected() {
        let codec = MsgPackCodec::new();
        let mut header = Header::new();
        assert!(matches!(
            header.register_type(&codec, TestData::TYPE_NAME, BlockKind::FULL),
            Err(LogError::TypeRejected { .. })
        ));
    }

    #[test]
    fn duplicate_registration_fails() {
        let codec = test_codec();
        let mut header = Header::new();
        header
            .register_type(&codec, TestData::TYPE_NAME, BlockKind::FULL)
            .unwrap();
        let err = header
            .register_type(&codec, TestData::TYPE_NAME, BlockKind::PARTIAL)
            .unwrap_err();
        assert!(matches!(err, LogError::DuplicateType { .. }));
        assert_eq!(header.len(), 1);
        assert_eq!(header.registration_output(TestData::TYPE_NAME), BlockKind::FULL);
    }

    #[test]
    fn unregistered_output_is_none() {
        let header = Header::new();
        assert_eq!(header.registration_output("Missing"), BlockKind::NONE);
        assert_eq!(header.registration_id("Missing"), None);
    }

    #[test]
    fn decoded_header_needs_reset_before_lookup() {
        let codec = test_codec();
        let mut header = Header::new();
        header.register_version(1, 2, 3);
        header
            .register_type(&codec, TestData::TYPE_NAME, BlockKind::FULL | BlockKind::PARTIAL)
            .unwrap();
        header
            .register_type(&codec, TestDataSmall::TYPE_NAME, BlockKind::NONE)
            .unwrap();

        let mut decoded = decode_header(&encode_header(&header).unwrap()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.registration_id(TestDataSmall::TYPE_NAME), None);

        decoded.reset_registration_ids().unwrap();
        assert_eq!(
            decoded.registration_id(TestDataSmall::TYPE_NAME),
            header.registration_id(TestDataSmall::TYPE_NAME)
        );
        assert_eq!(decoded.version(), Version::new(1, 2, 3));
    }

    #[test]
    fn reset_with_duplicate_names_clears_index() {
        let mut header = Header::from_parts(
            Version::default(),
            vec![
                TypeRegistration::new(RefId(0), "A".into(), BlockKind::FULL),
                TypeRegistration::new(RefId(1), "A".into(), BlockKind::FULL),
            ],
        );
        assert!(header.reset_registration_ids().is_err());
        assert_eq!(header.registration_id("A"), None);
    }

    #[test]
    fn verify_unversioned_accepts_everything() {
        let header = Header::new();
        assert!(header.verify(0, 0, 0));
        assert!(header.verify(7, 0, 1));
    }

    #[test]
    fn display_lists_registrations() {
        let codec = test_codec();
        let mut header = Header::new();
        header.register_version(2, 0, 1);
        header
            .register_type(&codec, TestData::TYPE_NAME, BlockKind::FULL)
            .unwrap();
        let text = header.to_string();
        assert!(text.starts_with("version 2.0.1"));
        assert!(text.contains(TestData::TYPE_NAME));
        assert!(text.contains("FULL"));
    }

    proptest! {
        #[test]
        fn ids_survive_encoding(count in 1usize..24) {
            let codec = blocklog_test_utils::AcceptAllCodec;
            let names: Vec<String> = (0..count).map(|i| format!("Type{i}")).collect();
            let mut header = Header::new();
            for name in &names {
                header.register_type(&codec, name, BlockKind::FULL).unwrap();
            }

            let mut decoded = decode_header(&encode_header(&header).unwrap()).unwrap();
            decoded.reset_registration_ids().unwrap();
            for name in &names {
                prop_assert_eq!(decoded.registration_id(name), header.registration_id(name));
            }
        }
    }
}
