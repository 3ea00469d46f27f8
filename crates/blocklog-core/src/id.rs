//! Strongly-typed identifiers and the [`Version`] triple.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a cached entity.
///
/// The write cache is keyed by this value: two updates carrying the same
/// `EntityId` overwrite one another, regardless of their payload type.
/// Serializes as the bare UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Allocate a fresh random ID.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero ID, used by records that carry no identity of their own.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(v: Uuid) -> Self {
        Self(v)
    }
}

/// Identifies a registered type within a stream header.
///
/// Registration IDs are assigned sequentially from zero in registration
/// order. `RefId(n)` corresponds to the n-th registered type.
///
/// # Examples
///
/// ```
/// use blocklog_core::RefId;
///
/// assert!(RefId(0).is_registered());
/// assert!(!RefId::UNTYPED.is_registered());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(pub i32);

impl RefId {
    /// Written for framing blocks and payloads with no registered type.
    pub const UNTYPED: RefId = RefId(-1);

    /// True for IDs that can name an entry in a registry.
    pub fn is_registered(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for RefId {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

/// Major/minor/revision triple carried in a stream header.
///
/// An all-zero version means "unversioned": it is compatible with every
/// reader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major version number.
    pub major: u32,
    /// Minor version number.
    pub minor: u32,
    /// Revision number.
    pub revision: u32,
}

impl Version {
    /// Build a version triple.
    pub const fn new(major: u32, minor: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// True if all three components are zero.
    pub fn is_unversioned(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.revision == 0
    }

    /// Minimum-compatibility check against a reader's version.
    ///
    /// Returns `true` if `self` is unversioned, or if every component
    /// of `reader` is greater than or equal to the matching component
    /// of `self`. This is deliberately component-wise and not a
    /// lexicographic ordering.
    pub fn accepts(&self, reader: Version) -> bool {
        if self.is_unversioned() {
            return true;
        }
        reader.major >= self.major && reader.minor >= self.minor && reader.revision >= self.revision
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unversioned_accepts_anything() {
        let v = Version::default();
        assert!(v.accepts(Version::new(0, 0, 0)));
        assert!(v.accepts(Version::new(9, 9, 9)));
    }

    #[test]
    fn accepts_is_component_wise() {
        let v = Version::new(1, 2, 3);
        assert!(v.accepts(Version::new(1, 2, 3)));
        assert!(v.accepts(Version::new(2, 2, 3)));
        // Higher major but lower minor is still rejected.
        assert!(!v.accepts(Version::new(2, 1, 3)));
        assert!(!v.accepts(Version::new(1, 2, 2)));
    }

    #[test]
    fn display_is_dotted() {
        assert_eq!(Version::new(1, 2, 3).to_string(), "1.2.3");
    }

    #[test]
    fn entity_id_serializes_as_bare_uuid() {
        let id = EntityId::new_v4();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
        assert_eq!(serde_json::from_str::<EntityId>(&json).unwrap(), id);
    }

    #[test]
    fn untyped_is_not_registered() {
        assert!(!RefId::UNTYPED.is_registered());
        assert!(RefId(0).is_registered());
    }

    proptest! {
        #[test]
        fn bumping_any_component_keeps_acceptance(
            major in 0u32..1000,
            minor in 0u32..1000,
            revision in 0u32..1000,
            bump in 0usize..3,
        ) {
            let v = Version::new(major, minor, revision);
            let mut reader = v;
            match bump {
                0 => reader.major += 1,
                1 => reader.minor += 1,
                _ => reader.revision += 1,
            }
            prop_assert!(v.accepts(v));
            prop_assert!(v.accepts(reader));
        }
    }
}
