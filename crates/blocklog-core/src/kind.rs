//! Block kind bitmask.

use std::fmt;

bitflags::bitflags! {
    /// Role and output eligibility of a framed block.
    ///
    /// `SIGNATURE` and `HEADER` tag the framing blocks that open every
    /// stream. `FULL` and `PARTIAL` tag data blocks produced by a cache
    /// flush, and double as a registered type's output mask. `IMMEDIATE`
    /// tags blocks written directly, outside the cache.
    ///
    /// Stored as a `u32` on the wire.
    ///
    /// # Examples
    ///
    /// ```
    /// use blocklog_core::BlockKind;
    ///
    /// let mask = BlockKind::FULL | BlockKind::PARTIAL;
    /// assert!(mask.contains(BlockKind::FULL));
    /// assert!(!mask.contains(BlockKind::IMMEDIATE));
    /// assert_eq!(BlockKind::NONE.bits(), 0);
    /// ```
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BlockKind: u32 {
        /// No flags. As an output mask: eligible for every flush.
        const NONE = 0;
        /// Stream signature (and encoding flag) block.
        const SIGNATURE = 0b00_0010;
        /// Type registry header block.
        const HEADER = 0b00_0100;
        /// Written by a full cache flush.
        const FULL = 0b00_1000;
        /// Written by a partial (recently-touched only) cache flush.
        const PARTIAL = 0b01_0000;
        /// Written directly, bypassing the cache.
        const IMMEDIATE = 0b10_0000;
    }
}

impl BlockKind {
    /// True if a type with this output mask should be emitted by a flush
    /// of the given kind.
    ///
    /// A `NONE` mask is a wildcard: unregistered types report `NONE` and
    /// are always written.
    pub fn admits(self, flush: BlockKind) -> bool {
        self.is_empty() || self.contains(flush)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        bitflags::parser::to_writer(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_mask_admits_everything() {
        assert!(BlockKind::NONE.admits(BlockKind::FULL));
        assert!(BlockKind::NONE.admits(BlockKind::PARTIAL));
    }

    #[test]
    fn single_mask_admits_only_its_flush() {
        assert!(BlockKind::FULL.admits(BlockKind::FULL));
        assert!(!BlockKind::FULL.admits(BlockKind::PARTIAL));
        assert!(BlockKind::PARTIAL.admits(BlockKind::PARTIAL));
        assert!(!BlockKind::PARTIAL.admits(BlockKind::FULL));
    }

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(BlockKind::SIGNATURE.bits(), 2);
        assert_eq!(BlockKind::HEADER.bits(), 4);
        assert_eq!(BlockKind::FULL.bits(), 8);
        assert_eq!(BlockKind::PARTIAL.bits(), 16);
        assert_eq!(BlockKind::IMMEDIATE.bits(), 32);
    }

    #[test]
    fn display_lists_flags() {
        assert_eq!(BlockKind::NONE.to_string(), "NONE");
        assert_eq!((BlockKind::FULL | BlockKind::PARTIAL).to_string(), "FULL | PARTIAL");
    }
}
