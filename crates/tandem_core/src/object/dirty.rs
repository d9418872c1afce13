//! Dirty flags: which facets of an object changed since the last sync.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitset of changed facets.
///
/// The low byte holds the built-in facets every renderer understands. Object
/// kinds claim further bits with [`DirtyFlags::custom`].
///
/// ```text
///   bit:  31 ........ 8 | 7 .. 4 | 3       | 2        | 1      | 0
///         custom kinds  | spare  | GENERIC | MOBILITY | ACTIVE | TRANSFORM
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DirtyFlags(u32);

impl DirtyFlags {
    /// Nothing changed.
    pub const NONE: Self = Self(0);
    /// Position, rotation or scale changed.
    pub const TRANSFORM: Self = Self(1 << 0);
    /// The object was enabled or disabled.
    pub const ACTIVE: Self = Self(1 << 1);
    /// Static/movable classification changed.
    pub const MOBILITY: Self = Self(1 << 2);
    /// Kind-specific state without its own bit.
    pub const GENERIC_STATE: Self = Self(1 << 3);
    /// Every bit set. Forces a full payload.
    pub const EVERYTHING: Self = Self(u32::MAX);

    /// First bit available to [`custom`](Self::custom).
    pub const FIRST_CUSTOM_BIT: u32 = 8;

    /// A kind-specific flag on `bit`.
    ///
    /// # Panics
    ///
    /// If `bit` is a built-in bit or out of range. In a `const` this is a
    /// compile error.
    #[must_use]
    pub const fn custom(bit: u32) -> Self {
        assert!(
            bit >= Self::FIRST_CUSTOM_BIT && bit < u32::BITS,
            "custom dirty bit must be in 8..32"
        );
        Self(1 << bit)
    }

    /// Builds flags from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns true if no bit is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Sets the bits of `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Returns the current flags and clears them.
    #[inline]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl BitOr for DirtyFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for DirtyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMED: [(DirtyFlags, &str); 4] = [
            (DirtyFlags::TRANSFORM, "TRANSFORM"),
            (DirtyFlags::ACTIVE, "ACTIVE"),
            (DirtyFlags::MOBILITY, "MOBILITY"),
            (DirtyFlags::GENERIC_STATE, "GENERIC_STATE"),
        ];

        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        let mut separator = |f: &mut fmt::Formatter<'_>| {
            if first {
                first = false;
                Ok(())
            } else {
                f.write_str(" | ")
            }
        };
        for (flag, name) in NAMED {
            if self.contains(flag) {
                separator(f)?;
                f.write_str(name)?;
            }
        }
        for bit in Self::FIRST_CUSTOM_BIT..u32::BITS {
            if self.0 & (1 << bit) != 0 {
                separator(f)?;
                write!(f, "custom({bit})")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DirtyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirtyFlags({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_take() {
        let mut flags = DirtyFlags::NONE;
        flags |= DirtyFlags::TRANSFORM;
        flags.insert(DirtyFlags::ACTIVE);
        flags |= DirtyFlags::TRANSFORM;

        assert!(flags.contains(DirtyFlags::TRANSFORM | DirtyFlags::ACTIVE));
        assert!(!flags.intersects(DirtyFlags::MOBILITY));

        let taken = flags.take();
        assert_eq!(taken.bits(), 0b11);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_custom_bits() {
        const PARAMS: DirtyFlags = DirtyFlags::custom(9);
        let mut flags = PARAMS | DirtyFlags::GENERIC_STATE;
        assert!(flags.contains(PARAMS));
        flags.remove(PARAMS);
        assert_eq!(flags, DirtyFlags::GENERIC_STATE);
    }

    #[test]
    #[should_panic(expected = "custom dirty bit")]
    fn test_custom_rejects_builtin_bit() {
        let _ = DirtyFlags::custom(2);
    }

    #[test]
    fn test_display() {
        assert_eq!(DirtyFlags::NONE.to_string(), "NONE");
        let flags = DirtyFlags::TRANSFORM | DirtyFlags::MOBILITY | DirtyFlags::custom(8);
        assert_eq!(flags.to_string(), "TRANSFORM | MOBILITY | custom(8)");
    }
}
