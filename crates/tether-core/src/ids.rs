//! Generational identifiers for native objects and host representatives.
//!
//! Both sides of the bridge hand out `(index, generation)` pairs. When a slot
//! is freed its generation is bumped, so a stale identifier never aliases a
//! newer occupant of the same slot.

use std::fmt;

/// Address of an object on the native heap.
///
/// This plays the role of a raw pointer: two values with equal addresses are
/// the same native object. The generation makes a freed address detectable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeAddr {
    index: u32,
    generation: u32,
}

impl NativeAddr {
    /// Create an address from its parts.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index on the native heap.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this address was issued.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NativeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeAddr({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for NativeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}v{}", self.index, self.generation)
    }
}

/// Handle to a representative object living in the host runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepHandle {
    index: u32,
    generation: u32,
}

impl RepHandle {
    /// Create a handle from its parts.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the host heap.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the host slot when this handle was issued.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for RepHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepHandle({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for RepHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rep#{}v{}", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_distinguishes_addresses() {
        let a = NativeAddr::new(3, 0);
        let b = NativeAddr::new(3, 1);
        assert_ne!(a, b);
        assert_eq!(a.index(), b.index());
    }

    #[test]
    fn display_formats() {
        assert_eq!(NativeAddr::new(16, 2).to_string(), "0x10v2");
        assert_eq!(RepHandle::new(4, 1).to_string(), "rep#4v1");
    }
}
