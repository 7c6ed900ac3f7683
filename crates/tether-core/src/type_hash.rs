//! Deterministic hash-based identity for native types, enums and call adapters.
//!
//! [`TypeHash`] is a 64-bit hash computed from a name. Registration of native
//! types, enums and bound functions all key their entries by it, so the same
//! name always yields the same identity regardless of registration order.
//!
//! # Examples
//!
//! ```
//! use tether_core::TypeHash;
//!
//! let a = TypeHash::from_name("Widget");
//! assert_eq!(a, TypeHash::from_name("Widget"));
//!
//! let f = TypeHash::from_function("make", &[a]);
//! let g = TypeHash::from_function("make", &[]);
//! assert_ne!(f, g);
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Domain marker for type hashes.
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for bound function hashes.
    pub const FUNCTION: u64 = 0x5ea77ffbcdf5f302;

    /// Parameter position mixing constants, one per position so order matters.
    pub const PARAM_MARKERS: [u64; 16] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
        0x7c3e9f2a5b8d1403,
        0x5d8c7b4a3e9f2106,
        0x3f1e9d8c7b5a4203,
        0x1a2b3c4d5e6f7089,
        0x9f8e7d6c5b4a3210,
        0x2468ace013579bdf,
        0xfdb97531eca86420,
        0x123456789abcdef0,
    ];
}

/// A deterministic 64-bit hash identifying a native type, enum or function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a function hash from a name and the hashes of its parameter types.
    ///
    /// Parameter order matters: `(A, B)` and `(B, A)` hash differently.
    pub fn from_function(name: &str, params: &[TypeHash]) -> Self {
        let mut hash = hash_constants::FUNCTION ^ xxh64(name.as_bytes(), 0);
        for (i, param) in params.iter().enumerate() {
            let marker = hash_constants::PARAM_MARKERS[i % hash_constants::PARAM_MARKERS.len()];
            hash = hash.rotate_left(5) ^ param.0.wrapping_mul(marker);
        }
        TypeHash(hash)
    }

    /// Check if this is the empty hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_hash() {
        assert_eq!(TypeHash::from_name("Widget"), TypeHash::from_name("Widget"));
        assert_ne!(TypeHash::from_name("Widget"), TypeHash::from_name("Gadget"));
    }

    #[test]
    fn function_hash_depends_on_param_order() {
        let a = TypeHash::from_name("A");
        let b = TypeHash::from_name("B");
        assert_ne!(
            TypeHash::from_function("f", &[a, b]),
            TypeHash::from_function("f", &[b, a])
        );
    }

    #[test]
    fn function_and_type_domains_differ() {
        assert_ne!(TypeHash::from_name("f"), TypeHash::from_function("f", &[]));
    }

    #[test]
    fn empty_hash() {
        assert!(TypeHash::EMPTY.is_empty());
        assert!(!TypeHash::from_name("x").is_empty());
    }
}
