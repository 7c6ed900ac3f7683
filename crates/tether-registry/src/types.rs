//! Registry of native object types and enums known to the bridge.
//!
//! Object slots and enum slots in a signature refer to entries here by
//! [`TypeHash`]. Enum entries carry the round-trip verdict of every constant,
//! computed once when the enum is registered.

use std::any::TypeId;

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use tether_core::{
    CastRule, DuplicateFn, HostNumber, HostNumeric, IntRepr, RegistrationError, RuleTable,
    TypeHash, ValueVerdict,
};
use tracing::debug;

bitflags! {
    /// Capabilities of a registered native type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u32 {
        /// The type has a duplication operation and may be returned `Copied`.
        const DUPLICABLE = 1 << 0;
    }
}

/// Registry entry for a native object type.
#[derive(Debug, Clone)]
pub struct NativeTypeEntry {
    pub name: String,
    pub type_hash: TypeHash,
    pub rust_type: TypeId,
    pub rust_name: &'static str,
    pub flags: TypeFlags,
    pub duplicate: Option<DuplicateFn>,
}

impl NativeTypeEntry {
    pub fn new(name: impl Into<String>, rust_type: TypeId, rust_name: &'static str) -> Self {
        let name = name.into();
        Self {
            type_hash: TypeHash::from_name(&name),
            name,
            rust_type,
            rust_name,
            flags: TypeFlags::empty(),
            duplicate: None,
        }
    }

    /// Attach a duplication operation.
    pub fn with_duplicate(mut self, duplicate: DuplicateFn) -> Self {
        self.duplicate = Some(duplicate);
        self.flags |= TypeFlags::DUPLICABLE;
        self
    }

    pub fn is_duplicable(&self) -> bool {
        self.flags.contains(TypeFlags::DUPLICABLE)
    }
}

/// One named constant of a registered enum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstant {
    pub name: String,
    pub value: i128,
    pub verdict: ValueVerdict,
    /// The constant as stored by the host.
    pub host_value: HostNumeric,
}

/// Registry entry for an enum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumEntry {
    pub name: String,
    pub type_hash: TypeHash,
    pub repr: IntRepr,
    pub host: HostNumber,
    /// Whole-type verdict for `(repr, host)`.
    pub rule: CastRule,
    pub constants: Vec<EnumConstant>,
}

impl EnumEntry {
    /// Whether every value of the representation round-trips, which is what
    /// a call slot of this enum type requires.
    pub fn is_whole_type_safe(&self) -> bool {
        self.rule.is_safe()
    }

    /// Look up a constant by name.
    pub fn get_value(&self, name: &str) -> Option<i128> {
        self.constants.iter().find(|c| c.name == name).map(|c| c.value)
    }

    /// Look up a constant's name by value.
    pub fn get_name(&self, value: i128) -> Option<&str> {
        self.constants
            .iter()
            .find(|c| c.value == value)
            .map(|c| c.name.as_str())
    }

    pub fn contains_value(&self, value: i128) -> bool {
        self.constants.iter().any(|c| c.value == value)
    }
}

/// Native types and enums by hash.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: FxHashMap<TypeHash, NativeTypeEntry>,
    by_rust: FxHashMap<TypeId, TypeHash>,
    enums: FxHashMap<TypeHash, EnumEntry>,
    rules: RuleTable,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ==========================================================================
    // Native types
    // ==========================================================================

    /// Register a native object type.
    pub fn register_type(&mut self, entry: NativeTypeEntry) -> Result<TypeHash, RegistrationError> {
        let hash = entry.type_hash;
        if self.contains(hash) || self.by_rust.contains_key(&entry.rust_type) {
            return Err(RegistrationError::DuplicateType(entry.name));
        }
        debug!(name = %entry.name, %hash, duplicable = entry.is_duplicable(), "registered native type");
        self.by_rust.insert(entry.rust_type, hash);
        self.types.insert(hash, entry);
        Ok(hash)
    }

    pub fn get_type(&self, hash: TypeHash) -> Option<&NativeTypeEntry> {
        self.types.get(&hash)
    }

    /// Hash of the type registered for a Rust type.
    pub fn hash_of(&self, rust_type: TypeId) -> Option<TypeHash> {
        self.by_rust.get(&rust_type).copied()
    }

    /// Display name for a type or enum hash.
    pub fn type_name(&self, hash: TypeHash) -> String {
        if let Some(entry) = self.types.get(&hash) {
            entry.name.clone()
        } else if let Some(entry) = self.enums.get(&hash) {
            entry.name.clone()
        } else {
            hash.to_string()
        }
    }

    /// Whether a type or enum with this hash exists.
    pub fn contains(&self, hash: TypeHash) -> bool {
        self.types.contains_key(&hash) || self.enums.contains_key(&hash)
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    // ==========================================================================
    // Enums
    // ==========================================================================

    /// Whole-type verdict for a pair, cached after the first evaluation.
    pub fn rule(&mut self, repr: IntRepr, host: HostNumber) -> CastRule {
        self.rules.rule(repr, host)
    }

    /// Verdict for one constant.
    pub fn classify_constant(&mut self, repr: IntRepr, value: i128, host: HostNumber) -> ValueVerdict {
        let rule = self.rule(repr, host);
        if rule.is_safe() && repr.contains(value) {
            ValueVerdict::WholeType(rule)
        } else {
            tether_core::numeric::classify_value(repr, value, host)
        }
    }

    /// Register a fully validated enum.
    pub fn register_enum(&mut self, entry: EnumEntry) -> Result<TypeHash, RegistrationError> {
        let hash = entry.type_hash;
        if self.contains(hash) {
            return Err(RegistrationError::DuplicateType(entry.name));
        }
        debug!(
            name = %entry.name,
            repr = %entry.repr,
            host = %entry.host,
            constants = entry.constants.len(),
            whole_type_safe = entry.is_whole_type_safe(),
            "registered enum"
        );
        self.enums.insert(hash, entry);
        Ok(hash)
    }

    pub fn get_enum(&self, hash: TypeHash) -> Option<&EnumEntry> {
        self.enums.get(&hash)
    }

    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }

    /// Number of `(repr, host)` pairs evaluated so far.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
