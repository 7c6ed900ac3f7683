//! Error types for the bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! RegistrationError - binding a call adapter, type or enum failed (fatal to registration)
//! CallError         - one invocation failed
//! ├── ConversionError - a host argument could not become a native argument
//! └── NativeFault     - the native callable itself failed
//! EnumCastError     - a direct enum/host-number cast was refused
//! ```
//!
//! Ownership bookkeeping after a successful call never fails, so there is no
//! error type for it.

use thiserror::Error;

use crate::numeric::{HostNumber, IntRepr};
use crate::policy::OwnershipPolicy;
use crate::slot::Slot;
use crate::{NativeAddr, RepHandle, TypeHash};

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors raised while binding adapters, types or enums.
///
/// These are never deferred: an adapter, type or enum that fails registration
/// cannot be used at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// A policy names a slot the signature does not have.
    #[error("'{function}': {policy} refers to {slot}, but the signature has {params} parameter(s)")]
    SlotOutOfRange {
        function: String,
        policy: OwnershipPolicy,
        slot: Slot,
        params: usize,
    },

    /// A policy is attached to a slot of the wrong kind.
    #[error("'{function}': {policy} cannot apply to {slot} of type {slot_type}: {reason}")]
    IncompatibleSlot {
        function: String,
        policy: OwnershipPolicy,
        slot: Slot,
        slot_type: String,
        reason: &'static str,
    },

    /// Two ownership-transfer policies target the same slot.
    #[error("'{function}': {slot} already has {existing}, cannot also apply {policy}")]
    DuplicatePolicy {
        function: String,
        slot: Slot,
        existing: OwnershipPolicy,
        policy: OwnershipPolicy,
    },

    /// A slot refers to a native type that was never registered.
    #[error("'{function}': {slot} uses unregistered type {type_hash}")]
    UnknownType {
        function: String,
        slot: Slot,
        type_hash: TypeHash,
    },

    /// A type with this name was already registered.
    #[error("duplicate type: {0}")]
    DuplicateType(String),

    /// `Copied` needs a duplication operation the type does not provide.
    #[error("'{function}': type '{type_name}' has no duplication operation, {slot} cannot be copied")]
    MissingDuplicate {
        function: String,
        slot: Slot,
        type_name: String,
    },

    /// The adapter was built without a native callable.
    #[error("'{0}': no native callable was supplied")]
    MissingNative(String),

    /// The signature has more parameters than the bridge accepts.
    #[error("'{function}': {params} parameters exceed the configured limit of {limit}")]
    TooManyParams {
        function: String,
        params: usize,
        limit: usize,
    },

    /// A parameter was declared `void`.
    #[error("'{function}': {slot} cannot be void")]
    VoidParam { function: String, slot: Slot },

    /// An enum constant fails every round-trip rule.
    #[error(
        "enum '{enum_name}': constant '{constant}' = {value} cannot round-trip through host number {host}"
    )]
    EnumCast {
        enum_name: String,
        constant: String,
        value: i128,
        host: HostNumber,
    },

    /// An enum used as a parameter or return type is not safe as a whole type.
    #[error(
        "'{function}': enum '{enum_name}' ({repr}) is not whole-type safe in host number {host} and cannot be a call slot"
    )]
    EnumNotWholeTypeSafe {
        function: String,
        enum_name: String,
        repr: IntRepr,
        host: HostNumber,
    },

    /// The same constant name was registered twice in one enum.
    #[error("duplicate enum value: '{value_name}' in enum '{enum_name}'")]
    DuplicateEnumValue {
        enum_name: String,
        value_name: String,
    },
}

// ============================================================================
// Call-time Errors
// ============================================================================

/// Errors converting a host value into a native argument.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The host value has the wrong shape for the slot.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: &'static str,
    },

    /// An integer does not fit the slot's integer type.
    #[error("integer overflow: value {value} does not fit in {target_type}")]
    IntegerOverflow {
        value: i128,
        target_type: &'static str,
    },

    /// A float carries a fractional part where an integer is required.
    #[error("number {value} is not an integer")]
    NotIntegral { value: f64 },

    /// The representative is not known to the bridge or has been collected.
    #[error("{0} is not a live representative")]
    StaleRepresentative(RepHandle),

    /// The native object behind a representative no longer exists.
    #[error("{rep} refers to freed native object {addr}")]
    DanglingObject { rep: RepHandle, addr: NativeAddr },

    /// A representative of one type was passed where another is expected.
    #[error("expected object of type {expected}, got {actual}")]
    ObjectTypeMismatch { expected: TypeHash, actual: TypeHash },

    /// `Adopted` was applied to a value the bridge does not own.
    #[error("{0} cannot be adopted: the bridge does not own it")]
    NotOwned(RepHandle),

    /// A number does not name any constant of the enum.
    #[error("{value} is not a valid value of enum '{enum_name}'")]
    InvalidEnumValue { enum_name: String, value: i128 },
}

/// Failures raised by native callables.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeFault {
    /// Argument index out of bounds.
    #[error("argument index {index} out of bounds (function has {count} parameters)")]
    ArgumentIndex { index: usize, count: usize },

    /// An argument does not hold the expected kind of value.
    #[error("argument {index}: expected {expected}, got {actual}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// A null pointer reached code that requires an object.
    #[error("argument {index}: null pointer")]
    NullPointer { index: usize },

    /// The object at an address has been freed.
    #[error("stale native address {0}")]
    StaleAddress(NativeAddr),

    /// The object at an address is not of the expected Rust type.
    #[error("native object at {addr} is not a {expected}")]
    WrongNativeType {
        addr: NativeAddr,
        expected: &'static str,
    },

    /// A Rust type was used without being registered.
    #[error("native type '{0}' is not registered")]
    UnregisteredType(&'static str),

    /// Generic native failure.
    #[error("{0}")]
    Message(String),
}

impl NativeFault {
    /// Create a generic native fault.
    pub fn message(message: impl Into<String>) -> Self {
        NativeFault::Message(message.into())
    }
}

/// Errors surfaced to the host runtime for one call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The host passed the wrong number of arguments.
    #[error("'{function}' expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    /// Argument conversion failed; the native callable did not run.
    #[error("'{function}' argument {index}: {source}")]
    Conversion {
        function: String,
        index: usize,
        #[source]
        source: ConversionError,
    },

    /// The native callable failed; no ownership transfer took place.
    #[error("native fault: {0}")]
    Native(#[from] NativeFault),
}

// ============================================================================
// Enum Cast Errors
// ============================================================================

/// Errors from direct enum/host-number casts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnumCastError {
    /// The enum's representation is not safe as a whole type.
    #[error("enum '{enum_name}' ({repr}) cannot round-trip through host number {host}")]
    UnsafeType {
        enum_name: String,
        repr: IntRepr,
        host: HostNumber,
    },

    /// One constant cannot round-trip.
    #[error("value {value} of enum '{enum_name}' cannot round-trip through host number {host}")]
    UnsafeValue {
        enum_name: String,
        value: i128,
        host: HostNumber,
    },

    /// A host number does not hold an integer.
    #[error("host number {value} is not an integer")]
    NotIntegral { value: String },

    /// A host number does not name a variant.
    #[error("{value} is not a variant of enum '{enum_name}'")]
    UnknownDiscriminant { enum_name: String, value: i128 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_error_messages() {
        let err = RegistrationError::SlotOutOfRange {
            function: "make".into(),
            policy: OwnershipPolicy::Adopted(Slot::Param(3)),
            slot: Slot::Param(3),
            params: 1,
        };
        let text = err.to_string();
        assert!(text.contains("make"));
        assert!(text.contains("param #3"));
        assert!(text.contains("1 parameter"));
    }

    #[test]
    fn conversion_error_wraps_into_call_error() {
        let err = CallError::Conversion {
            function: "take".into(),
            index: 2,
            source: ConversionError::IntegerOverflow {
                value: 300,
                target_type: "u8",
            },
        };
        assert!(err.to_string().contains("argument 2"));
        assert!(err.to_string().contains("300"));
    }

    #[test]
    fn native_fault_converts() {
        let err: CallError = NativeFault::message("boom").into();
        assert_eq!(err, CallError::Native(NativeFault::Message("boom".into())));
        assert_eq!(err.to_string(), "native fault: boom");
    }
}
