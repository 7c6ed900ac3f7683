//! Core types for the tether ownership bridge.
//!
//! This crate holds everything the bridge and its registries share:
//!
//! - [`TypeHash`], [`NativeAddr`], [`RepHandle`]: identities
//! - [`Slot`], [`SlotType`], [`Signature`]: the shape of a bound call
//! - [`OwnershipPolicy`]: per-slot ownership annotations
//! - [`NativeValue`], [`HostValue`]: values on each side of the boundary
//! - [`numeric`] and [`enum_cast`]: enum round-trip rules
//! - [`NativeHeap`]: the reference native allocator
//! - error types for registration and calls

mod convert;
mod error;
mod ids;
mod native_heap;
mod policy;
mod slot;
mod type_hash;
mod value;

pub mod enum_cast;
pub mod numeric;

pub use convert::{Converter, FromNative, IntoNative, PrimitiveConverter};
pub use enum_cast::{EnumCaster, NativeEnum, Underlying, cast_constant, classify};
pub use error::{CallError, ConversionError, EnumCastError, NativeFault, RegistrationError};
pub use ids::{NativeAddr, RepHandle};
pub use native_heap::{DuplicateFn, NativeHeap, duplicate_of};
pub use numeric::{
    CastRule, FloatRepr, HostNumber, HostNumeric, IntRepr, RuleTable, ValueVerdict,
};
pub use policy::OwnershipPolicy;
pub use slot::{PrimitiveKind, Signature, Slot, SlotType};
pub use type_hash::{TypeHash, hash_constants};
pub use value::{HostValue, NativeValue, ObjectRef};
