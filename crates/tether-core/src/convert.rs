//! Conversion between host values and native values.
//!
//! Two layers live here:
//! - [`Converter`]: the bridge's converter chain for by-value slots
//!   (primitives, out-pointer pointees and enums). Objects never pass through
//!   it; the bridge resolves them against the representative registry.
//! - [`FromNative`] / [`IntoNative`]: typed access for native callables, so a
//!   callable can read `i32` or `String` straight out of a [`NativeValue`].
//!
//! ## Integer handling
//!
//! Every integer kind is carried as `i64`. Narrowing conversions are bounds
//! checked; `u64` is bit-reinterpreted so its full range survives.

use crate::error::ConversionError;
use crate::numeric::{HostNumber, HostNumeric, IntRepr};
use crate::slot::{PrimitiveKind, SlotType};
use crate::value::{HostValue, NativeValue};

/// Converts by-value slots between the host and native representations.
pub trait Converter: Send + Sync {
    /// Convert a host argument for a slot of type `ty`.
    fn to_native(&self, value: &HostValue, ty: &SlotType) -> Result<NativeValue, ConversionError>;

    /// Convert a native result back into a host value.
    fn to_host(&self, value: &NativeValue) -> HostValue;
}

/// The default converter: primitives by kind, enums through the host number
/// representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveConverter {
    host: HostNumber,
}

impl PrimitiveConverter {
    pub fn new(host: HostNumber) -> Self {
        Self { host }
    }

    pub fn host(&self) -> HostNumber {
        self.host
    }

    fn integer(value: &HostValue, repr: IntRepr) -> Result<i64, ConversionError> {
        let exact: i128 = match value {
            HostValue::Int(v) if repr == IntRepr::U64 => return Ok(*v),
            HostValue::Int(v) => (*v).into(),
            HostValue::Number(v) => HostNumeric::F64(*v)
                .to_i128()
                .ok_or(ConversionError::NotIntegral { value: *v })?,
            other => {
                return Err(ConversionError::TypeMismatch {
                    expected: repr.name().to_string(),
                    actual: other.type_name(),
                });
            }
        };
        if !repr.contains(exact) {
            return Err(ConversionError::IntegerOverflow {
                value: exact,
                target_type: repr.name(),
            });
        }
        // u64 above i64::MAX is stored bit-reinterpreted
        Ok(exact as i64)
    }

    fn primitive(value: &HostValue, kind: PrimitiveKind) -> Result<NativeValue, ConversionError> {
        if let Some(repr) = kind.int_repr() {
            return Self::integer(value, repr).map(NativeValue::Int);
        }
        match (kind, value) {
            (PrimitiveKind::Bool, HostValue::Bool(v)) => Ok(NativeValue::Bool(*v)),
            (PrimitiveKind::Float, HostValue::Number(v)) => Ok(NativeValue::Float((*v as f32).into())),
            (PrimitiveKind::Float, HostValue::Int(v)) => Ok(NativeValue::Float((*v as f32).into())),
            (PrimitiveKind::Double, HostValue::Number(v)) => Ok(NativeValue::Float(*v)),
            (PrimitiveKind::Double, HostValue::Int(v)) => Ok(NativeValue::Float(*v as f64)),
            (PrimitiveKind::String, HostValue::Str(v)) => Ok(NativeValue::Str(v.clone())),
            (kind, other) => Err(ConversionError::TypeMismatch {
                expected: kind.name().to_string(),
                actual: other.type_name(),
            }),
        }
    }

    /// Read a host number as an exact enum discriminant.
    fn discriminant(&self, value: &HostValue) -> Result<i128, ConversionError> {
        match value {
            HostValue::Int(v) if self.host == HostNumber::Int(IntRepr::U64) => Ok((*v as u64).into()),
            HostValue::Int(v) => Ok((*v).into()),
            HostValue::Number(v) => HostNumeric::F64(*v)
                .to_i128()
                .ok_or(ConversionError::NotIntegral { value: *v }),
            other => Err(ConversionError::TypeMismatch {
                expected: format!("enum ({})", self.host),
                actual: other.type_name(),
            }),
        }
    }
}

impl Converter for PrimitiveConverter {
    fn to_native(&self, value: &HostValue, ty: &SlotType) -> Result<NativeValue, ConversionError> {
        match ty {
            SlotType::Primitive(kind) | SlotType::OutPtr(kind) => Self::primitive(value, *kind),
            SlotType::Enum(type_hash) => Ok(NativeValue::Enum {
                type_hash: *type_hash,
                value: self.discriminant(value)?,
            }),
            SlotType::Void | SlotType::Object(_) => Err(ConversionError::TypeMismatch {
                expected: ty.describe(),
                actual: value.type_name(),
            }),
        }
    }

    fn to_host(&self, value: &NativeValue) -> HostValue {
        match value {
            NativeValue::Void | NativeValue::Object(_) => HostValue::Nil,
            NativeValue::Bool(v) => HostValue::Bool(*v),
            NativeValue::Int(v) => HostValue::Int(*v),
            NativeValue::Float(v) => HostValue::Number(*v),
            NativeValue::Str(v) => HostValue::Str(v.clone()),
            NativeValue::Enum { value, .. } => HostNumeric::cast(*value, self.host).into(),
        }
    }
}

/// Extract a Rust value from a native value.
pub trait FromNative: Sized {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError>;
}

/// Convert a Rust value into a native value.
pub trait IntoNative {
    fn into_native(self) -> NativeValue;
}

fn mismatch(expected: &str, value: &NativeValue) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        actual: value.type_name(),
    }
}

// ============================================================================
// Integer implementations
// ============================================================================

macro_rules! impl_native_int {
    ($($ty:ty),*) => {
        $(
            impl FromNative for $ty {
                fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
                    match value {
                        NativeValue::Int(v) => <$ty>::try_from(*v).map_err(|_| {
                            ConversionError::IntegerOverflow {
                                value: (*v).into(),
                                target_type: stringify!($ty),
                            }
                        }),
                        other => Err(mismatch("int", other)),
                    }
                }
            }

            impl IntoNative for $ty {
                fn into_native(self) -> NativeValue {
                    NativeValue::Int(self.into())
                }
            }
        )*
    };
}

impl_native_int!(i8, i16, i32, i64, u8, u16, u32);

impl FromNative for u64 {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Int(v) => Ok(*v as u64),
            other => Err(mismatch("int", other)),
        }
    }
}

impl IntoNative for u64 {
    fn into_native(self) -> NativeValue {
        NativeValue::Int(self as i64)
    }
}

// ============================================================================
// Float, bool, string and unit implementations
// ============================================================================

impl FromNative for f64 {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Float(v) => Ok(*v),
            NativeValue::Int(v) => Ok(*v as f64),
            other => Err(mismatch("float", other)),
        }
    }
}

impl IntoNative for f64 {
    fn into_native(self) -> NativeValue {
        NativeValue::Float(self)
    }
}

impl FromNative for f32 {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        f64::from_native(value).map(|v| v as f32)
    }
}

impl IntoNative for f32 {
    fn into_native(self) -> NativeValue {
        NativeValue::Float(self.into())
    }
}

impl FromNative for bool {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Bool(v) => Ok(*v),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl IntoNative for bool {
    fn into_native(self) -> NativeValue {
        NativeValue::Bool(self)
    }
}

impl FromNative for String {
    fn from_native(value: &NativeValue) -> Result<Self, ConversionError> {
        match value {
            NativeValue::Str(v) => Ok(v.clone()),
            other => Err(mismatch("string", other)),
        }
    }
}

impl IntoNative for String {
    fn into_native(self) -> NativeValue {
        NativeValue::Str(self)
    }
}

impl IntoNative for &str {
    fn into_native(self) -> NativeValue {
        NativeValue::Str(self.to_string())
    }
}

impl IntoNative for () {
    fn into_native(self) -> NativeValue {
        NativeValue::Void
    }
}

impl IntoNative for NativeValue {
    fn into_native(self) -> NativeValue {
        self
    }
}
