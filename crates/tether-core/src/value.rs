//! Values on either side of the bridge.
//!
//! [`NativeValue`] is what a native callable reads and writes. [`HostValue`] is
//! what the host runtime passes in and receives back. Objects never cross by
//! value: the native side sees an [`ObjectRef`] (address plus type), the host
//! side sees a [`RepHandle`].

use std::fmt;

use crate::numeric::HostNumeric;
use crate::{NativeAddr, RepHandle, TypeHash};

/// A pointer to a native object of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// `None` is the null pointer.
    pub addr: Option<NativeAddr>,
    pub type_hash: TypeHash,
}

impl ObjectRef {
    pub fn new(addr: NativeAddr, type_hash: TypeHash) -> Self {
        Self {
            addr: Some(addr),
            type_hash,
        }
    }

    pub fn null(type_hash: TypeHash) -> Self {
        Self {
            addr: None,
            type_hash,
        }
    }

    pub fn is_null(&self) -> bool {
        self.addr.is_none()
    }
}

/// A value as seen by native code.
///
/// All integer kinds travel as `Int`; `u64` is bit-reinterpreted so its full
/// range survives.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NativeValue {
    #[default]
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A constant of a registered enum, carried as its exact discriminant.
    Enum { type_hash: TypeHash, value: i128 },
    Object(ObjectRef),
}

impl NativeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeValue::Void => "void",
            NativeValue::Bool(_) => "bool",
            NativeValue::Int(_) => "int",
            NativeValue::Float(_) => "float",
            NativeValue::Str(_) => "string",
            NativeValue::Enum { .. } => "enum",
            NativeValue::Object(_) => "object",
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            NativeValue::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    /// The address, for non-null object values.
    pub fn addr(&self) -> Option<NativeAddr> {
        self.as_object().and_then(|obj| obj.addr)
    }
}

/// A value as seen by the host runtime.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Number(f64),
    Str(String),
    /// A representative of a native object.
    Rep(RepHandle),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "boolean",
            HostValue::Int(_) => "integer",
            HostValue::Number(_) => "number",
            HostValue::Str(_) => "string",
            HostValue::Rep(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    pub fn as_rep(&self) -> Option<RepHandle> {
        match self {
            HostValue::Rep(rep) => Some(*rep),
            _ => None,
        }
    }

    /// The value as a float, for numeric values.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Int(v) => Some(*v as f64),
            HostValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<HostNumeric> for HostValue {
    fn from(number: HostNumeric) -> Self {
        match number {
            HostNumeric::I8(v) => HostValue::Int(v.into()),
            HostNumeric::I16(v) => HostValue::Int(v.into()),
            HostNumeric::I32(v) => HostValue::Int(v.into()),
            HostNumeric::I64(v) => HostValue::Int(v),
            HostNumeric::U8(v) => HostValue::Int(v.into()),
            HostNumeric::U16(v) => HostValue::Int(v.into()),
            HostNumeric::U32(v) => HostValue::Int(v.into()),
            HostNumeric::U64(v) => HostValue::Int(v as i64),
            HostNumeric::F32(v) => HostValue::Number(v.into()),
            HostNumeric::F64(v) => HostValue::Number(v),
            HostNumeric::Extended(v) => HostValue::Number(v as f64),
        }
    }
}

impl From<RepHandle> for HostValue {
    fn from(rep: RepHandle) -> Self {
        HostValue::Rep(rep)
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => f.write_str("nil"),
            HostValue::Bool(v) => write!(f, "{v}"),
            HostValue::Int(v) => write!(f, "{v}"),
            HostValue::Number(v) => write!(f, "{v}"),
            HostValue::Str(v) => write!(f, "{v:?}"),
            HostValue::Rep(rep) => write!(f, "{rep}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_numeric_to_host_value() {
        assert_eq!(HostValue::from(HostNumeric::I32(-4)), HostValue::Int(-4));
        assert_eq!(HostValue::from(HostNumeric::U64(u64::MAX)), HostValue::Int(-1));
        assert_eq!(HostValue::from(HostNumeric::F32(2.0)), HostValue::Number(2.0));
    }

    #[test]
    fn null_object_has_no_addr() {
        let hash = TypeHash::from_name("Node");
        let value = NativeValue::Object(ObjectRef::null(hash));
        assert_eq!(value.addr(), None);
        assert_eq!(value.as_object().map(|o| o.type_hash), Some(hash));

        let addr = NativeAddr::new(1, 0);
        assert_eq!(NativeValue::Object(ObjectRef::new(addr, hash)).addr(), Some(addr));
    }
}
