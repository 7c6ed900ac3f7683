//! Call slots and native signatures.
//!
//! A bound callable has one slot per parameter plus the return slot.
//! Parameters are numbered from 1; for methods `Param(1)` is the receiver.

use std::fmt;

use crate::TypeHash;
use crate::numeric::IntRepr;
use crate::value::NativeValue;

/// A position in a call: the return value or a 1-based parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Return,
    Param(u16),
}

impl Slot {
    /// Zero-based parameter position, `None` for the return slot.
    pub fn param_index(self) -> Option<usize> {
        match self {
            Slot::Return => None,
            Slot::Param(n) => (n as usize).checked_sub(1),
        }
    }

    pub fn is_return(self) -> bool {
        matches!(self, Slot::Return)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Return => write!(f, "return slot"),
            Slot::Param(n) => write!(f, "param #{n}"),
        }
    }
}

/// Primitive value kinds that cross the boundary by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    String,
}

impl PrimitiveKind {
    /// Get the name of this primitive type.
    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Int8 => "int8",
            PrimitiveKind::Int16 => "int16",
            PrimitiveKind::Int32 => "int",
            PrimitiveKind::Int64 => "int64",
            PrimitiveKind::Uint8 => "uint8",
            PrimitiveKind::Uint16 => "uint16",
            PrimitiveKind::Uint32 => "uint",
            PrimitiveKind::Uint64 => "uint64",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
        }
    }

    /// The integer representation, for integral kinds.
    pub const fn int_repr(self) -> Option<IntRepr> {
        match self {
            PrimitiveKind::Int8 => Some(IntRepr::I8),
            PrimitiveKind::Int16 => Some(IntRepr::I16),
            PrimitiveKind::Int32 => Some(IntRepr::I32),
            PrimitiveKind::Int64 => Some(IntRepr::I64),
            PrimitiveKind::Uint8 => Some(IntRepr::U8),
            PrimitiveKind::Uint16 => Some(IntRepr::U16),
            PrimitiveKind::Uint32 => Some(IntRepr::U32),
            PrimitiveKind::Uint64 => Some(IntRepr::U64),
            _ => None,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }

    /// The zero value a pure out cell starts from.
    pub fn default_value(self) -> NativeValue {
        match self {
            PrimitiveKind::Bool => NativeValue::Bool(false),
            PrimitiveKind::Float | PrimitiveKind::Double => NativeValue::Float(0.0),
            PrimitiveKind::String => NativeValue::Str(String::new()),
            _ => NativeValue::Int(0),
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The declared type of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotType {
    /// No value (return slot only).
    Void,
    /// A primitive passed by value.
    Primitive(PrimitiveKind),
    /// A registered enum passed as a host number.
    Enum(TypeHash),
    /// A nullable pointer to a registered native object; carries identity.
    Object(TypeHash),
    /// A pointer to a primitive the callee writes through (out parameter).
    OutPtr(PrimitiveKind),
}

impl SlotType {
    /// Whether values in this slot are identified by address.
    pub fn is_object(self) -> bool {
        matches!(self, SlotType::Object(_))
    }

    pub fn object_type(self) -> Option<TypeHash> {
        match self {
            SlotType::Object(hash) => Some(hash),
            _ => None,
        }
    }

    pub fn is_void(self) -> bool {
        matches!(self, SlotType::Void)
    }

    /// Short description used in error messages.
    pub fn describe(self) -> String {
        match self {
            SlotType::Void => "void".to_string(),
            SlotType::Primitive(kind) => kind.name().to_string(),
            SlotType::Enum(hash) => format!("enum {hash}"),
            SlotType::Object(hash) => format!("object {hash}*"),
            SlotType::OutPtr(kind) => format!("{}*", kind.name()),
        }
    }
}

/// Parameter and return types of a native callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<SlotType>,
    pub ret: SlotType,
    /// Whether `Param(1)` is a receiver.
    pub is_method: bool,
}

impl Signature {
    /// A free function.
    pub fn function(params: impl IntoIterator<Item = SlotType>, ret: SlotType) -> Self {
        Self {
            params: params.into_iter().collect(),
            ret,
            is_method: false,
        }
    }

    /// A method on `receiver`; the receiver becomes `Param(1)` and `params`
    /// follow from `Param(2)`.
    pub fn method(receiver: TypeHash, params: impl IntoIterator<Item = SlotType>, ret: SlotType) -> Self {
        let mut all = vec![SlotType::Object(receiver)];
        all.extend(params);
        Self {
            params: all,
            ret,
            is_method: true,
        }
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Type of a slot, or `None` if the slot is out of range.
    pub fn slot_type(&self, slot: Slot) -> Option<SlotType> {
        match slot {
            Slot::Return => Some(self.ret),
            Slot::Param(_) => slot.param_index().and_then(|i| self.params.get(i).copied()),
        }
    }

    /// All slots in processing order: parameters first, then the return slot.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        (1..=self.params.len())
            .map(|n| Slot::Param(n as u16))
            .chain(std::iter::once(Slot::Return))
    }

    /// Hashes of the parameter types, for function identity.
    pub fn param_hashes(&self) -> Vec<TypeHash> {
        self.params
            .iter()
            .map(|ty| match ty {
                SlotType::Object(hash) | SlotType::Enum(hash) => *hash,
                other => TypeHash::from_name(&other.describe()),
            })
            .collect()
    }
}
