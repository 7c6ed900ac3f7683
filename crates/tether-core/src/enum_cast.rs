//! Native enums and their checked conversion to host numbers.
//!
//! Any fieldless enum deriving `num_enum`'s `IntoPrimitive` and
//! `TryFromPrimitive` is a [`NativeEnum`]. Its underlying representation is
//! classified against the host number type with the rules in
//! [`numeric`](crate::numeric):
//!
//! ```
//! use num_enum::{IntoPrimitive, TryFromPrimitive};
//! use tether_core::{EnumCaster, HostNumber, NativeEnum};
//!
//! #[derive(Clone, Copy, Debug, PartialEq, IntoPrimitive, TryFromPrimitive)]
//! #[repr(u16)]
//! enum Channel {
//!     Red = 1,
//!     Green = 2,
//! }
//!
//! let caster = EnumCaster::<Channel>::new(HostNumber::DOUBLE).unwrap();
//! let stored = caster.to_host(Channel::Green);
//! assert_eq!(caster.from_host(stored).unwrap(), Channel::Green);
//! ```

use std::fmt;
use std::marker::PhantomData;

use num_enum::TryFromPrimitive;

use crate::error::EnumCastError;
use crate::numeric::{
    CastRule, HostNumber, HostNumeric, IntRepr, ValueVerdict, classify_value, whole_type_rule,
};

/// An integer type that can underlie a native enum.
pub trait Underlying: Copy + Into<i128> + TryFrom<i128> + fmt::Debug + 'static {
    /// The representation descriptor for this type.
    const REPR: IntRepr;
}

macro_rules! impl_underlying {
    ($($ty:ty => $repr:ident),* $(,)?) => {
        $(
            impl Underlying for $ty {
                const REPR: IntRepr = IntRepr::$repr;
            }
        )*
    };
}

impl_underlying!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
);

/// A native enumerated type with an integral representation.
pub trait NativeEnum: Copy + 'static {
    /// The underlying integer type.
    type Repr: Underlying;

    /// The enum's Rust name.
    const NAME: &'static str;

    fn to_repr(self) -> Self::Repr;

    fn from_repr(repr: Self::Repr) -> Option<Self>;

    /// The value as an exact integer.
    fn discriminant(self) -> i128 {
        self.to_repr().into()
    }

    /// Rebuild a value from an exact integer, if it names a variant.
    fn from_discriminant(value: i128) -> Option<Self> {
        Self::Repr::try_from(value).ok().and_then(Self::from_repr)
    }
}

impl<E> NativeEnum for E
where
    E: TryFromPrimitive + Into<<E as TryFromPrimitive>::Primitive> + Copy + 'static,
    <E as TryFromPrimitive>::Primitive: Underlying,
{
    type Repr = <E as TryFromPrimitive>::Primitive;

    const NAME: &'static str = <E as TryFromPrimitive>::NAME;

    fn to_repr(self) -> Self::Repr {
        self.into()
    }

    fn from_repr(repr: Self::Repr) -> Option<Self> {
        E::try_from_primitive(repr).ok()
    }
}

/// Converter for an enum type whose every value round-trips through the host
/// number type.
///
/// Construction fails when the whole-type rule does not hold; individual
/// constants of such types can still be checked with [`cast_constant`].
pub struct EnumCaster<E> {
    host: HostNumber,
    rule: CastRule,
    _marker: PhantomData<fn() -> E>,
}

impl<E: NativeEnum> EnumCaster<E> {
    pub fn new(host: HostNumber) -> Result<Self, EnumCastError> {
        let repr = E::Repr::REPR;
        let rule = whole_type_rule(repr, host);
        if !rule.is_safe() {
            return Err(EnumCastError::UnsafeType {
                enum_name: E::NAME.to_string(),
                repr,
                host,
            });
        }
        Ok(Self {
            host,
            rule,
            _marker: PhantomData,
        })
    }

    pub fn rule(&self) -> CastRule {
        self.rule
    }

    pub fn host(&self) -> HostNumber {
        self.host
    }

    pub fn to_host(&self, value: E) -> HostNumeric {
        HostNumeric::cast(value.discriminant(), self.host)
    }

    pub fn from_host(&self, stored: HostNumeric) -> Result<E, EnumCastError> {
        let value = stored.to_i128().ok_or(EnumCastError::NotIntegral {
            value: stored.to_string(),
        })?;
        E::from_discriminant(value).ok_or_else(|| EnumCastError::UnknownDiscriminant {
            enum_name: E::NAME.to_string(),
            value,
        })
    }
}

impl<E> Clone for EnumCaster<E> {
    fn clone(&self) -> Self {
        Self {
            host: self.host,
            rule: self.rule,
            _marker: PhantomData,
        }
    }
}

impl<E> fmt::Debug for EnumCaster<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumCaster")
            .field("host", &self.host)
            .field("rule", &self.rule)
            .finish()
    }
}

/// Classify one enum constant against a host number type.
pub fn classify<E: NativeEnum>(value: E, host: HostNumber) -> ValueVerdict {
    classify_value(E::Repr::REPR, value.discriminant(), host)
}

/// Cast one constant, rejecting it unless some rule proves it round-trips.
pub fn cast_constant<E: NativeEnum>(value: E, host: HostNumber) -> Result<HostNumeric, EnumCastError> {
    let discriminant = value.discriminant();
    if classify(value, host).is_accepted() {
        Ok(HostNumeric::cast(discriminant, host))
    } else {
        Err(EnumCastError::UnsafeValue {
            enum_name: E::NAME.to_string(),
            value: discriminant,
            host,
        })
    }
}

/// Compile-time gate for enum representations and constants.
///
/// ```
/// use tether_core::{assert_enum_castable, FloatRepr, HostNumber};
///
/// assert_enum_castable!(i32 => HostNumber::DOUBLE);
/// assert_enum_castable!(u64 = 0 => HostNumber::Float(FloatRepr::Single));
/// ```
///
/// ```compile_fail
/// use tether_core::{assert_enum_castable, FloatRepr, HostNumber};
///
/// assert_enum_castable!(u64 => HostNumber::Float(FloatRepr::Single));
/// ```
#[macro_export]
macro_rules! assert_enum_castable {
    ($repr:ty => $host:expr) => {
        const _: () = assert!(
            $crate::numeric::whole_type_rule(
                <$repr as $crate::enum_cast::Underlying>::REPR,
                $host
            )
            .is_safe(),
            "enum representation cannot round-trip through the host number type"
        );
    };
    ($repr:ty = $value:expr => $host:expr) => {
        const _: () = assert!(
            $crate::numeric::classify_value(
                <$repr as $crate::enum_cast::Underlying>::REPR,
                $value as i128,
                $host
            )
            .is_accepted(),
            "enum constant cannot round-trip through the host number type"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::FloatRepr;
    use num_enum::{IntoPrimitive, TryFromPrimitive};

    #[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
    #[repr(u64)]
    enum Porridge {
        SuperfluidHelium = 0,
        Goldilocks = 2_147_483_647,
        CookedInATokamak = u64::MAX,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
    #[repr(i8)]
    enum Sign {
        Negative = -1,
        Zero = 0,
        Positive = 1,
    }

    assert_enum_castable!(i8 => HostNumber::INT);
    assert_enum_castable!(u64 = 2_147_483_647 => HostNumber::DOUBLE);

    #[test]
    fn blanket_impl_reads_repr() {
        assert_eq!(<Porridge as NativeEnum>::Repr::REPR, IntRepr::U64);
        assert_eq!(<Porridge as NativeEnum>::NAME, "Porridge");
        assert_eq!(Porridge::CookedInATokamak.discriminant(), u64::MAX as i128);
        assert_eq!(Sign::from_discriminant(-1), Some(Sign::Negative));
        assert_eq!(Sign::from_discriminant(2), None);
        assert_eq!(Sign::from_discriminant(1000), None);
    }

    #[test]
    fn whole_type_caster_rejects_wide_repr() {
        let err = EnumCaster::<Porridge>::new(HostNumber::Float(FloatRepr::Single)).unwrap_err();
        assert!(matches!(err, EnumCastError::UnsafeType { repr: IntRepr::U64, .. }));
        assert!(err.to_string().contains("Porridge"));
    }

    #[test]
    fn whole_type_caster_round_trips() {
        let caster = EnumCaster::<Sign>::new(HostNumber::DOUBLE).unwrap();
        assert_eq!(caster.rule(), CastRule::Float);
        for value in [Sign::Negative, Sign::Zero, Sign::Positive] {
            assert_eq!(caster.from_host(caster.to_host(value)).unwrap(), value);
        }
    }

    #[test]
    fn from_host_rejects_fractions_and_unknown_values() {
        let caster = EnumCaster::<Sign>::new(HostNumber::DOUBLE).unwrap();
        assert!(matches!(
            caster.from_host(HostNumeric::F64(0.5)),
            Err(EnumCastError::NotIntegral { .. })
        ));
        assert!(matches!(
            caster.from_host(HostNumeric::F64(7.0)),
            Err(EnumCastError::UnknownDiscriminant { value: 7, .. })
        ));
    }

    #[test]
    fn per_constant_casts() {
        let single = HostNumber::Float(FloatRepr::Single);
        assert_eq!(
            cast_constant(Porridge::SuperfluidHelium, single).unwrap(),
            HostNumeric::F32(0.0)
        );
        assert!(cast_constant(Porridge::Goldilocks, single).is_err());
        assert!(cast_constant(Porridge::CookedInATokamak, single).is_err());

        assert_eq!(
            cast_constant(Porridge::Goldilocks, HostNumber::INT).unwrap(),
            HostNumeric::I32(i32::MAX)
        );
        assert!(cast_constant(Porridge::CookedInATokamak, HostNumber::INT).is_err());
    }
}
