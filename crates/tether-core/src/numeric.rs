//! Cast rules between native integer representations and host numbers.
//!
//! A host runtime stores every number in one native representation (an
//! integer type for some embeddings, a floating type for most). Before an enum
//! type or constant may cross the boundary, the pair `(source repr, host
//! number)` is classified here:
//!
//! - **Whole type, integral host**: `size(S) < size(N)`, or equal sizes with
//!   matching signedness.
//! - **Whole type, floating host**: `size(S) < size(N)`. This is conservative:
//!   it assumes every value of `S` needs the full bit width.
//! - **Per value, integral host**: `min(N) <= v <= max(N)`.
//! - **Per value, floating host**: `|v| <= max(uK)` with `K` = 16, 32 or 64 for
//!   single, double and extended precision.
//!
//! Both per-value rules bound `v` from below as well as above. An upper bound
//! alone would accept `-1` for an unsigned host number, where the stored value
//! reads back as `max(N)`.
//!
//! Every rule is a `const fn`, so the same gate is usable from
//! [`assert_enum_castable!`](crate::assert_enum_castable) at compile time and
//! from registration at run time. [`RuleTable`] caches whole-type verdicts per
//! pair so registration evaluates each pair once.

use std::fmt;

use rustc_hash::FxHashMap;

/// Integral representation underlying a native enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntRepr {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntRepr {
    /// Size in bytes.
    pub const fn size(self) -> usize {
        match self {
            IntRepr::I8 | IntRepr::U8 => 1,
            IntRepr::I16 | IntRepr::U16 => 2,
            IntRepr::I32 | IntRepr::U32 => 4,
            IntRepr::I64 | IntRepr::U64 => 8,
        }
    }

    /// Whether the representation is signed.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            IntRepr::I8 | IntRepr::I16 | IntRepr::I32 | IntRepr::I64
        )
    }

    /// Smallest representable value.
    pub const fn min(self) -> i128 {
        match self {
            IntRepr::I8 => i8::MIN as i128,
            IntRepr::I16 => i16::MIN as i128,
            IntRepr::I32 => i32::MIN as i128,
            IntRepr::I64 => i64::MIN as i128,
            IntRepr::U8 | IntRepr::U16 | IntRepr::U32 | IntRepr::U64 => 0,
        }
    }

    /// Largest representable value.
    pub const fn max(self) -> i128 {
        match self {
            IntRepr::I8 => i8::MAX as i128,
            IntRepr::I16 => i16::MAX as i128,
            IntRepr::I32 => i32::MAX as i128,
            IntRepr::I64 => i64::MAX as i128,
            IntRepr::U8 => u8::MAX as i128,
            IntRepr::U16 => u16::MAX as i128,
            IntRepr::U32 => u32::MAX as i128,
            IntRepr::U64 => u64::MAX as i128,
        }
    }

    /// Whether `value` lies in `[min, max]`.
    pub const fn contains(self, value: i128) -> bool {
        value >= self.min() && value <= self.max()
    }

    pub const fn name(self) -> &'static str {
        match self {
            IntRepr::I8 => "i8",
            IntRepr::I16 => "i16",
            IntRepr::I32 => "i32",
            IntRepr::I64 => "i64",
            IntRepr::U8 => "u8",
            IntRepr::U16 => "u16",
            IntRepr::U32 => "u32",
            IntRepr::U64 => "u64",
        }
    }
}

impl fmt::Display for IntRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Floating representation of a host number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatRepr {
    /// IEEE single precision.
    Single,
    /// IEEE double precision.
    Double,
    /// x87 extended precision (64-bit mantissa, 16-byte storage).
    Extended,
}

impl FloatRepr {
    /// Storage size in bytes.
    pub const fn size(self) -> usize {
        match self {
            FloatRepr::Single => 4,
            FloatRepr::Double => 8,
            FloatRepr::Extended => 16,
        }
    }

    /// Largest magnitude the per-value rule accepts: `max(u16)`, `max(u32)` or
    /// `max(u64)`.
    pub const fn exact_bound(self) -> i128 {
        match self {
            FloatRepr::Single => u16::MAX as i128,
            FloatRepr::Double => u32::MAX as i128,
            FloatRepr::Extended => u64::MAX as i128,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FloatRepr::Single => "f32",
            FloatRepr::Double => "f64",
            FloatRepr::Extended => "f80",
        }
    }
}

/// The host runtime's native number representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostNumber {
    Int(IntRepr),
    Float(FloatRepr),
}

impl HostNumber {
    /// Double precision, the usual choice of embedded scripting languages.
    pub const DOUBLE: HostNumber = HostNumber::Float(FloatRepr::Double);

    /// 32-bit signed integer, used for static class constants by some hosts.
    pub const INT: HostNumber = HostNumber::Int(IntRepr::I32);

    /// Storage size in bytes.
    pub const fn size(self) -> usize {
        match self {
            HostNumber::Int(repr) => repr.size(),
            HostNumber::Float(repr) => repr.size(),
        }
    }

    pub const fn is_integral(self) -> bool {
        matches!(self, HostNumber::Int(_))
    }

    pub const fn name(self) -> &'static str {
        match self {
            HostNumber::Int(repr) => repr.name(),
            HostNumber::Float(repr) => repr.name(),
        }
    }
}

impl Default for HostNumber {
    fn default() -> Self {
        HostNumber::DOUBLE
    }
}

impl fmt::Display for HostNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whole-type verdict for a `(source repr, host number)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastRule {
    /// Every value round-trips through the integral host number.
    Integral,
    /// Every value round-trips through the floating host number.
    Float,
    /// Some values of the source repr may not round-trip.
    Unsafe,
}

impl CastRule {
    pub const fn is_safe(self) -> bool {
        !matches!(self, CastRule::Unsafe)
    }
}

/// Verdict for one specific constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueVerdict {
    /// Accepted because the whole type is safe.
    WholeType(CastRule),
    /// Accepted by the per-value integral bound.
    Integral,
    /// Accepted by the per-value floating bound.
    Float,
    /// No rule accepts the value.
    Rejected,
}

impl ValueVerdict {
    pub const fn is_accepted(self) -> bool {
        !matches!(self, ValueVerdict::Rejected)
    }
}

/// Whole-type integral rule.
pub const fn is_integer_castable(src: IntRepr, dst: HostNumber) -> bool {
    match dst {
        HostNumber::Int(dst) => {
            src.size() < dst.size()
                || (src.size() == dst.size() && src.is_signed() == dst.is_signed())
        }
        HostNumber::Float(_) => false,
    }
}

/// Whole-type floating rule.
pub const fn is_float_castable(src: IntRepr, dst: HostNumber) -> bool {
    match dst {
        HostNumber::Float(dst) => src.size() < dst.size(),
        HostNumber::Int(_) => false,
    }
}

/// Classify a whole source type against a host number.
pub const fn whole_type_rule(src: IntRepr, dst: HostNumber) -> CastRule {
    if is_integer_castable(src, dst) {
        CastRule::Integral
    } else if is_float_castable(src, dst) {
        CastRule::Float
    } else {
        CastRule::Unsafe
    }
}

/// Per-value integral rule.
pub const fn is_value_integer_castable(value: i128, dst: HostNumber) -> bool {
    match dst {
        HostNumber::Int(dst) => dst.contains(value),
        HostNumber::Float(_) => false,
    }
}

/// Per-value floating rule.
pub const fn is_value_float_castable(value: i128, dst: HostNumber) -> bool {
    match dst {
        HostNumber::Float(dst) => value <= dst.exact_bound() && value >= -dst.exact_bound(),
        HostNumber::Int(_) => false,
    }
}

/// Classify one constant of repr `src` against a host number.
///
/// The whole-type rule is tried first, then the looser per-value rules. A value
/// outside `src`'s own range is always rejected.
pub const fn classify_value(src: IntRepr, value: i128, dst: HostNumber) -> ValueVerdict {
    if !src.contains(value) {
        return ValueVerdict::Rejected;
    }
    let rule = whole_type_rule(src, dst);
    if rule.is_safe() {
        ValueVerdict::WholeType(rule)
    } else if is_value_integer_castable(value, dst) {
        ValueVerdict::Integral
    } else if is_value_float_castable(value, dst) {
        ValueVerdict::Float
    } else {
        ValueVerdict::Rejected
    }
}

/// Cache of whole-type verdicts keyed by `(source repr, host number)`.
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: FxHashMap<(IntRepr, HostNumber), CastRule>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the verdict for a pair, evaluating it on first use.
    pub fn rule(&mut self, src: IntRepr, dst: HostNumber) -> CastRule {
        *self
            .rules
            .entry((src, dst))
            .or_insert_with(|| whole_type_rule(src, dst))
    }

    /// Number of pairs evaluated so far.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A number as stored by the host, typed by its [`HostNumber`].
///
/// `Extended` carries the exact integer, since every 64-bit integer is exactly
/// representable in an extended-precision float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostNumeric {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Extended(i128),
}

impl HostNumeric {
    /// Convert `value` with the host representation's native cast.
    ///
    /// This is the unchecked cast: callers classify the value first.
    #[allow(clippy::cast_possible_truncation)]
    pub fn cast(value: i128, host: HostNumber) -> Self {
        match host {
            HostNumber::Int(IntRepr::I8) => HostNumeric::I8(value as i8),
            HostNumber::Int(IntRepr::I16) => HostNumeric::I16(value as i16),
            HostNumber::Int(IntRepr::I32) => HostNumeric::I32(value as i32),
            HostNumber::Int(IntRepr::I64) => HostNumeric::I64(value as i64),
            HostNumber::Int(IntRepr::U8) => HostNumeric::U8(value as u8),
            HostNumber::Int(IntRepr::U16) => HostNumeric::U16(value as u16),
            HostNumber::Int(IntRepr::U32) => HostNumeric::U32(value as u32),
            HostNumber::Int(IntRepr::U64) => HostNumeric::U64(value as u64),
            HostNumber::Float(FloatRepr::Single) => HostNumeric::F32(value as f32),
            HostNumber::Float(FloatRepr::Double) => HostNumeric::F64(value as f64),
            HostNumber::Float(FloatRepr::Extended) => HostNumeric::Extended(value),
        }
    }

    /// Read the value back as an exact integer.
    ///
    /// Returns `None` for non-integral or out-of-range floats.
    pub fn to_i128(self) -> Option<i128> {
        match self {
            HostNumeric::I8(v) => Some(v.into()),
            HostNumeric::I16(v) => Some(v.into()),
            HostNumeric::I32(v) => Some(v.into()),
            HostNumeric::I64(v) => Some(v.into()),
            HostNumeric::U8(v) => Some(v.into()),
            HostNumeric::U16(v) => Some(v.into()),
            HostNumeric::U32(v) => Some(v.into()),
            HostNumeric::U64(v) => Some(v.into()),
            HostNumeric::F32(v) => float_to_i128(f64::from(v)),
            HostNumeric::F64(v) => float_to_i128(v),
            HostNumeric::Extended(v) => Some(v),
        }
    }

    /// The host representation this number is stored in.
    pub fn host_number(self) -> HostNumber {
        match self {
            HostNumeric::I8(_) => HostNumber::Int(IntRepr::I8),
            HostNumeric::I16(_) => HostNumber::Int(IntRepr::I16),
            HostNumeric::I32(_) => HostNumber::Int(IntRepr::I32),
            HostNumeric::I64(_) => HostNumber::Int(IntRepr::I64),
            HostNumeric::U8(_) => HostNumber::Int(IntRepr::U8),
            HostNumeric::U16(_) => HostNumber::Int(IntRepr::U16),
            HostNumeric::U32(_) => HostNumber::Int(IntRepr::U32),
            HostNumeric::U64(_) => HostNumber::Int(IntRepr::U64),
            HostNumeric::F32(_) => HostNumber::Float(FloatRepr::Single),
            HostNumeric::F64(_) => HostNumber::Float(FloatRepr::Double),
            HostNumeric::Extended(_) => HostNumber::Float(FloatRepr::Extended),
        }
    }
}

impl fmt::Display for HostNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostNumeric::I8(v) => write!(f, "{v}"),
            HostNumeric::I16(v) => write!(f, "{v}"),
            HostNumeric::I32(v) => write!(f, "{v}"),
            HostNumeric::I64(v) => write!(f, "{v}"),
            HostNumeric::U8(v) => write!(f, "{v}"),
            HostNumeric::U16(v) => write!(f, "{v}"),
            HostNumeric::U32(v) => write!(f, "{v}"),
            HostNumeric::U64(v) => write!(f, "{v}"),
            HostNumeric::F32(v) => write!(f, "{v}"),
            HostNumeric::F64(v) => write!(f, "{v}"),
            HostNumeric::Extended(v) => write!(f, "{v}"),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_i128(value: f64) -> Option<i128> {
    // 2^127: anything at or beyond this saturates the cast.
    const LIMIT: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;
    if value.is_finite() && value.trunc() == value && value.abs() < LIMIT {
        Some(value as i128)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INT: HostNumber = HostNumber::INT;
    const DOUBLE: HostNumber = HostNumber::DOUBLE;
    const SINGLE: HostNumber = HostNumber::Float(FloatRepr::Single);

    // Constants of a `porridge` enum instantiated over several reprs: zero,
    // i32::MAX, and the repr's own maximum.
    fn porridge(repr: IntRepr) -> [i128; 3] {
        [0, i32::MAX as i128, repr.max()]
    }

    fn accepted(repr: IntRepr, value: i128, host: HostNumber) -> bool {
        classify_value(repr, value, host).is_accepted()
    }

    #[test]
    fn whole_type_against_int() {
        assert!(whole_type_rule(IntRepr::I32, INT).is_safe());
        assert!(!whole_type_rule(IntRepr::U32, INT).is_safe());
        assert!(!whole_type_rule(IntRepr::I64, INT).is_safe());
        assert!(!whole_type_rule(IntRepr::U64, INT).is_safe());
        assert!(whole_type_rule(IntRepr::U16, INT).is_safe());
        assert_eq!(whole_type_rule(IntRepr::I8, INT), CastRule::Integral);
    }

    #[test]
    fn whole_type_against_double() {
        assert_eq!(whole_type_rule(IntRepr::I32, DOUBLE), CastRule::Float);
        assert_eq!(whole_type_rule(IntRepr::U32, DOUBLE), CastRule::Float);
        assert_eq!(whole_type_rule(IntRepr::I64, DOUBLE), CastRule::Unsafe);
        assert_eq!(whole_type_rule(IntRepr::U64, DOUBLE), CastRule::Unsafe);
    }

    #[test]
    fn per_value_against_int() {
        let [zero, goldilocks, max] = porridge(IntRepr::U32);
        assert!(accepted(IntRepr::U32, zero, INT));
        assert!(accepted(IntRepr::U32, goldilocks, INT));
        assert!(!accepted(IntRepr::U32, max, INT));

        for repr in [IntRepr::I64, IntRepr::U64] {
            let [zero, goldilocks, max] = porridge(repr);
            assert!(accepted(repr, zero, INT));
            assert!(accepted(repr, goldilocks, INT));
            assert!(!accepted(repr, max, INT), "{repr} max must not fit in int");
        }
    }

    #[test]
    fn per_value_against_double() {
        for value in porridge(IntRepr::U32) {
            assert_eq!(
                classify_value(IntRepr::U32, value, DOUBLE),
                ValueVerdict::WholeType(CastRule::Float)
            );
        }
        for repr in [IntRepr::I64, IntRepr::U64] {
            let [zero, goldilocks, max] = porridge(repr);
            assert_eq!(classify_value(repr, zero, DOUBLE), ValueVerdict::Float);
            assert_eq!(classify_value(repr, goldilocks, DOUBLE), ValueVerdict::Float);
            assert_eq!(classify_value(repr, max, DOUBLE), ValueVerdict::Rejected);
        }
    }

    #[test]
    fn u64_against_single_precision() {
        assert!(!whole_type_rule(IntRepr::U64, SINGLE).is_safe());
        assert!(accepted(IntRepr::U64, 0, SINGLE));
        assert!(accepted(IntRepr::U64, u16::MAX as i128, SINGLE));
        assert!(!accepted(IntRepr::U64, u16::MAX as i128 + 1, SINGLE));
        assert!(!accepted(IntRepr::U64, u64::MAX as i128, SINGLE));
    }

    #[test]
    fn extended_precision_holds_all_64_bit_values() {
        let extended = HostNumber::Float(FloatRepr::Extended);
        assert!(whole_type_rule(IntRepr::U64, extended).is_safe());
        assert!(whole_type_rule(IntRepr::I64, extended).is_safe());
    }

    #[test]
    fn negative_values_need_lower_bound() {
        let unsigned = HostNumber::Int(IntRepr::U32);
        assert!(!accepted(IntRepr::I64, -1, unsigned));
        // What an upper bound alone would let through.
        assert_eq!(HostNumeric::cast(-1, unsigned).to_i128(), Some(u32::MAX as i128));
        assert!(accepted(IntRepr::I64, -1, INT));
        assert!(accepted(IntRepr::I64, -70, SINGLE));
        assert!(!accepted(IntRepr::I64, -70_000, SINGLE));
    }

    #[test]
    fn value_outside_source_repr_is_rejected() {
        assert!(!accepted(IntRepr::U8, 256, DOUBLE));
        assert!(!accepted(IntRepr::U8, -1, DOUBLE));
    }

    #[test]
    fn rule_table_caches_pairs() {
        let mut table = RuleTable::new();
        assert!(table.is_empty());
        assert_eq!(table.rule(IntRepr::U64, SINGLE), CastRule::Unsafe);
        assert_eq!(table.rule(IntRepr::U64, SINGLE), CastRule::Unsafe);
        assert_eq!(table.rule(IntRepr::I16, SINGLE), CastRule::Float);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn accepted_values_round_trip() {
        let cases = [
            (IntRepr::U32, u32::MAX as i128, DOUBLE),
            (IntRepr::I64, i32::MAX as i128, DOUBLE),
            (IntRepr::U64, 0, SINGLE),
            (IntRepr::U64, u16::MAX as i128, SINGLE),
            (IntRepr::U64, u64::MAX as i128, HostNumber::Int(IntRepr::U64)),
            (IntRepr::I64, -5, INT),
            (IntRepr::I64, i64::MIN as i128, HostNumber::Float(FloatRepr::Extended)),
        ];
        for (repr, value, host) in cases {
            assert!(accepted(repr, value, host));
            let stored = HostNumeric::cast(value, host);
            assert_eq!(stored.host_number(), host);
            assert_eq!(stored.to_i128(), Some(value), "{value} via {host}");
        }
    }

    #[test]
    fn non_integral_float_does_not_read_back() {
        assert_eq!(HostNumeric::F64(1.5).to_i128(), None);
        assert_eq!(HostNumeric::F64(f64::NAN).to_i128(), None);
        assert_eq!(HostNumeric::F32(-3.0).to_i128(), Some(-3));
    }
}
