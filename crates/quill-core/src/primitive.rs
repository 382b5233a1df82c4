//! The primitive type system.
//!
//! Every value the compiler reasons about has a [`PrimitiveType`]. The two
//! generic placeholders are the types of literals before they meet a
//! concrete context: `5` is a [`PrimitiveType::GenericNumber`] until it is
//! assigned to an `u8`, at which point it becomes an `u8` constant.
//!
//! ## Ranges
//!
//! Integer bounds are carried as `i128` so that `u64::MAX` and `i64::MIN`
//! both fit. `u128::MAX` does not, and saturates to `i128::MAX`.

use std::fmt;
use std::str::FromStr;

/// Coarse classification used by coercion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    IntegerNumeric,
    FloatingNumeric,
    Boolean,
    Character,
    Pointer,
}

/// A primitive value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Void,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Bool,
    Char,
    Str,
    Ptr,
    /// Type of an integer literal without context.
    GenericNumber,
    /// Type of a floating literal without context.
    GenericFloating,
}

impl PrimitiveType {
    /// Every type a declaration may name.
    pub const CONCRETE: [PrimitiveType; 17] = [
        PrimitiveType::Void,
        PrimitiveType::I8,
        PrimitiveType::I16,
        PrimitiveType::I32,
        PrimitiveType::I64,
        PrimitiveType::I128,
        PrimitiveType::U8,
        PrimitiveType::U16,
        PrimitiveType::U32,
        PrimitiveType::U64,
        PrimitiveType::U128,
        PrimitiveType::F32,
        PrimitiveType::F64,
        PrimitiveType::Bool,
        PrimitiveType::Char,
        PrimitiveType::Str,
        PrimitiveType::Ptr,
    ];

    /// Concrete numeric types, integers first.
    pub const NUMERIC: [PrimitiveType; 12] = [
        PrimitiveType::I8,
        PrimitiveType::I16,
        PrimitiveType::I32,
        PrimitiveType::I64,
        PrimitiveType::I128,
        PrimitiveType::U8,
        PrimitiveType::U16,
        PrimitiveType::U32,
        PrimitiveType::U64,
        PrimitiveType::U128,
        PrimitiveType::F32,
        PrimitiveType::F64,
    ];

    /// Short tag used in IL text and global references.
    pub fn tag(self) -> &'static str {
        match self {
            PrimitiveType::Void => "void",
            PrimitiveType::I8 => "i8",
            PrimitiveType::I16 => "i16",
            PrimitiveType::I32 => "i32",
            PrimitiveType::I64 => "i64",
            PrimitiveType::I128 => "i128",
            PrimitiveType::U8 => "u8",
            PrimitiveType::U16 => "u16",
            PrimitiveType::U32 => "u32",
            PrimitiveType::U64 => "u64",
            PrimitiveType::U128 => "u128",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Char => "char",
            PrimitiveType::Str => "str",
            PrimitiveType::Ptr => "ptr",
            PrimitiveType::GenericNumber => "number",
            PrimitiveType::GenericFloating => "floating",
        }
    }

    /// Storage size in bytes.
    ///
    /// `str` and `ptr` are pointers on the 32-bit register target.
    pub fn size(self) -> u32 {
        match self {
            PrimitiveType::Bool | PrimitiveType::I8 | PrimitiveType::U8 => 1,
            PrimitiveType::I16 | PrimitiveType::U16 => 2,
            PrimitiveType::I32
            | PrimitiveType::U32
            | PrimitiveType::F32
            | PrimitiveType::Char
            | PrimitiveType::Str
            | PrimitiveType::Ptr => 4,
            PrimitiveType::I64 | PrimitiveType::U64 | PrimitiveType::F64 => 8,
            PrimitiveType::I128 | PrimitiveType::U128 => 16,
            PrimitiveType::Void | PrimitiveType::GenericNumber | PrimitiveType::GenericFloating => 0,
        }
    }

    pub fn kind(self) -> PrimitiveKind {
        match self {
            PrimitiveType::I8
            | PrimitiveType::I16
            | PrimitiveType::I32
            | PrimitiveType::I64
            | PrimitiveType::I128
            | PrimitiveType::U8
            | PrimitiveType::U16
            | PrimitiveType::U32
            | PrimitiveType::U64
            | PrimitiveType::U128
            | PrimitiveType::GenericNumber => PrimitiveKind::IntegerNumeric,
            PrimitiveType::F32 | PrimitiveType::F64 | PrimitiveType::GenericFloating => {
                PrimitiveKind::FloatingNumeric
            }
            PrimitiveType::Bool => PrimitiveKind::Boolean,
            PrimitiveType::Char => PrimitiveKind::Character,
            PrimitiveType::Void | PrimitiveType::Str | PrimitiveType::Ptr => PrimitiveKind::Pointer,
        }
    }

    /// Smallest representable value; zero for non-integers and generics.
    pub fn min_value(self) -> i128 {
        match self {
            PrimitiveType::I8 => i8::MIN as i128,
            PrimitiveType::I16 => i16::MIN as i128,
            PrimitiveType::I32 => i32::MIN as i128,
            PrimitiveType::I64 => i64::MIN as i128,
            PrimitiveType::I128 => i128::MIN,
            _ => 0,
        }
    }

    /// Largest representable value; zero for non-integers and generics.
    pub fn max_value(self) -> i128 {
        match self {
            PrimitiveType::I8 => i8::MAX as i128,
            PrimitiveType::I16 => i16::MAX as i128,
            PrimitiveType::I32 => i32::MAX as i128,
            PrimitiveType::I64 => i64::MAX as i128,
            PrimitiveType::I128 => i128::MAX,
            PrimitiveType::U8 => u8::MAX as i128,
            PrimitiveType::U16 => u16::MAX as i128,
            PrimitiveType::U32 => u32::MAX as i128,
            PrimitiveType::U64 => u64::MAX as i128,
            PrimitiveType::U128 => i128::MAX,
            _ => 0,
        }
    }

    #[inline]
    pub fn is_generic(self) -> bool {
        matches!(self, PrimitiveType::GenericNumber | PrimitiveType::GenericFloating)
    }

    #[inline]
    pub fn is_integer(self) -> bool {
        self.kind() == PrimitiveKind::IntegerNumeric
    }

    #[inline]
    pub fn is_floating(self) -> bool {
        self.kind() == PrimitiveKind::FloatingNumeric
    }

    #[inline]
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_floating()
    }

    /// Whether negative values are representable.
    pub fn is_signed(self) -> bool {
        match self {
            PrimitiveType::I8
            | PrimitiveType::I16
            | PrimitiveType::I32
            | PrimitiveType::I64
            | PrimitiveType::I128 => true,
            _ => self.is_floating(),
        }
    }

    /// Whether `[min, max]` of `self` lies inside that of `other`.
    pub fn range_within(self, other: PrimitiveType) -> bool {
        other.min_value() <= self.min_value() && self.max_value() <= other.max_value()
    }

    /// Whether a value of `self` may be used where `target` is expected
    /// without an explicit cast.
    pub fn is_assignable_to(self, target: PrimitiveType) -> bool {
        if self == target {
            return true;
        }
        match (self.kind(), target.kind()) {
            (PrimitiveKind::IntegerNumeric, PrimitiveKind::IntegerNumeric) => {
                self.range_within(target)
            }
            (PrimitiveKind::IntegerNumeric, PrimitiveKind::FloatingNumeric) => true,
            (PrimitiveKind::FloatingNumeric, PrimitiveKind::FloatingNumeric) => {
                self.is_generic() || target.is_generic() || target.size() >= self.size()
            }
            _ => false,
        }
    }

    /// Ordering used when neither of two numeric types contains the other:
    /// floats outrank integers, then wider outranks narrower, then unsigned
    /// outranks signed.
    pub fn rank(self) -> (u8, u32, u8) {
        let kind = if self.is_floating() { 1 } else { 0 };
        let unsigned = if self.is_signed() { 0 } else { 1 };
        (kind, self.size(), unsigned)
    }

    /// Concrete type a literal of this type takes when nothing constrains it.
    pub fn concrete(self) -> PrimitiveType {
        match self {
            PrimitiveType::GenericNumber => PrimitiveType::I32,
            PrimitiveType::GenericFloating => PrimitiveType::F64,
            other => other,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Returned by [`PrimitiveType::from_str`] for an unknown tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown primitive type tag '{0}'")]
pub struct UnknownPrimitive(pub String);

impl FromStr for PrimitiveType {
    type Err = UnknownPrimitive;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Self::CONCRETE
            .iter()
            .chain([PrimitiveType::GenericNumber, PrimitiveType::GenericFloating].iter())
            .copied()
            .find(|ty| ty.tag() == tag)
            .ok_or_else(|| UnknownPrimitive(tag.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_storage_widths() {
        assert_eq!(PrimitiveType::Bool.size(), 1);
        assert_eq!(PrimitiveType::U16.size(), 2);
        assert_eq!(PrimitiveType::Char.size(), 4);
        assert_eq!(PrimitiveType::F64.size(), 8);
        assert_eq!(PrimitiveType::U128.size(), 16);
        assert_eq!(PrimitiveType::Void.size(), 0);
    }

    #[test]
    fn ranges_cover_unsigned_64() {
        assert_eq!(PrimitiveType::U64.max_value(), 18_446_744_073_709_551_615);
        assert_eq!(PrimitiveType::I64.min_value(), -9_223_372_036_854_775_808);
        assert_eq!(PrimitiveType::U8.min_value(), 0);
        assert_eq!(PrimitiveType::F32.max_value(), 0);
    }

    #[test]
    fn tags_parse_back() {
        for ty in PrimitiveType::CONCRETE {
            assert_eq!(ty.tag().parse::<PrimitiveType>(), Ok(ty));
        }
        assert!("int".parse::<PrimitiveType>().is_err());
    }

    #[test]
    fn integers_widen_but_do_not_narrow() {
        assert!(PrimitiveType::U8.is_assignable_to(PrimitiveType::I16));
        assert!(PrimitiveType::I16.is_assignable_to(PrimitiveType::I64));
        assert!(!PrimitiveType::I64.is_assignable_to(PrimitiveType::I32));
        assert!(!PrimitiveType::I8.is_assignable_to(PrimitiveType::U64));
    }

    #[test]
    fn floats_accept_integers_but_not_the_reverse() {
        assert!(PrimitiveType::I64.is_assignable_to(PrimitiveType::F32));
        assert!(!PrimitiveType::F32.is_assignable_to(PrimitiveType::I64));
        assert!(PrimitiveType::F32.is_assignable_to(PrimitiveType::F64));
        assert!(!PrimitiveType::F64.is_assignable_to(PrimitiveType::F32));
    }

    #[test]
    fn generic_number_fits_any_numeric() {
        for ty in PrimitiveType::NUMERIC {
            assert!(PrimitiveType::GenericNumber.is_assignable_to(ty), "{ty}");
        }
        assert!(!PrimitiveType::GenericFloating.is_assignable_to(PrimitiveType::I32));
        assert!(!PrimitiveType::GenericNumber.is_assignable_to(PrimitiveType::Bool));
    }

    #[test]
    fn coercion_is_never_mutual_between_distinct_numerics() {
        for a in PrimitiveType::NUMERIC {
            for b in PrimitiveType::NUMERIC {
                if a != b && a.is_assignable_to(b) {
                    assert!(!b.is_assignable_to(a), "{a} <-> {b}");
                }
            }
        }
    }

    #[test]
    fn non_numeric_types_only_accept_themselves() {
        assert!(PrimitiveType::Str.is_assignable_to(PrimitiveType::Str));
        assert!(!PrimitiveType::Str.is_assignable_to(PrimitiveType::Ptr));
        assert!(!PrimitiveType::Bool.is_assignable_to(PrimitiveType::I32));
        assert!(!PrimitiveType::Char.is_assignable_to(PrimitiveType::U32));
    }

    #[test]
    fn rank_prefers_float_then_width_then_unsigned() {
        assert!(PrimitiveType::F32.rank() > PrimitiveType::I64.rank());
        assert!(PrimitiveType::I64.rank() > PrimitiveType::U32.rank());
        assert!(PrimitiveType::U32.rank() > PrimitiveType::I32.rank());
    }
}
