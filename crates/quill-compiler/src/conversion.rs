//! Implicit conversions between primitive types.
//!
//! Only conversions that [`PrimitiveType::is_assignable_to`] allows exist
//! here. Each carries a cost so that overload resolution can prefer the
//! candidate that needs the least coercion.
//!
//! ## Conversion Priority
//!
//! 1. Identity
//! 2. Literal fit (a generic literal taking a concrete type)
//! 3. Widening within integers or within floats
//! 4. Integer to float

use quill_core::{EvaluationError, PrimitiveType, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    Identity,
    LiteralFit,
    Widening,
    IntegerToFloat,
}

/// An implicit conversion and its cost (lower is better).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub kind: ConversionKind,
    pub cost: u32,
}

impl Conversion {
    pub const COST_IDENTITY: u32 = 0;
    pub const COST_LITERAL_FIT: u32 = 1;
    pub const COST_WIDENING: u32 = 2;
    pub const COST_INT_TO_FLOAT: u32 = 3;

    fn new(kind: ConversionKind, cost: u32) -> Self {
        Self { kind, cost }
    }

    pub fn is_exact(&self) -> bool {
        self.kind == ConversionKind::Identity
    }
}

/// The implicit conversion from `from` to `to`, if one exists.
pub fn find_conversion(from: PrimitiveType, to: PrimitiveType) -> Option<Conversion> {
    if from == to {
        return Some(Conversion::new(ConversionKind::Identity, Conversion::COST_IDENTITY));
    }
    if !from.is_assignable_to(to) {
        return None;
    }
    let conversion = if from.is_generic() && from.kind() == to.kind() {
        Conversion::new(ConversionKind::LiteralFit, Conversion::COST_LITERAL_FIT)
    } else if from.is_integer() && to.is_floating() {
        Conversion::new(ConversionKind::IntegerToFloat, Conversion::COST_INT_TO_FLOAT)
    } else {
        Conversion::new(ConversionKind::Widening, Conversion::COST_WIDENING)
    };
    Some(conversion)
}

/// The type both operands of a binary operator are brought to.
///
/// - Equal types need nothing.
/// - A generic literal takes the other side's concrete numeric type; two
///   generics give the floating one if either is floating.
/// - Otherwise the type whose range contains the other wins, and when
///   neither does the higher [`PrimitiveType::rank`] wins.
/// - Non-numeric mismatches have no common type.
pub fn common_type(
    left: PrimitiveType,
    right: PrimitiveType,
    span: Span,
) -> Result<PrimitiveType, EvaluationError> {
    if left == right {
        return Ok(left);
    }
    if !left.is_numeric() || !right.is_numeric() {
        return Err(EvaluationError::NoCommonType { left, right, span });
    }
    let ty = match (left.is_generic(), right.is_generic()) {
        (true, true) => PrimitiveType::GenericFloating,
        (true, false) => generic_against(left, right),
        (false, true) => generic_against(right, left),
        (false, false) => {
            if left.is_assignable_to(right) {
                right
            } else if right.is_assignable_to(left) {
                left
            } else if left.rank() >= right.rank() {
                left
            } else {
                right
            }
        }
    };
    Ok(ty)
}

fn generic_against(generic: PrimitiveType, concrete: PrimitiveType) -> PrimitiveType {
    if generic.is_floating() && concrete.is_integer() {
        PrimitiveType::F64
    } else {
        concrete
    }
}
