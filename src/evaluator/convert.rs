//! Numeric promotion and value conversion.

use std::sync::Arc;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::errors::{ScriptError, ScriptResult};

use super::types::TypeTag;
use super::value::{TypedValue, Value};

/// Common type of two numeric operands for arithmetic, comparison and bitwise
/// operators, or None when the pair cannot be mixed.
///
/// Order of preference: decimal, double, float, ulong, long, uint, int.
/// Decimal never mixes with float or double, and ulong never mixes with a
/// signed type.
pub fn promote(left: &TypeTag, right: &TypeTag) -> Option<TypeTag> {
    if !left.is_numeric() || !right.is_numeric() {
        return None;
    }
    let either = |ty: TypeTag| *left == ty || *right == ty;
    let other = |ty: TypeTag| if *left == ty { right } else { left };

    if either(TypeTag::Decimal) {
        let other = other(TypeTag::Decimal);
        return (!matches!(other, TypeTag::Float | TypeTag::Double)).then_some(TypeTag::Decimal);
    }
    if either(TypeTag::Double) {
        return Some(TypeTag::Double);
    }
    if either(TypeTag::Float) {
        return Some(TypeTag::Float);
    }
    if either(TypeTag::ULong) {
        let other = other(TypeTag::ULong);
        return (!(other.is_small_signed() || *other == TypeTag::Long)).then_some(TypeTag::ULong);
    }
    if either(TypeTag::Long) {
        return Some(TypeTag::Long);
    }
    if either(TypeTag::UInt) {
        let other = other(TypeTag::UInt);
        return Some(if other.is_small_signed() {
            TypeTag::Long
        } else {
            TypeTag::UInt
        });
    }
    Some(TypeTag::Int)
}

/// Promotion applied to a single operand (unary operators, shift operands):
/// types narrower than int become int
pub fn promote_unary(ty: &TypeTag) -> Option<TypeTag> {
    match ty {
        TypeTag::Char | TypeTag::SByte | TypeTag::Byte | TypeTag::Short | TypeTag::UShort => {
            Some(TypeTag::Int)
        }
        other if other.is_numeric() => Some(other.clone()),
        _ => None,
    }
}

/// Whether an implicit numeric conversion from `from` to `to` exists
pub fn is_implicit_numeric(from: &TypeTag, to: &TypeTag) -> bool {
    use TypeTag::*;
    if from == to {
        return true;
    }
    match from {
        SByte => matches!(to, Short | Int | Long | Float | Double | Decimal),
        Byte => matches!(
            to,
            Short | UShort | Int | UInt | Long | ULong | Float | Double | Decimal
        ),
        Short => matches!(to, Int | Long | Float | Double | Decimal),
        UShort | Char => matches!(
            to,
            Int | UInt | Long | ULong | Float | Double | Decimal
        ) || (*from == Char && *to == UShort),
        Int => matches!(to, Long | Float | Double | Decimal),
        UInt => matches!(to, Long | ULong | Float | Double | Decimal),
        Long | ULong => matches!(to, Float | Double | Decimal),
        Float => matches!(to, Double),
        _ => false,
    }
}

/// Convert a numeric payload to another numeric kind with cast semantics:
/// integers wrap, floating point truncates toward zero
pub fn convert_numeric(value: &Value, to: &TypeTag) -> Option<Value> {
    if let Some(n) = value.as_i128() {
        return Some(match to {
            TypeTag::Char => Value::Char(char::from_u32(n as u16 as u32).unwrap_or('\u{fffd}')),
            TypeTag::SByte => Value::SByte(n as i8),
            TypeTag::Byte => Value::Byte(n as u8),
            TypeTag::Short => Value::Short(n as i16),
            TypeTag::UShort => Value::UShort(n as u16),
            TypeTag::Int => Value::Int(n as i32),
            TypeTag::UInt => Value::UInt(n as u32),
            TypeTag::Long => Value::Long(n as i64),
            TypeTag::ULong => Value::ULong(n as u64),
            TypeTag::Float => Value::Float(n as f32),
            TypeTag::Double => Value::Double(n as f64),
            TypeTag::Decimal => Value::Decimal(Decimal::from_i128_with_scale(n, 0)),
            _ => return None,
        });
    }

    if let Value::Decimal(d) = value {
        return Some(match to {
            TypeTag::Decimal => Value::Decimal(*d),
            TypeTag::Float => Value::Float(d.to_f32()?),
            TypeTag::Double => Value::Double(d.to_f64()?),
            integral if integral.is_integral() => {
                let n = d.trunc().to_i128()?;
                return convert_numeric(&Value::Long(n as i64), integral);
            }
            _ => return None,
        });
    }

    let f = match value {
        Value::Float(f) => *f as f64,
        Value::Double(f) => *f,
        _ => return None,
    };
    Some(match to {
        TypeTag::Float => Value::Float(f as f32),
        TypeTag::Double => Value::Double(f),
        TypeTag::Decimal => Value::Decimal(Decimal::from_f64(f)?),
        TypeTag::ULong => Value::ULong(f as u64),
        TypeTag::UInt => Value::UInt(f as i64 as u32),
        integral if integral.is_integral() => {
            return convert_numeric(&Value::Long(f as i64), integral);
        }
        _ => return None,
    })
}

/// Implicitly convert `value` so it can be stored as `to`, or None if no
/// implicit conversion exists
pub fn convert_implicit(value: &TypedValue, to: &TypeTag) -> Option<TypedValue> {
    if value.is_null() {
        return (!to.is_value_type() || to.is_nullable()).then(|| TypedValue::null_of(to.clone()));
    }

    let from = value.ty.strip_nullable();
    let target = to.strip_nullable();

    if target.is_assignable_from(from) {
        return Some(TypedValue::new(value.value.clone(), to.clone()));
    }
    if from.is_numeric() && target.is_numeric() && is_implicit_numeric(from, target) {
        let converted = convert_numeric(&value.value, target)?;
        return Some(TypedValue::new(converted, to.clone()));
    }
    None
}

/// Explicit cast `(T)value`
pub fn convert_explicit(value: &TypedValue, to: &TypeTag) -> ScriptResult<TypedValue> {
    if value.is_null() {
        if to.is_value_type() && !to.is_nullable() {
            return Err(ScriptError::null_reference(format!(
                "cannot cast null to non-nullable type '{}'",
                to
            )));
        }
        return Ok(TypedValue::null_of(to.clone()));
    }

    let target = to.strip_nullable();
    let from = value.ty.strip_nullable();

    if target.is_numeric() && from.is_numeric() {
        if let Some(converted) = convert_numeric(&value.value, target) {
            return Ok(TypedValue::new(converted, to.clone()));
        }
    }
    if *target == TypeTag::String {
        if let Value::String(_) = value.value {
            return Ok(TypedValue::new(value.value.clone(), to.clone()));
        }
        if let Value::Char(c) = value.value {
            return Ok(TypedValue::of(Value::String(Arc::from(c.to_string()))));
        }
    }
    if target.is_assignable_from(&value.value.runtime_type()) {
        return Ok(TypedValue::new(value.value.clone(), to.clone()));
    }
    Err(ScriptError::illegal_operands(
        format!("({})", to),
        format!("a value of type '{}'", value.ty),
    ))
}

/// Read an integral index argument; only int-like kinds qualify
pub fn index_argument(value: &TypedValue) -> ScriptResult<i64> {
    let ty = value.ty.strip_nullable();
    let allowed = matches!(
        ty,
        TypeTag::Int | TypeTag::Long | TypeTag::Short | TypeTag::UShort
    );
    match value.value.as_i128() {
        Some(n) if allowed => Ok(n as i64),
        _ => Err(ScriptError::bad_argument(format!(
            "array index must be an integral value, got '{}'",
            value.ty
        ))),
    }
}
