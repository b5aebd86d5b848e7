//! Binary and unary operator dispatch.
//!
//! The [`OperatorTable`] is built once and never mutated afterwards. Binary
//! operators are resolved in this order:
//!
//! 1. `==`/`!=` with a null operand compare values directly
//! 2. an entry for the exact operand pair
//! 3. a wildcard entry (string concatenation with any value)
//! 4. an entry for the numerically promoted pair
//! 5. an overload method (`op_Addition`, ...) on the left operand's host type
//! 6. for `==`/`!=`, value equality
//!
//! If a nullable operand was involved and a value is null, a matched entry
//! yields a null of the nullable result type instead of computing.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use rust_decimal::Decimal;

use crate::context::{Context, StringComparison};
use crate::errors::{ScriptError, ScriptResult};
use crate::parser::ast::BinaryOp;

use super::binder;
use super::convert::{convert_numeric, promote, promote_unary};
use super::host::MemberKind;
use super::types::TypeTag;
use super::value::{TypedValue, Value};

type ComputeFn = fn(BinaryOp, &Value, &Value, &Context) -> ScriptResult<Value>;

/// One `(left, right) -> result` implementation of an operator
#[derive(Clone)]
struct OperatorEntry {
    result: TypeTag,
    compute: ComputeFn,
}

/// Which side of a wildcard entry must have the fixed type
#[derive(Clone, Copy, PartialEq, Eq)]
enum Wildcard {
    Left,
    Right,
}

#[derive(Clone)]
struct WildcardEntry {
    fixed: TypeTag,
    side: Wildcard,
    entry: OperatorEntry,
}

/// Host method names used for operator overloads
#[derive(Debug, Clone)]
pub struct OverloadNames(HashMap<BinaryOp, String>);

impl OverloadNames {
    pub fn get(&self, op: BinaryOp) -> Option<&str> {
        self.0.get(&op).map(String::as_str)
    }

    pub fn set(&mut self, op: BinaryOp, name: impl Into<String>) {
        self.0.insert(op, name.into());
    }
}

impl Default for OverloadNames {
    fn default() -> Self {
        use BinaryOp::*;
        let names = [
            (Add, "op_Addition"),
            (Sub, "op_Subtraction"),
            (Mul, "op_Multiply"),
            (Div, "op_Division"),
            (Rem, "op_Modulus"),
            (Shl, "op_LeftShift"),
            (Shr, "op_RightShift"),
            (Eq, "op_Equality"),
            (Ne, "op_Inequality"),
            (Lt, "op_LessThan"),
            (Gt, "op_GreaterThan"),
            (Le, "op_LessThanOrEqual"),
            (Ge, "op_GreaterThanOrEqual"),
            (BitAnd, "op_BitwiseAnd"),
            (BitOr, "op_BitwiseOr"),
            (BitXor, "op_ExclusiveOr"),
        ];
        OverloadNames(
            names
                .into_iter()
                .map(|(op, name)| (op, name.to_string()))
                .collect(),
        )
    }
}

static STANDARD: LazyLock<Arc<OperatorTable>> = LazyLock::new(|| Arc::new(OperatorTable::new()));

/// Immutable operator dispatch table
#[derive(Clone)]
pub struct OperatorTable {
    exact: HashMap<(BinaryOp, TypeTag, TypeTag), OperatorEntry>,
    wildcard: HashMap<BinaryOp, Vec<WildcardEntry>>,
    overload_names: OverloadNames,
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::new()
    }
}

const ARITHMETIC: [BinaryOp; 5] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::Rem,
];
const COMPARISON: [BinaryOp; 4] = [BinaryOp::Lt, BinaryOp::Gt, BinaryOp::Le, BinaryOp::Ge];
const EQUALITY: [BinaryOp; 2] = [BinaryOp::Eq, BinaryOp::Ne];
const BITWISE: [BinaryOp; 3] = [BinaryOp::BitAnd, BinaryOp::BitOr, BinaryOp::BitXor];
const SHIFT: [BinaryOp; 2] = [BinaryOp::Shl, BinaryOp::Shr];

impl OperatorTable {
    /// The shared default table
    pub fn standard() -> Arc<OperatorTable> {
        Arc::clone(&STANDARD)
    }

    pub fn new() -> Self {
        let mut table = OperatorTable {
            exact: HashMap::new(),
            wildcard: HashMap::new(),
            overload_names: OverloadNames::default(),
        };

        let numeric: [(TypeTag, ComputeFn, bool); 7] = [
            (TypeTag::Int, int_op, true),
            (TypeTag::UInt, uint_op, true),
            (TypeTag::Long, long_op, true),
            (TypeTag::ULong, ulong_op, true),
            (TypeTag::Float, float_op, false),
            (TypeTag::Double, double_op, false),
            (TypeTag::Decimal, decimal_op, false),
        ];
        for (ty, compute, integral) in numeric {
            for op in ARITHMETIC {
                table.add(op, ty.clone(), ty.clone(), ty.clone(), compute);
            }
            for op in COMPARISON.into_iter().chain(EQUALITY) {
                table.add(op, ty.clone(), ty.clone(), TypeTag::Bool, compute);
            }
            if integral {
                for op in BITWISE {
                    table.add(op, ty.clone(), ty.clone(), ty.clone(), compute);
                }
                for op in SHIFT {
                    table.add(op, ty.clone(), TypeTag::Int, ty.clone(), shift_op);
                }
            }
        }

        for op in BITWISE.into_iter().chain(EQUALITY) {
            table.add(op, TypeTag::Bool, TypeTag::Bool, TypeTag::Bool, bool_op);
        }

        for op in EQUALITY {
            table.add(op, TypeTag::String, TypeTag::String, TypeTag::Bool, string_eq);
        }
        table.add(
            BinaryOp::Add,
            TypeTag::String,
            TypeTag::String,
            TypeTag::String,
            concat,
        );
        for side in [Wildcard::Left, Wildcard::Right] {
            table
                .wildcard
                .entry(BinaryOp::Add)
                .or_default()
                .push(WildcardEntry {
                    fixed: TypeTag::String,
                    side,
                    entry: OperatorEntry {
                        result: TypeTag::String,
                        compute: concat,
                    },
                });
        }

        table
    }

    /// Replace the host method names consulted for operator overloads
    pub fn with_overload_names(mut self, names: OverloadNames) -> Self {
        self.overload_names = names;
        self
    }

    pub fn overload_names(&self) -> &OverloadNames {
        &self.overload_names
    }

    fn add(&mut self, op: BinaryOp, left: TypeTag, right: TypeTag, result: TypeTag, compute: ComputeFn) {
        self.exact
            .insert((op, left, right), OperatorEntry { result, compute });
    }

    fn lookup_exact(&self, op: BinaryOp, left: &TypeTag, right: &TypeTag) -> Option<&OperatorEntry> {
        self.exact.get(&(op, left.clone(), right.clone()))
    }

    fn lookup_wildcard(&self, op: BinaryOp, left: &TypeTag, right: &TypeTag) -> Option<&OperatorEntry> {
        self.wildcard.get(&op)?.iter().find_map(|w| {
            let fixed = match w.side {
                Wildcard::Left => left,
                Wildcard::Right => right,
            };
            (*fixed == w.fixed).then_some(&w.entry)
        })
    }

    /// Resolve an entry by operand types, returning the operand types the entry expects
    fn resolve(
        &self,
        op: BinaryOp,
        left: &TypeTag,
        right: &TypeTag,
    ) -> Option<(&OperatorEntry, Option<(TypeTag, TypeTag)>)> {
        if let Some(entry) = self.lookup_exact(op, left, right) {
            return Some((entry, None));
        }
        if let Some(entry) = self.lookup_wildcard(op, left, right) {
            return Some((entry, None));
        }
        let (l, r) = if SHIFT.contains(&op) {
            let l = promote_unary(left).filter(TypeTag::is_integral)?;
            let r = promote_unary(right).filter(|r| *r == TypeTag::Int)?;
            (l, r)
        } else {
            let common = promote(left, right)?;
            (common.clone(), common)
        };
        let entry = self.lookup_exact(op, &l, &r)?;
        Some((entry, Some((l, r))))
    }

    /// Apply a binary operator to two evaluated operands
    pub fn binary(
        &self,
        op: BinaryOp,
        left: &TypedValue,
        right: &TypedValue,
        ctx: &Context,
    ) -> ScriptResult<TypedValue> {
        if EQUALITY.contains(&op) && (left.is_null() || right.is_null()) {
            let equal = left.value.equals(&right.value);
            return Ok(TypedValue::from(if op == BinaryOp::Eq { equal } else { !equal }));
        }

        let lifted = left.ty.is_nullable() || right.ty.is_nullable();
        let left_ty = operand_type(left);
        let right_ty = operand_type(right);

        if let Some((entry, promoted)) = self.resolve(op, &left_ty, &right_ty) {
            let result_ty = if lifted {
                entry.result.clone().nullable()
            } else {
                entry.result.clone()
            };
            if lifted && (left.is_null() || right.is_null()) {
                return Ok(TypedValue::null_of(result_ty));
            }
            let value = match promoted {
                Some((l, r)) => {
                    let a = coerce(&left.value, &l, op, left, right)?;
                    let b = coerce(&right.value, &r, op, left, right)?;
                    (entry.compute)(op, &a, &b, ctx)?
                }
                None => (entry.compute)(op, &left.value, &right.value, ctx)?,
            };
            return Ok(TypedValue::new(value, result_ty));
        }

        if let Some(result) = self.overload(op, left, right)? {
            return Ok(result);
        }

        if EQUALITY.contains(&op) {
            let equal = left.value.equals(&right.value);
            return Ok(TypedValue::from(if op == BinaryOp::Eq { equal } else { !equal }));
        }

        Err(illegal(op, left, right))
    }

    fn overload(
        &self,
        op: BinaryOp,
        left: &TypedValue,
        right: &TypedValue,
    ) -> ScriptResult<Option<TypedValue>> {
        let TypeTag::Host(host) = left.ty.strip_nullable() else {
            return Ok(None);
        };
        let Some(name) = self.overload_names.get(op) else {
            return Ok(None);
        };
        let candidates: Vec<_> = host
            .members()
            .iter()
            .filter(|m| m.is_static && m.name == name && matches!(m.kind, MemberKind::Method(_)))
            .cloned()
            .collect();
        let args = vec![left.clone(), right.clone()];
        let Some(chosen) = binder::select_member(host, &candidates, &args) else {
            return Ok(None);
        };
        let params = chosen.signature().map_or(&[][..], |sig| sig.params.as_slice());
        let args = binder::coerce_args(params, args)?;
        host.invoke_static(chosen, args).map(Some)
    }

    /// Unary `-`
    pub fn negate(&self, operand: &TypedValue) -> ScriptResult<TypedValue> {
        let ty = operand.ty.strip_nullable().clone();
        let Some(result_ty) = negated_type(&ty) else {
            return Err(ScriptError::illegal_operands("-", format!("'{}'", operand.ty)));
        };
        if operand.is_null() {
            return Ok(TypedValue::null_of(result_ty.nullable()));
        }
        let value = match convert_numeric(&operand.value, &result_ty) {
            Some(Value::Int(n)) => Value::Int(n.wrapping_neg()),
            Some(Value::Long(n)) => Value::Long(n.wrapping_neg()),
            Some(Value::Float(f)) => Value::Float(-f),
            Some(Value::Double(f)) => Value::Double(-f),
            Some(Value::Decimal(d)) => Value::Decimal(-d),
            _ => return Err(ScriptError::illegal_operands("-", format!("'{}'", operand.ty))),
        };
        Ok(TypedValue::new(value, lift(result_ty, &operand.ty)))
    }

    /// Unary `~`
    pub fn complement(&self, operand: &TypedValue) -> ScriptResult<TypedValue> {
        let Some(result_ty) = promote_unary(operand.ty.strip_nullable()).filter(TypeTag::is_integral)
        else {
            return Err(ScriptError::illegal_operands("~", format!("'{}'", operand.ty)));
        };
        if operand.is_null() {
            return Ok(TypedValue::null_of(result_ty.nullable()));
        }
        let value = match convert_numeric(&operand.value, &result_ty) {
            Some(Value::Int(n)) => Value::Int(!n),
            Some(Value::UInt(n)) => Value::UInt(!n),
            Some(Value::Long(n)) => Value::Long(!n),
            Some(Value::ULong(n)) => Value::ULong(!n),
            _ => return Err(ScriptError::illegal_operands("~", format!("'{}'", operand.ty))),
        };
        Ok(TypedValue::new(value, lift(result_ty, &operand.ty)))
    }
}

fn lift(result: TypeTag, operand: &TypeTag) -> TypeTag {
    if operand.is_nullable() {
        result.nullable()
    } else {
        result
    }
}

fn negated_type(ty: &TypeTag) -> Option<TypeTag> {
    match ty {
        TypeTag::UInt => Some(TypeTag::Long),
        TypeTag::ULong => None,
        other => promote_unary(other),
    }
}

/// The type an operand dispatches on: nullable wrappers stripped, nulls
/// typed by their declared type
fn operand_type(operand: &TypedValue) -> TypeTag {
    operand.ty.strip_nullable().clone()
}

fn coerce(
    value: &Value,
    to: &TypeTag,
    op: BinaryOp,
    left: &TypedValue,
    right: &TypedValue,
) -> ScriptResult<Value> {
    convert_numeric(value, to).ok_or_else(|| illegal(op, left, right))
}

fn illegal(op: BinaryOp, left: &TypedValue, right: &TypedValue) -> ScriptError {
    ScriptError::illegal_operands(
        op.symbol(),
        format!("operands of type '{}' and '{}'", left.ty, right.ty),
    )
}

fn mismatch(op: BinaryOp) -> ScriptError {
    ScriptError::illegal_operands(op.symbol(), "operands of mismatched kinds")
}

macro_rules! integer_op {
    ($name:ident, $variant:ident) => {
        fn $name(op: BinaryOp, a: &Value, b: &Value, _: &Context) -> ScriptResult<Value> {
            let (Value::$variant(x), Value::$variant(y)) = (a, b) else {
                return Err(mismatch(op));
            };
            let (x, y) = (*x, *y);
            Ok(match op {
                BinaryOp::Add => Value::$variant(x.wrapping_add(y)),
                BinaryOp::Sub => Value::$variant(x.wrapping_sub(y)),
                BinaryOp::Mul => Value::$variant(x.wrapping_mul(y)),
                BinaryOp::Div | BinaryOp::Rem if y == 0 => return Err(ScriptError::DivisionByZero),
                BinaryOp::Div => Value::$variant(x.wrapping_div(y)),
                BinaryOp::Rem => Value::$variant(x.wrapping_rem(y)),
                BinaryOp::BitAnd => Value::$variant(x & y),
                BinaryOp::BitOr => Value::$variant(x | y),
                BinaryOp::BitXor => Value::$variant(x ^ y),
                BinaryOp::Eq => Value::Bool(x == y),
                BinaryOp::Ne => Value::Bool(x != y),
                BinaryOp::Lt => Value::Bool(x < y),
                BinaryOp::Gt => Value::Bool(x > y),
                BinaryOp::Le => Value::Bool(x <= y),
                BinaryOp::Ge => Value::Bool(x >= y),
                BinaryOp::Shl | BinaryOp::Shr => return Err(mismatch(op)),
            })
        }
    };
}

integer_op!(int_op, Int);
integer_op!(uint_op, UInt);
integer_op!(long_op, Long);
integer_op!(ulong_op, ULong);

macro_rules! float_op {
    ($name:ident, $variant:ident) => {
        fn $name(op: BinaryOp, a: &Value, b: &Value, _: &Context) -> ScriptResult<Value> {
            let (Value::$variant(x), Value::$variant(y)) = (a, b) else {
                return Err(mismatch(op));
            };
            let (x, y) = (*x, *y);
            Ok(match op {
                BinaryOp::Add => Value::$variant(x + y),
                BinaryOp::Sub => Value::$variant(x - y),
                BinaryOp::Mul => Value::$variant(x * y),
                BinaryOp::Div => Value::$variant(x / y),
                BinaryOp::Rem => Value::$variant(x % y),
                BinaryOp::Eq => Value::Bool(x == y),
                BinaryOp::Ne => Value::Bool(x != y),
                BinaryOp::Lt => Value::Bool(x < y),
                BinaryOp::Gt => Value::Bool(x > y),
                BinaryOp::Le => Value::Bool(x <= y),
                BinaryOp::Ge => Value::Bool(x >= y),
                _ => return Err(mismatch(op)),
            })
        }
    };
}

float_op!(float_op, Float);
float_op!(double_op, Double);

fn decimal_op(op: BinaryOp, a: &Value, b: &Value, _: &Context) -> ScriptResult<Value> {
    let (Value::Decimal(x), Value::Decimal(y)) = (a, b) else {
        return Err(mismatch(op));
    };
    let (x, y): (Decimal, Decimal) = (*x, *y);
    let overflow = || ScriptError::evaluation("decimal arithmetic overflow");
    Ok(match op {
        BinaryOp::Add => Value::Decimal(x.checked_add(y).ok_or_else(overflow)?),
        BinaryOp::Sub => Value::Decimal(x.checked_sub(y).ok_or_else(overflow)?),
        BinaryOp::Mul => Value::Decimal(x.checked_mul(y).ok_or_else(overflow)?),
        BinaryOp::Div | BinaryOp::Rem if y.is_zero() => return Err(ScriptError::DivisionByZero),
        BinaryOp::Div => Value::Decimal(x.checked_div(y).ok_or_else(overflow)?),
        BinaryOp::Rem => Value::Decimal(x.checked_rem(y).ok_or_else(overflow)?),
        BinaryOp::Eq => Value::Bool(x == y),
        BinaryOp::Ne => Value::Bool(x != y),
        BinaryOp::Lt => Value::Bool(x < y),
        BinaryOp::Gt => Value::Bool(x > y),
        BinaryOp::Le => Value::Bool(x <= y),
        BinaryOp::Ge => Value::Bool(x >= y),
        _ => return Err(mismatch(op)),
    })
}

fn shift_op(op: BinaryOp, a: &Value, b: &Value, _: &Context) -> ScriptResult<Value> {
    let Value::Int(count) = b else {
        return Err(mismatch(op));
    };
    let count = *count as u32;
    let left = op == BinaryOp::Shl;
    Ok(match a {
        Value::Int(x) if left => Value::Int(x.wrapping_shl(count)),
        Value::Int(x) => Value::Int(x.wrapping_shr(count)),
        Value::UInt(x) if left => Value::UInt(x.wrapping_shl(count)),
        Value::UInt(x) => Value::UInt(x.wrapping_shr(count)),
        Value::Long(x) if left => Value::Long(x.wrapping_shl(count)),
        Value::Long(x) => Value::Long(x.wrapping_shr(count)),
        Value::ULong(x) if left => Value::ULong(x.wrapping_shl(count)),
        Value::ULong(x) => Value::ULong(x.wrapping_shr(count)),
        _ => return Err(mismatch(op)),
    })
}

fn bool_op(op: BinaryOp, a: &Value, b: &Value, _: &Context) -> ScriptResult<Value> {
    let (Value::Bool(x), Value::Bool(y)) = (a, b) else {
        return Err(mismatch(op));
    };
    Ok(Value::Bool(match op {
        BinaryOp::BitAnd => x & y,
        BinaryOp::BitOr => x | y,
        BinaryOp::BitXor => x ^ y,
        BinaryOp::Eq => x == y,
        BinaryOp::Ne => x != y,
        _ => return Err(mismatch(op)),
    }))
}

fn string_eq(op: BinaryOp, a: &Value, b: &Value, ctx: &Context) -> ScriptResult<Value> {
    let (Some(x), Some(y)) = (a.as_str(), b.as_str()) else {
        return Err(mismatch(op));
    };
    let equal = match ctx.string_comparison() {
        StringComparison::Ordinal => x == y,
        StringComparison::OrdinalIgnoreCase => x.to_lowercase() == y.to_lowercase(),
    };
    Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
}

fn concat(_: BinaryOp, a: &Value, b: &Value, _: &Context) -> ScriptResult<Value> {
    Ok(Value::String(Arc::from(format!("{}{}", a, b))))
}
