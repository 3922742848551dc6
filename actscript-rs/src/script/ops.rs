//! Operator semantics.
//!
//! Integer operands are promoted the C way: everything narrower than `int`
//! becomes `int`, `uint` mixed with a signed type becomes `long`, and any
//! `ulong` operand makes the result `ulong`.  Arithmetic is carried out in
//! `i128` and truncated back, so overflow wraps.  A `float`/`double` operand
//! makes the operation floating point; a `decimal` operand makes it decimal.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::value::Value;
use crate::error::ScriptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntKind {
    I32,
    U32,
    I64,
    U64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(IntKind),
    F32,
    F64,
    Dec,
}

fn int_kind(v: &Value) -> Option<IntKind> {
    match v {
        Value::I8(_)
        | Value::U8(_)
        | Value::I16(_)
        | Value::U16(_)
        | Value::I32(_)
        | Value::Char(_)
        | Value::Enum(_) => Some(IntKind::I32),
        Value::U32(_) => Some(IntKind::U32),
        Value::I64(_) => Some(IntKind::I64),
        Value::U64(_) => Some(IntKind::U64),
        _ => None,
    }
}

fn num_class(v: &Value) -> Option<Num> {
    match v {
        Value::F32(_) => Some(Num::F32),
        Value::F64(_) => Some(Num::F64),
        Value::Decimal(_) => Some(Num::Dec),
        other => int_kind(other).map(Num::Int),
    }
}

fn promote_int(a: IntKind, b: IntKind) -> IntKind {
    use IntKind::*;
    match (a, b) {
        (U64, _) | (_, U64) => U64,
        (I64, _) | (_, I64) => I64,
        (U32, U32) => U32,
        (U32, _) | (_, U32) => I64,
        _ => I32,
    }
}

fn promote(a: Num, b: Num) -> Num {
    match (a, b) {
        (Num::Dec, _) | (_, Num::Dec) => Num::Dec,
        (Num::F64, _) | (_, Num::F64) => Num::F64,
        (Num::F32, _) | (_, Num::F32) => Num::F32,
        (Num::Int(x), Num::Int(y)) => Num::Int(promote_int(x, y)),
    }
}

fn make_int(kind: IntKind, n: i128) -> Value {
    match kind {
        IntKind::I32 => Value::I32(n as i32),
        IntKind::U32 => Value::U32(n as u32),
        IntKind::I64 => Value::I64(n as i64),
        IntKind::U64 => Value::U64(n as u64),
    }
}

fn as_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Decimal(d) => Some(*d),
        Value::F32(x) => Decimal::from_f32(*x),
        Value::F64(x) => Decimal::from_f64(*x),
        other => other
            .as_i128()
            .and_then(|n| Decimal::try_from_i128_with_scale(n, 0).ok()),
    }
}

fn divide_by_zero() -> ScriptError {
    ScriptError::runtime("attempted to divide by zero")
}

fn bad_operands(op: BinOp, l: &Value, r: &Value) -> ScriptError {
    ScriptError::runtime(format!(
        "operator '{}' cannot be applied to operands of type {} and {}",
        op.symbol(),
        l.type_name(),
        r.type_name()
    ))
}

/// Apply a (non short-circuit) binary operator.
pub fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, ScriptError> {
    match op {
        BinOp::Eq => return Ok(Value::Bool(equals(l, r))),
        BinOp::Ne => return Ok(Value::Bool(!equals(l, r))),
        BinOp::Lt => return Ok(Value::Bool(compare(l, r) == Some(Ordering::Less))),
        BinOp::Le => {
            return Ok(Value::Bool(matches!(
                compare(l, r),
                Some(Ordering::Less | Ordering::Equal)
            )))
        }
        BinOp::Gt => return Ok(Value::Bool(compare(l, r) == Some(Ordering::Greater))),
        BinOp::Ge => {
            return Ok(Value::Bool(matches!(
                compare(l, r),
                Some(Ordering::Greater | Ordering::Equal)
            )))
        }
        _ => {}
    }

    if op == BinOp::Add && (matches!(l, Value::Str(_)) || matches!(r, Value::Str(_))) {
        return Ok(Value::Str(format!("{l}{r}")));
    }
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }

    if let (Value::Bool(a), Value::Bool(b)) = (l, r) {
        return match op {
            BinOp::BitAnd => Ok(Value::Bool(*a & *b)),
            BinOp::BitOr => Ok(Value::Bool(*a | *b)),
            BinOp::BitXor => Ok(Value::Bool(*a ^ *b)),
            _ => Err(bad_operands(op, l, r)),
        };
    }

    let (Some(lc), Some(rc)) = (num_class(l), num_class(r)) else {
        return Err(bad_operands(op, l, r));
    };

    if matches!(op, BinOp::Shl | BinOp::Shr) {
        let (Num::Int(kind), Num::Int(_)) = (lc, rc) else {
            return Err(bad_operands(op, l, r));
        };
        let kind = promote_int(kind, IntKind::I32);
        let a = l.as_i128().unwrap_or_default();
        // only the low 5 (32-bit) or 6 (64-bit) bits of the count are used
        let mask = match kind {
            IntKind::I32 | IntKind::U32 => 31,
            _ => 63,
        };
        let count = (r.as_i128().unwrap_or_default() & mask) as u32;
        return Ok(shift(op, kind, a, count));
    }

    match promote(lc, rc) {
        Num::Int(kind) => {
            let a = l.as_i128().unwrap_or_default();
            let b = r.as_i128().unwrap_or_default();
            let n = match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Div | BinOp::Rem if b == 0 => return Err(divide_by_zero()),
                BinOp::Div => a.wrapping_div(b),
                BinOp::Rem => a.wrapping_rem(b),
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
                BinOp::BitXor => a ^ b,
                _ => return Err(bad_operands(op, l, r)),
            };
            Ok(make_int(kind, n))
        }
        Num::F32 => {
            let a = l.as_f64().unwrap_or_default() as f32;
            let b = r.as_f64().unwrap_or_default() as f32;
            float_op(op, a, b).map(Value::F32).ok_or_else(|| bad_operands(op, l, r))
        }
        Num::F64 => {
            let a = l.as_f64().unwrap_or_default();
            let b = r.as_f64().unwrap_or_default();
            float_op(op, a, b).map(Value::F64).ok_or_else(|| bad_operands(op, l, r))
        }
        Num::Dec => {
            let (Some(a), Some(b)) = (as_decimal(l), as_decimal(r)) else {
                return Err(bad_operands(op, l, r));
            };
            let res = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div | BinOp::Rem if b.is_zero() => return Err(divide_by_zero()),
                BinOp::Div => a.checked_div(b),
                BinOp::Rem => a.checked_rem(b),
                _ => return Err(bad_operands(op, l, r)),
            };
            res.map(Value::Decimal)
                .ok_or_else(|| ScriptError::runtime("value was either too large or too small for a decimal"))
        }
    }
}

fn float_op<F>(op: BinOp, a: F, b: F) -> Option<F>
where
    F: std::ops::Add<Output = F>
        + std::ops::Sub<Output = F>
        + std::ops::Mul<Output = F>
        + std::ops::Div<Output = F>
        + std::ops::Rem<Output = F>,
{
    Some(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => return None,
    })
}

fn shift(op: BinOp, kind: IntKind, a: i128, count: u32) -> Value {
    let left = op == BinOp::Shl;
    match kind {
        IntKind::U32 => {
            let x = a as u32;
            Value::U32(if left { x.wrapping_shl(count) } else { x.wrapping_shr(count) })
        }
        IntKind::I32 => {
            let x = a as i32;
            Value::I32(if left { x.wrapping_shl(count) } else { x.wrapping_shr(count) })
        }
        IntKind::I64 => {
            let x = a as i64;
            Value::I64(if left { x.wrapping_shl(count) } else { x.wrapping_shr(count) })
        }
        _ => {
            let x = a as u64;
            Value::U64(if left { x.wrapping_shl(count) } else { x.wrapping_shr(count) })
        }
    }
}

/// Apply a unary operator.
pub fn unary(op: UnaryOp, v: &Value) -> Result<Value, ScriptError> {
    if op == UnaryOp::Not {
        return Ok(Value::Bool(!v.is_truthy()));
    }
    if v.is_null() {
        return Ok(Value::Null);
    }
    let bad = || {
        ScriptError::runtime(format!(
            "unary operator cannot be applied to operand of type {}",
            v.type_name()
        ))
    };
    match (op, v) {
        (UnaryOp::Neg, Value::F32(x)) => Ok(Value::F32(-x)),
        (UnaryOp::Neg, Value::F64(x)) => Ok(Value::F64(-x)),
        (UnaryOp::Neg, Value::Decimal(d)) => Ok(Value::Decimal(-d)),
        (UnaryOp::Plus, Value::F32(_) | Value::F64(_) | Value::Decimal(_)) => Ok(v.clone()),
        (_, other) => {
            let kind = int_kind(other).ok_or_else(bad)?;
            let n = other.as_i128().unwrap_or_default();
            match op {
                UnaryOp::Neg => {
                    let kind = if matches!(kind, IntKind::U32 | IntKind::U64) {
                        IntKind::I64
                    } else {
                        kind
                    };
                    Ok(make_int(kind, n.wrapping_neg()))
                }
                UnaryOp::BitNot => Ok(make_int(kind, !n)),
                _ => Ok(make_int(kind, n)),
            }
        }
    }
}

// ── Comparison ────────────────────────────────────────────────────────────────

/// Parse a trimmed numeric string for comparison against a number.
fn numeric_text(s: &str) -> Option<Value> {
    let t = s.trim();
    if let Ok(n) = t.parse::<i64>() {
        return Some(Value::I64(n));
    }
    if let Ok(n) = t.parse::<u64>() {
        return Some(Value::U64(n));
    }
    if let Ok(d) = Decimal::from_str(t) {
        return Some(Value::Decimal(d));
    }
    t.parse::<f64>().ok().map(Value::F64)
}

fn compare_numbers(l: &Value, r: &Value) -> Option<Ordering> {
    match promote(num_class(l)?, num_class(r)?) {
        Num::Int(_) => Some(l.as_i128()?.cmp(&r.as_i128()?)),
        Num::Dec => Some(as_decimal(l)?.cmp(&as_decimal(r)?)),
        Num::F32 | Num::F64 => l.as_f64()?.partial_cmp(&r.as_f64()?),
    }
}

/// Ordering between two values after coercion, or `None` when they are not
/// comparable.
pub fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Str(a), Value::Str(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Char(a), Value::Str(b)) => Some(a.to_string().as_str().cmp(b.as_str())),
        (Value::Str(a), Value::Char(b)) => Some(a.as_str().cmp(b.to_string().as_str())),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Bool(a), other) | (other, Value::Bool(a)) => {
            let b = match other {
                Value::Str(s) if s.trim().eq_ignore_ascii_case("true") => true,
                Value::Str(s) if s.trim().eq_ignore_ascii_case("false") => false,
                Value::Str(_) => return None,
                v if v.is_numeric() => v.is_truthy(),
                _ => return None,
            };
            let ord = a.cmp(&b);
            Some(if matches!(l, Value::Bool(_)) { ord } else { ord.reverse() })
        }
        (Value::Enum(a), Value::Str(s)) => Some(enum_vs_text(a, s)),
        (Value::Str(s), Value::Enum(a)) => Some(enum_vs_text(a, s).reverse()),
        (Value::Str(s), other) if other.is_numeric() || matches!(other, Value::Char(_)) => {
            match numeric_text(s) {
                Some(n) => compare_numbers(&n, other),
                None => Some(s.as_str().cmp(other.to_string().as_str())),
            }
        }
        (other, Value::Str(s)) if other.is_numeric() => match numeric_text(s) {
            Some(n) => compare_numbers(other, &n),
            None => Some(other.to_string().as_str().cmp(s.as_str())),
        },
        (Value::Array(a), Value::Array(b)) => {
            if a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y)) {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
        (Value::Object(_), Value::Object(_)) => (l == r).then_some(Ordering::Equal),
        _ => compare_numbers(l, r),
    }
}

fn enum_vs_text(e: &super::value::EnumValue, s: &str) -> Ordering {
    let t = s.trim();
    let other = e.def.value_of(t).or_else(|| t.parse().ok());
    match other {
        Some(v) => e.value.cmp(&v),
        None => e.def.name_of(e.value).unwrap_or_default().cmp(t),
    }
}

/// Script-level `==`.
pub fn equals(l: &Value, r: &Value) -> bool {
    compare(l, r) == Some(Ordering::Equal)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_promotion() {
        assert_eq!(binary(BinOp::Add, &Value::U8(200), &Value::U8(100)).unwrap(), Value::I32(300));
        assert_eq!(binary(BinOp::Add, &Value::U32(1), &Value::I32(-2)).unwrap(), Value::I64(-1));
        assert_eq!(binary(BinOp::Mul, &Value::I64(3), &Value::I32(4)).unwrap(), Value::I64(12));
        assert_eq!(
            binary(BinOp::Add, &Value::I32(i32::MAX), &Value::I32(1)).unwrap(),
            Value::I32(i32::MIN)
        );
    }

    #[test]
    fn mixed_float_and_decimal() {
        assert_eq!(binary(BinOp::Div, &Value::I32(1), &Value::F64(4.0)).unwrap(), Value::F64(0.25));
        let d = binary(BinOp::Add, &Value::Decimal(Decimal::new(150, 2)), &Value::I32(1)).unwrap();
        assert_eq!(d, Value::Decimal(Decimal::new(250, 2)));
    }

    #[test]
    fn integer_division_by_zero_faults() {
        let err = binary(BinOp::Div, &Value::I32(1), &Value::I32(0)).unwrap_err();
        assert!(err.catchable().is_ok());
        assert_eq!(
            binary(BinOp::Div, &Value::F64(1.0), &Value::F64(0.0)).unwrap(),
            Value::F64(f64::INFINITY)
        );
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            binary(BinOp::Add, &Value::from("a"), &Value::I32(1)).unwrap(),
            Value::from("a1")
        );
        assert!(binary(BinOp::Sub, &Value::from("a"), &Value::I32(1)).is_err());
    }

    #[test]
    fn comparisons_coerce_digit_strings() {
        assert!(equals(&Value::from("10"), &Value::I32(10)));
        assert_eq!(compare(&Value::from("9"), &Value::I32(10)), Some(Ordering::Less));
        assert_eq!(compare(&Value::from("9"), &Value::from("10")), Some(Ordering::Greater));
        assert!(equals(&Value::Char('A'), &Value::I32(65)));
        assert!(equals(&Value::from("T"), &Value::from("T")));
        assert!(!equals(&Value::Null, &Value::I32(0)));
        assert!(equals(&Value::Null, &Value::Null));
    }

    #[test]
    fn shifts_and_bitwise() {
        assert_eq!(binary(BinOp::Shl, &Value::I32(1), &Value::I32(33)).unwrap(), Value::I32(2));
        assert_eq!(binary(BinOp::Shr, &Value::I32(-8), &Value::I32(1)).unwrap(), Value::I32(-4));
        assert_eq!(binary(BinOp::Shl, &Value::I32(1), &Value::I32(-1)).unwrap(), Value::I32(i32::MIN));
        assert_eq!(binary(BinOp::Shl, &Value::I64(1), &Value::I32(-1)).unwrap(), Value::I64(i64::MIN));
        assert_eq!(
            binary(BinOp::Shl, &Value::I32(1), &Value::I64(i64::MAX)).unwrap(),
            Value::I32(i32::MIN)
        );
        assert_eq!(binary(BinOp::BitXor, &Value::I32(6), &Value::I32(3)).unwrap(), Value::I32(5));
        assert_eq!(
            binary(BinOp::BitAnd, &Value::Bool(true), &Value::Bool(false)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn unary_ops() {
        assert_eq!(unary(UnaryOp::Neg, &Value::I32(5)).unwrap(), Value::I32(-5));
        assert_eq!(unary(UnaryOp::Neg, &Value::U32(5)).unwrap(), Value::I64(-5));
        assert_eq!(unary(UnaryOp::BitNot, &Value::I32(0)).unwrap(), Value::I32(-1));
        assert_eq!(unary(UnaryOp::Not, &Value::from("")).unwrap(), Value::Bool(true));
        assert!(unary(UnaryOp::Neg, &Value::from("x")).is_err());
    }
}
