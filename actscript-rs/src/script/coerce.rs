//! Dynamic type coercion.
//!
//! [`convert`] maps any [`Value`] to a requested [`ValueType`]:
//!
//! | Source | Target | Rule |
//! |--------|--------|------|
//! | any | `object` | identity |
//! | `null` | value type | the type's default (`0`, `false`, `'\0'`) |
//! | `null` | `string`, arrays | `null` |
//! | number | number | widening or truncating cast |
//! | string | number, bool, char, enum | parse (trimmed) |
//! | array | `T[]` | element-wise |
//! | enum / integer / string | enum | by value, or by member name ignoring case |
//!
//! Anything else is a [`CoercionError`].

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::value::{EnumDef, EnumValue, Value};
use crate::error::CoercionError;

/// A conversion target.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    Object,
    Bool,
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Decimal,
    Str,
    Array(Box<ValueType>),
    Enum(Rc<EnumDef>),
}

impl ValueType {
    /// Resolve a built-in type keyword (`int`, `System.Int32`, `string` …).
    pub fn builtin(name: &str) -> Option<ValueType> {
        let name = name.strip_prefix("System.").unwrap_or(name);
        let ty = match name.to_ascii_lowercase().as_str() {
            "object" => ValueType::Object,
            "bool" | "boolean" => ValueType::Bool,
            "char" => ValueType::Char,
            "sbyte" => ValueType::I8,
            "byte" => ValueType::U8,
            "short" | "int16" => ValueType::I16,
            "ushort" | "uint16" => ValueType::U16,
            "int" | "int32" => ValueType::I32,
            "uint" | "uint32" => ValueType::U32,
            "long" | "int64" => ValueType::I64,
            "ulong" | "uint64" => ValueType::U64,
            "float" | "single" => ValueType::F32,
            "double" => ValueType::F64,
            "decimal" => ValueType::Decimal,
            "string" => ValueType::Str,
            _ => return None,
        };
        Some(ty)
    }

    fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueType::I8
                | ValueType::U8
                | ValueType::I16
                | ValueType::U16
                | ValueType::I32
                | ValueType::U32
                | ValueType::I64
                | ValueType::U64
        )
    }

    /// Inclusive range of an integer target.
    fn int_range(&self) -> (i128, i128) {
        match self {
            ValueType::I8 => (i8::MIN as i128, i8::MAX as i128),
            ValueType::U8 => (0, u8::MAX as i128),
            ValueType::I16 => (i16::MIN as i128, i16::MAX as i128),
            ValueType::U16 => (0, u16::MAX as i128),
            ValueType::I32 => (i32::MIN as i128, i32::MAX as i128),
            ValueType::U32 => (0, u32::MAX as i128),
            ValueType::I64 => (i64::MIN as i128, i64::MAX as i128),
            _ => (0, u64::MAX as i128),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Object => "object",
            ValueType::Bool => "bool",
            ValueType::Char => "char",
            ValueType::I8 => "sbyte",
            ValueType::U8 => "byte",
            ValueType::I16 => "short",
            ValueType::U16 => "ushort",
            ValueType::I32 => "int",
            ValueType::U32 => "uint",
            ValueType::I64 => "long",
            ValueType::U64 => "ulong",
            ValueType::F32 => "float",
            ValueType::F64 => "double",
            ValueType::Decimal => "decimal",
            ValueType::Str => "string",
            ValueType::Array(elem) => return write!(f, "{elem}[]"),
            ValueType::Enum(def) => &def.name,
        };
        f.write_str(name)
    }
}

/// Build an integer value of type `ty`, truncating `n` to its width.
pub(crate) fn int_value(ty: &ValueType, n: i128) -> Value {
    match ty {
        ValueType::I8 => Value::I8(n as i8),
        ValueType::U8 => Value::U8(n as u8),
        ValueType::I16 => Value::I16(n as i16),
        ValueType::U16 => Value::U16(n as u16),
        ValueType::I32 => Value::I32(n as i32),
        ValueType::U32 => Value::U32(n as u32),
        ValueType::I64 => Value::I64(n as i64),
        _ => Value::U64(n as u64),
    }
}

fn mismatch(v: &Value, ty: &ValueType) -> CoercionError {
    CoercionError::Mismatch {
        from: v.type_name(),
        to: ty.to_string(),
    }
}

fn format_err(text: &str, ty: &ValueType) -> CoercionError {
    CoercionError::Format {
        text: text.to_owned(),
        to: ty.to_string(),
    }
}

fn default_of(ty: &ValueType) -> Value {
    match ty {
        ValueType::Bool => Value::Bool(false),
        ValueType::Char => Value::Char('\0'),
        ValueType::F32 => Value::F32(0.0),
        ValueType::F64 => Value::F64(0.0),
        ValueType::Decimal => Value::Decimal(Decimal::ZERO),
        ValueType::Enum(def) => Value::Enum(EnumValue {
            def: Rc::clone(def),
            value: 0,
        }),
        t if t.is_integer() => int_value(t, 0),
        _ => Value::Null,
    }
}

/// Convert `v` to type `ty`.
pub fn convert(v: &Value, ty: &ValueType) -> Result<Value, CoercionError> {
    if *ty == ValueType::Object {
        return Ok(v.clone());
    }
    if v.is_null() {
        return Ok(default_of(ty));
    }

    match ty {
        ValueType::Str => Ok(Value::Str(v.to_string())),
        ValueType::Bool => to_bool(v).map(Value::Bool),
        ValueType::Char => to_char(v).map(Value::Char),
        ValueType::F32 => to_f64(v, ty).map(|x| Value::F32(x as f32)),
        ValueType::F64 => to_f64(v, ty).map(Value::F64),
        ValueType::Decimal => to_decimal(v).map(Value::Decimal),
        ValueType::Array(elem) => match v {
            Value::Array(items) => items
                .iter()
                .map(|item| convert(item, elem))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(mismatch(other, ty)),
        },
        ValueType::Enum(def) => to_enum(v, def),
        t => to_int(v, t).map(|n| int_value(t, n)),
    }
}

fn to_bool(v: &Value) -> Result<bool, CoercionError> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Str(s) => {
            let t = s.trim();
            if t.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if t.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                Err(format_err(s, &ValueType::Bool))
            }
        }
        other if other.is_numeric() => Ok(other.is_truthy()),
        other => Err(mismatch(other, &ValueType::Bool)),
    }
}

fn to_char(v: &Value) -> Result<char, CoercionError> {
    match v {
        Value::Char(c) => Ok(*c),
        Value::Str(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format_err(s, &ValueType::Char)),
            }
        }
        other => match other.as_i128() {
            Some(n) if other.is_integer() => u32::try_from(n)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| format_err(&other.to_string(), &ValueType::Char)),
            _ => Err(mismatch(other, &ValueType::Char)),
        },
    }
}

fn to_int(v: &Value, ty: &ValueType) -> Result<i128, CoercionError> {
    match v {
        Value::Bool(b) => Ok(i128::from(*b)),
        Value::F32(x) => Ok(*x as i128),
        Value::F64(x) => Ok(*x as i128),
        Value::Decimal(d) => d.trunc().to_i128().ok_or_else(|| mismatch(v, ty)),
        Value::Str(s) => {
            let (lo, hi) = ty.int_range();
            match parse_int_text(s.trim()) {
                Some(n) if n >= lo && n <= hi => Ok(n),
                _ => Err(format_err(s, ty)),
            }
        }
        other => other.as_i128().ok_or_else(|| mismatch(other, ty)),
    }
}

fn parse_int_text(s: &str) -> Option<i128> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn to_f64(v: &Value, ty: &ValueType) -> Result<f64, CoercionError> {
    match v {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s.trim().parse().map_err(|_| format_err(s, ty)),
        other => other.as_f64().ok_or_else(|| mismatch(other, ty)),
    }
}

fn to_decimal(v: &Value) -> Result<Decimal, CoercionError> {
    let ty = ValueType::Decimal;
    match v {
        Value::Decimal(d) => Ok(*d),
        Value::Bool(b) => Ok(Decimal::from(u8::from(*b))),
        Value::F32(x) => Decimal::from_f32(*x).ok_or_else(|| mismatch(v, &ty)),
        Value::F64(x) => Decimal::from_f64(*x).ok_or_else(|| mismatch(v, &ty)),
        Value::Str(s) => Decimal::from_str(s.trim()).map_err(|_| format_err(s, &ty)),
        other => other
            .as_i128()
            .and_then(|n| Decimal::try_from_i128_with_scale(n, 0).ok())
            .ok_or_else(|| mismatch(other, &ty)),
    }
}

fn to_enum(v: &Value, def: &Rc<EnumDef>) -> Result<Value, CoercionError> {
    let value = match v {
        Value::Str(s) => {
            let name = s.trim();
            match def.value_of(name).or_else(|| name.parse().ok()) {
                Some(n) => n,
                None => {
                    return Err(CoercionError::UnknownEnumMember {
                        name: name.to_owned(),
                        enum_name: def.name.clone(),
                    })
                }
            }
        }
        other if other.is_integer() || matches!(other, Value::Enum(_)) => {
            other.as_i128().map_or(0, |n| n as i64)
        }
        other => return Err(mismatch(other, &ValueType::Enum(Rc::clone(def)))),
    };
    Ok(Value::Enum(EnumValue {
        def: Rc::clone(def),
        value,
    }))
}

// ── Typed extraction ──────────────────────────────────────────────────────────

/// Rust types that can be extracted from a [`Value`] through [`convert`].
pub trait FromValue: Sized {
    fn from_value(v: &Value) -> Result<Self, CoercionError>;
}

macro_rules! from_value_via {
    ($t:ty, $target:expr, $variant:ident) => {
        impl FromValue for $t {
            fn from_value(v: &Value) -> Result<Self, CoercionError> {
                match convert(v, &$target)? {
                    Value::$variant(x) => Ok(x),
                    other => Err(mismatch(&other, &$target)),
                }
            }
        }
    };
}

from_value_via!(bool, ValueType::Bool, Bool);
from_value_via!(char, ValueType::Char, Char);
from_value_via!(i32, ValueType::I32, I32);
from_value_via!(i64, ValueType::I64, I64);
from_value_via!(u32, ValueType::U32, U32);
from_value_via!(u64, ValueType::U64, U64);
from_value_via!(f64, ValueType::F64, F64);
from_value_via!(Decimal, ValueType::Decimal, Decimal);

impl FromValue for String {
    fn from_value(v: &Value) -> Result<Self, CoercionError> {
        Ok(v.to_string())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(v: &Value) -> Result<Self, CoercionError> {
        match v {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            other => Ok(vec![T::from_value(other)?]),
        }
    }
}

/// Convert `v` to any [`FromValue`] type.
pub fn to<T: FromValue>(v: &Value) -> Result<T, CoercionError> {
    T::from_value(v)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
