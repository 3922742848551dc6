//! Runtime value type for the expression language.
//!
//! Values are dynamically typed: every operator and conversion inspects the
//! variant at run time.  Numeric literals keep the type selected by their
//! suffix (see [`crate::script::cursor`]), so `1`, `1L`, `1f` and `1m` are
//! four different variants.

use std::fmt;
use std::rc::Rc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::ScriptError;

/// A host or engine object reachable from expressions.
///
/// Members and methods are looked up by name, case-insensitively; returning
/// `None` means "no such member" and lets the caller report the error.
pub trait ScriptObject: fmt::Debug {
    /// Name reported by `typeof()` and in error messages.
    fn type_name(&self) -> &str;

    fn get_member(&self, _name: &str) -> Option<Value> {
        None
    }

    fn call_method(&self, _name: &str, _args: &[Value]) -> Option<Result<Value, ScriptError>> {
        None
    }

    fn index(&self, _index: &Value) -> Option<Result<Value, ScriptError>> {
        None
    }

    /// Text used when the object is stringified.
    fn display(&self) -> String {
        self.type_name().to_owned()
    }
}

/// An enumeration type known to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<(String, i64)>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>, members: &[(&str, i64)]) -> Self {
        EnumDef {
            name: name.into(),
            members: members.iter().map(|(n, v)| ((*n).to_owned(), *v)).collect(),
        }
    }

    /// Look up a member value by name, ignoring case.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.members
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }

    /// Name of the first member with the given value.
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }
}

/// A value of an [`EnumDef`] type.
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub def: Rc<EnumDef>,
    pub value: i64,
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.def.name.eq_ignore_ascii_case(&other.def.name)
    }
}

/// Largest element count a script may allocate in one step (`new T[n]`,
/// `PadLeft`, `PadRight`).  Larger requests are runtime faults.
pub const MAX_ALLOC_LEN: usize = 1 << 24;

/// A dynamically-typed runtime datum.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Char(char),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Str(String),
    Array(Vec<Value>),
    Enum(EnumValue),
    Object(Rc<dyn ScriptObject>),
}

impl PartialEq for Value {
    /// Structural equality: same variant, same payload.  Objects compare by
    /// identity.  Script-level `==` lives in [`crate::script::ops`] and
    /// coerces first.
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (F32(a), F32(b)) => a == b,
            (F64(a), F64(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (Object(a), Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::I8(n) => write!(f, "{n}"),
            Value::U8(n) => write!(f, "{n}"),
            Value::I16(n) => write!(f, "{n}"),
            Value::U16(n) => write!(f, "{n}"),
            Value::I32(n) => write!(f, "{n}"),
            Value::U32(n) => write!(f, "{n}"),
            Value::I64(n) => write!(f, "{n}"),
            Value::U64(n) => write!(f, "{n}"),
            Value::F32(x) => write!(f, "{x}"),
            Value::F64(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Str(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Enum(e) => match e.def.name_of(e.value) {
                Some(name) => f.write_str(name),
                None => write!(f, "{}", e.value),
            },
            Value::Object(o) => f.write_str(&o.display()),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::I8(_)
                | Value::U8(_)
                | Value::I16(_)
                | Value::U16(_)
                | Value::I32(_)
                | Value::U32(_)
                | Value::I64(_)
                | Value::U64(_)
                | Value::F32(_)
                | Value::F64(_)
                | Value::Decimal(_)
        )
    }

    pub fn is_integer(&self) -> bool {
        self.is_numeric() && !matches!(self, Value::F32(_) | Value::F64(_) | Value::Decimal(_))
    }

    /// Integer payload widened to `i128` (chars and enums count as integers).
    pub fn as_i128(&self) -> Option<i128> {
        Some(match self {
            Value::Char(c) => *c as i128,
            Value::I8(n) => *n as i128,
            Value::U8(n) => *n as i128,
            Value::I16(n) => *n as i128,
            Value::U16(n) => *n as i128,
            Value::I32(n) => *n as i128,
            Value::U32(n) => *n as i128,
            Value::I64(n) => *n as i128,
            Value::U64(n) => *n as i128,
            Value::Enum(e) => e.value as i128,
            _ => return None,
        })
    }

    /// Numeric payload as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(x) => Some(*x as f64),
            Value::F64(x) => Some(*x),
            Value::Decimal(d) => d.to_f64(),
            other => other.as_i128().map(|n| n as f64),
        }
    }

    /// Loose truthiness used by `!`, `&&`, `||` and `?:`.
    ///
    /// `null`, `false`, zero, `""`, `"0"`, `"false"` and empty arrays are
    /// falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Char(c) => *c != '\0',
            Value::F32(x) => *x != 0.0,
            Value::F64(x) => *x != 0.0,
            Value::Decimal(d) => !d.is_zero(),
            Value::Str(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
            Value::Array(items) => !items.is_empty(),
            Value::Object(_) => true,
            other => other.as_i128().is_some_and(|n| n != 0),
        }
    }

    /// Type name as reported by `typeof()`.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(_) => "bool".into(),
            Value::Char(_) => "char".into(),
            Value::I8(_) => "sbyte".into(),
            Value::U8(_) => "byte".into(),
            Value::I16(_) => "short".into(),
            Value::U16(_) => "ushort".into(),
            Value::I32(_) => "int".into(),
            Value::U32(_) => "uint".into(),
            Value::I64(_) => "long".into(),
            Value::U64(_) => "ulong".into(),
            Value::F32(_) => "float".into(),
            Value::F64(_) => "double".into(),
            Value::Decimal(_) => "decimal".into(),
            Value::Str(_) => "string".into(),
            Value::Array(_) => "array".into(),
            Value::Enum(e) => e.def.name.clone(),
            Value::Object(o) => o.type_name().to_owned(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::I32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::I64(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::U64(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::F64(x)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_numbers_and_null() {
        assert_eq!(Value::I32(42).to_string(), "42");
        assert_eq!(Value::F64(1.0).to_string(), "1");
        assert_eq!(Value::F64(2.5).to_string(), "2.5");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn display_array_joins_items() {
        let v = Value::from(vec![Value::I32(1), Value::from("a"), Value::Null]);
        assert_eq!(v.to_string(), "1, a, ");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::I32(0).is_truthy());
        assert!(Value::U64(3).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from("0").is_truthy());
        assert!(!Value::from("FALSE").is_truthy());
        assert!(Value::from("no").is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn enum_lookup_ignores_case() {
        let def = EnumDef::new("Color", &[("Red", 1), ("Green", 2)]);
        assert_eq!(def.value_of("green"), Some(2));
        assert_eq!(def.name_of(1), Some("Red"));
        let v = Value::Enum(EnumValue { def: Rc::new(def), value: 2 });
        assert_eq!(v.to_string(), "Green");
        assert_eq!(v.type_name(), "Color");
    }

    #[test]
    fn structural_equality_is_variant_sensitive() {
        assert_eq!(Value::I32(1), Value::I32(1));
        assert_ne!(Value::I32(1), Value::I64(1));
    }
}
