//! Built-in receivers for bare function names and `Type.Member` access.
//!
//! A bare call such as `strlen($s)` is offered to each receiver in order
//! until one accepts it; `Math.Max(1, 2)` goes straight to the receiver
//! named `Math`.  Names are matched case-insensitively.
//!
//! | Receiver | Functions |
//! |----------|-----------|
//! | `Str`  | `strlen`, `substr`, `strstr`, `strcat`, `tolower`, `toupper`, `trim`, `replace`, `typeof`, `isnull`, `like`, `match` |
//! | `Math` | `Max`, `Min`, `Abs`, `Round`, `Floor`, `Ceiling`, `Sqrt`, `Pow`, `PI`, `E` |

use std::cmp::Ordering;

use rust_decimal::{Decimal, RoundingStrategy};

use super::coerce::to;
use super::ops;
use super::value::Value;
use crate::error::ScriptError;
use crate::pattern::{MatchMode, Pattern};

/// An object whose methods can be called without naming it.
pub trait Receiver {
    fn name(&self) -> &str;

    /// `Some` when this receiver handles `func`.
    fn call(&self, func: &str, args: &[Value]) -> Option<Result<Value, ScriptError>>;

    /// Argument-less property such as `Math.PI`.
    fn property(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// The receivers every context starts with.
pub fn default_receivers() -> Vec<Box<dyn Receiver>> {
    vec![Box::new(StrReceiver), Box::new(MathReceiver)]
}

fn arg<'v>(args: &'v [Value], i: usize, func: &str) -> Result<&'v Value, ScriptError> {
    args.get(i)
        .ok_or_else(|| ScriptError::runtime(format!("{func}: missing argument {}", i + 1)))
}

fn str_arg(args: &[Value], i: usize, func: &str) -> Result<String, ScriptError> {
    Ok(to::<String>(arg(args, i, func)?)?)
}

fn int_arg(args: &[Value], i: usize, func: &str) -> Result<i64, ScriptError> {
    Ok(to::<i64>(arg(args, i, func)?)?)
}

fn float_arg(args: &[Value], i: usize, func: &str) -> Result<f64, ScriptError> {
    Ok(to::<f64>(arg(args, i, func)?)?)
}

// ── Str ───────────────────────────────────────────────────────────────────────

pub struct StrReceiver;

impl Receiver for StrReceiver {
    fn name(&self) -> &str {
        "Str"
    }

    fn call(&self, func: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
        // Ok(None) → not ours; `.transpose()` turns that into None.
        fn inner(func: &str, args: &[Value]) -> Result<Option<Value>, ScriptError> {
            Ok(Some(match func.to_ascii_lowercase().as_str() {
                "strlen" => Value::I32(str_arg(args, 0, func)?.chars().count() as i32),
                "strcat" => {
                    let mut out = String::new();
                    for a in args {
                        out.push_str(&a.to_string());
                    }
                    Value::Str(out)
                }
                "substr" => {
                    let s: Vec<char> = str_arg(args, 0, func)?.chars().collect();
                    let start = (int_arg(args, 1, func)?.max(0) as usize).min(s.len());
                    let end = match args.get(2) {
                        Some(n) => start.saturating_add(to::<i64>(n)?.max(0) as usize).min(s.len()),
                        None => s.len(),
                    };
                    Value::Str(s[start..end].iter().collect())
                }
                "strstr" => {
                    let hay = str_arg(args, 0, func)?;
                    let needle = str_arg(args, 1, func)?;
                    Value::I32(match hay.find(&needle) {
                        Some(b) => hay[..b].chars().count() as i32,
                        None => -1,
                    })
                }
                "tolower" => Value::Str(str_arg(args, 0, func)?.to_lowercase()),
                "toupper" => Value::Str(str_arg(args, 0, func)?.to_uppercase()),
                "trim" => Value::Str(str_arg(args, 0, func)?.trim().to_owned()),
                "replace" => {
                    let s = str_arg(args, 0, func)?;
                    let from = str_arg(args, 1, func)?;
                    let with = str_arg(args, 2, func)?;
                    if from.is_empty() {
                        Value::Str(s)
                    } else {
                        Value::Str(s.replace(&from, &with))
                    }
                }
                "typeof" => Value::Str(arg(args, 0, func)?.type_name()),
                "isnull" => Value::Bool(arg(args, 0, func)?.is_null()),
                "like" | "match" => {
                    let text = str_arg(args, 0, func)?;
                    let pat = str_arg(args, 1, func)?;
                    let mode = if func.eq_ignore_ascii_case("like") {
                        MatchMode::Glob
                    } else {
                        MatchMode::Regex
                    };
                    let p = Pattern::new(&pat, mode)
                        .map_err(|e| ScriptError::runtime(format!("{func}: {e}")))?;
                    Value::Bool(p.matches(&text))
                }
                _ => return Ok(None),
            }))
        }
        inner(func, args).transpose()
    }
}

// ── Math ──────────────────────────────────────────────────────────────────────

pub struct MathReceiver;

fn pick(args: &[Value], func: &str, want: Ordering) -> Result<Value, ScriptError> {
    let mut best = arg(args, 0, func)?;
    for v in &args[1..] {
        match ops::compare(v, best) {
            Some(o) if o == want => best = v,
            Some(_) => {}
            None => {
                return Err(ScriptError::runtime(format!(
                    "{func}: cannot compare {} and {}",
                    v.type_name(),
                    best.type_name()
                )))
            }
        }
    }
    Ok(best.clone())
}

fn round(v: &Value, digits: u32, strategy: RoundingStrategy) -> Result<Value, ScriptError> {
    Ok(match v {
        Value::Decimal(d) => Value::Decimal(d.round_dp_with_strategy(digits, strategy)),
        Value::F32(_) | Value::F64(_) => {
            let x = v.as_f64().unwrap_or_default();
            let scale = 10f64.powi(digits as i32);
            let scaled = x * scale;
            let r = match strategy {
                RoundingStrategy::ToNegativeInfinity => scaled.floor(),
                RoundingStrategy::ToPositiveInfinity => scaled.ceil(),
                _ => scaled.round_ties_even(),
            };
            Value::F64(r / scale)
        }
        other if other.is_integer() => other.clone(),
        other => {
            let d: Decimal = to(other)?;
            Value::Decimal(d.round_dp_with_strategy(digits, strategy))
        }
    })
}

impl Receiver for MathReceiver {
    fn name(&self) -> &str {
        "Math"
    }

    fn property(&self, name: &str) -> Option<Value> {
        match name.to_ascii_lowercase().as_str() {
            "pi" => Some(Value::F64(std::f64::consts::PI)),
            "e" => Some(Value::F64(std::f64::consts::E)),
            _ => None,
        }
    }

    fn call(&self, func: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
        fn inner(func: &str, args: &[Value]) -> Result<Option<Value>, ScriptError> {
            Ok(Some(match func.to_ascii_lowercase().as_str() {
                "max" => pick(args, func, Ordering::Greater)?,
                "min" => pick(args, func, Ordering::Less)?,
                "abs" => {
                    let v = arg(args, 0, func)?;
                    if ops::compare(v, &Value::I32(0)) == Some(Ordering::Less) {
                        ops::unary(ops::UnaryOp::Neg, v)?
                    } else {
                        v.clone()
                    }
                }
                "round" => {
                    let digits = match args.get(1) {
                        Some(d) => to::<u32>(d)?,
                        None => 0,
                    };
                    round(arg(args, 0, func)?, digits, RoundingStrategy::MidpointNearestEven)?
                }
                "floor" => round(arg(args, 0, func)?, 0, RoundingStrategy::ToNegativeInfinity)?,
                "ceiling" => round(arg(args, 0, func)?, 0, RoundingStrategy::ToPositiveInfinity)?,
                "sqrt" => Value::F64(float_arg(args, 0, func)?.sqrt()),
                "pow" => Value::F64(float_arg(args, 0, func)?.powf(float_arg(args, 1, func)?)),
                _ => return Ok(None),
            }))
        }
        inner(func, args).transpose()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn str_call(func: &str, args: &[Value]) -> Value {
        StrReceiver.call(func, args).expect("not a builtin").unwrap()
    }

    fn math_call(func: &str, args: &[Value]) -> Value {
        MathReceiver.call(func, args).expect("not a builtin").unwrap()
    }

    #[test]
    fn string_functions() {
        assert_eq!(str_call("strlen", &[Value::from("héllo")]), Value::I32(5));
        assert_eq!(str_call("substr", &[Value::from("hello"), Value::I32(1), Value::I32(3)]), Value::from("ell"));
        assert_eq!(str_call("substr", &[Value::from("hi"), Value::I32(5)]), Value::from(""));
        assert_eq!(str_call("strstr", &[Value::from("hello"), Value::from("ll")]), Value::I32(2));
        assert_eq!(str_call("strcat", &[Value::from("a"), Value::I32(1)]), Value::from("a1"));
        assert_eq!(str_call("typeof", &[Value::I64(1)]), Value::from("long"));
        assert_eq!(str_call("isnull", &[Value::Null]), Value::Bool(true));
    }

    #[test]
    fn pattern_functions() {
        assert_eq!(str_call("like", &[Value::from("report.TXT"), Value::from("*.txt")]), Value::Bool(true));
        assert_eq!(str_call("match", &[Value::from("abc123"), Value::from(r"\d+$")]), Value::Bool(true));
        assert!(StrReceiver.call("match", &[Value::from("x"), Value::from("(")]).unwrap().is_err());
    }

    #[test]
    fn math_functions() {
        assert_eq!(math_call("Max", &[Value::I32(1), Value::I32(7), Value::I32(3)]), Value::I32(7));
        assert_eq!(math_call("min", &[Value::F64(1.5), Value::I32(1)]), Value::I32(1));
        assert_eq!(math_call("Abs", &[Value::I32(-4)]), Value::I32(4));
        assert_eq!(math_call("Round", &[Value::F64(2.5)]), Value::F64(2.0));
        assert_eq!(math_call("Round", &[Value::F64(1.2345), Value::I32(2)]), Value::F64(1.23));
        assert_eq!(math_call("Floor", &[Value::F64(-1.5)]), Value::F64(-2.0));
        assert_eq!(math_call("Ceiling", &[Value::F64(1.1)]), Value::F64(2.0));
        assert_eq!(math_call("Pow", &[Value::I32(2), Value::I32(10)]), Value::F64(1024.0));
        assert_eq!(MathReceiver.property("PI"), Some(Value::F64(std::f64::consts::PI)));
    }

    #[test]
    fn unknown_function_returns_none() {
        assert!(StrReceiver.call("nope", &[]).is_none());
        assert!(MathReceiver.call("nope", &[]).is_none());
    }

    #[test]
    fn missing_argument_is_runtime_error() {
        let err = StrReceiver.call("strlen", &[]).unwrap().unwrap_err();
        assert!(err.catchable().is_ok());
    }
}
