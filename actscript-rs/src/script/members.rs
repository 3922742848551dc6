//! Member access, method calls and indexing on runtime values.
//!
//! Names are matched case-insensitively.  Strings and arrays get a fixed
//! set of members; objects dispatch through [`ScriptObject`].
//!
//! | Receiver | Members |
//! |----------|---------|
//! | any | `ToString()`, `Equals(x)`, `GetType()` |
//! | string | `Length`, `ToUpper`, `ToLower`, `Trim`, `TrimStart`, `TrimEnd`, `Substring`, `Contains`, `StartsWith`, `EndsWith`, `IndexOf`, `LastIndexOf`, `Replace`, `Split`, `PadLeft`, `PadRight`, `Insert`, `Remove` |
//! | array | `Length`, `Count`, `Contains`, `IndexOf` |
//!
//! [`ScriptObject`]: super::value::ScriptObject

use super::coerce::to;
use super::ops;
use super::value::{Value, MAX_ALLOC_LEN};
use crate::error::ScriptError;

fn no_member(v: &Value, name: &str) -> ScriptError {
    ScriptError::runtime(format!("'{}' has no member '{name}'", v.type_name()))
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    if args.len() < min || args.len() > max {
        return Err(ScriptError::runtime(format!(
            "'{name}' takes {min}..{max} arguments, {} given",
            args.len()
        )));
    }
    Ok(())
}

fn index_arg(args: &[Value], i: usize) -> Result<usize, ScriptError> {
    let n: i64 = to(&args[i])?;
    usize::try_from(n).map_err(|_| ScriptError::runtime(format!("index {n} is out of range")))
}

fn str_arg(args: &[Value], i: usize) -> Result<String, ScriptError> {
    Ok(to::<String>(&args[i])?)
}

/// Read a property.
pub fn get(v: &Value, name: &str) -> Result<Value, ScriptError> {
    let lname = name.to_ascii_lowercase();
    match (v, lname.as_str()) {
        (Value::Str(s), "length") => Ok(Value::I32(s.chars().count() as i32)),
        (Value::Array(items), "length" | "count") => Ok(Value::I32(items.len() as i32)),
        (Value::Object(o), _) => o.get_member(name).ok_or_else(|| no_member(v, name)),
        _ => Err(no_member(v, name)),
    }
}

/// Call a method.
pub fn call(v: &Value, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    if let Value::Object(o) = v {
        if let Some(result) = o.call_method(name, args) {
            return result;
        }
    }
    let lname = name.to_ascii_lowercase();
    match lname.as_str() {
        "tostring" => {
            arity(name, args, 0, 0)?;
            return Ok(Value::Str(v.to_string()));
        }
        "equals" => {
            arity(name, args, 1, 1)?;
            return Ok(Value::Bool(ops::equals(v, &args[0])));
        }
        "gettype" => {
            arity(name, args, 0, 0)?;
            return Ok(Value::Str(v.type_name()));
        }
        _ => {}
    }
    match v {
        Value::Str(s) => string_method(s, name, &lname, args),
        Value::Array(items) => array_method(items, name, &lname, args),
        _ => Err(no_member(v, name)),
    }
}

fn char_index(s: &str, byte_pos: Option<usize>) -> Value {
    match byte_pos {
        Some(b) => Value::I32(s[..b].chars().count() as i32),
        None => Value::I32(-1),
    }
}

fn trim_set(args: &[Value]) -> Result<Vec<char>, ScriptError> {
    let mut set = Vec::new();
    for a in args {
        set.extend(to::<String>(a)?.chars());
    }
    Ok(set)
}

fn string_method(s: &str, name: &str, lname: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let chars: Vec<char> = s.chars().collect();
    let v = match lname {
        "toupper" => Value::Str(s.to_uppercase()),
        "tolower" => Value::Str(s.to_lowercase()),
        "trim" | "trimstart" | "trimend" => {
            let set = trim_set(args)?;
            let pred = |c: char| if set.is_empty() { c.is_whitespace() } else { set.contains(&c) };
            Value::Str(
                match lname {
                    "trim" => s.trim_matches(pred),
                    "trimstart" => s.trim_start_matches(pred),
                    _ => s.trim_end_matches(pred),
                }
                .to_owned(),
            )
        }
        "substring" => {
            arity(name, args, 1, 2)?;
            let start = index_arg(args, 0)?;
            let len = if args.len() == 2 {
                index_arg(args, 1)?
            } else {
                chars.len().saturating_sub(start)
            };
            if start + len > chars.len() {
                return Err(ScriptError::runtime(format!(
                    "substring {start}+{len} is out of range for a string of length {}",
                    chars.len()
                )));
            }
            Value::Str(chars[start..start + len].iter().collect())
        }
        "contains" => {
            arity(name, args, 1, 1)?;
            Value::Bool(s.contains(str_arg(args, 0)?.as_str()))
        }
        "startswith" => {
            arity(name, args, 1, 1)?;
            Value::Bool(s.starts_with(str_arg(args, 0)?.as_str()))
        }
        "endswith" => {
            arity(name, args, 1, 1)?;
            Value::Bool(s.ends_with(str_arg(args, 0)?.as_str()))
        }
        "indexof" => {
            arity(name, args, 1, 1)?;
            char_index(s, s.find(str_arg(args, 0)?.as_str()))
        }
        "lastindexof" => {
            arity(name, args, 1, 1)?;
            char_index(s, s.rfind(str_arg(args, 0)?.as_str()))
        }
        "replace" => {
            arity(name, args, 2, 2)?;
            let from = str_arg(args, 0)?;
            if from.is_empty() {
                return Err(ScriptError::runtime("string to replace cannot be empty"));
            }
            Value::Str(s.replace(from.as_str(), &str_arg(args, 1)?))
        }
        "split" => {
            arity(name, args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                Some(sep) => {
                    let sep = to::<String>(sep)?;
                    if sep.is_empty() {
                        vec![Value::from(s)]
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
                None => s.split_whitespace().map(Value::from).collect(),
            };
            Value::Array(parts)
        }
        "padleft" | "padright" => {
            arity(name, args, 1, 2)?;
            let width = index_arg(args, 0)?;
            let fill = match args.get(1) {
                Some(c) => to::<char>(c)?,
                None => ' ',
            };
            if width > MAX_ALLOC_LEN {
                return Err(ScriptError::runtime(format!("padding width {width} is too large")));
            }
            let count = width.saturating_sub(chars.len());
            let mut pad = String::new();
            pad.try_reserve(count * fill.len_utf8())
                .map_err(|_| ScriptError::runtime(format!("cannot pad to width {width}")))?;
            pad.extend(std::iter::repeat(fill).take(count));
            Value::Str(if lname == "padleft" {
                format!("{pad}{s}")
            } else {
                format!("{s}{pad}")
            })
        }
        "insert" => {
            arity(name, args, 2, 2)?;
            let at = index_arg(args, 0)?;
            if at > chars.len() {
                return Err(ScriptError::runtime(format!("index {at} is out of range")));
            }
            let mut out: String = chars[..at].iter().collect();
            out.push_str(&str_arg(args, 1)?);
            out.extend(&chars[at..]);
            Value::Str(out)
        }
        "remove" => {
            arity(name, args, 1, 2)?;
            let start = index_arg(args, 0)?;
            let count = if args.len() == 2 {
                index_arg(args, 1)?
            } else {
                chars.len().saturating_sub(start)
            };
            if start + count > chars.len() {
                return Err(ScriptError::runtime(format!("index {start} is out of range")));
            }
            let mut out: String = chars[..start].iter().collect();
            out.extend(&chars[start + count..]);
            Value::Str(out)
        }
        _ => return Err(no_member(&Value::from(s), name)),
    };
    Ok(v)
}

fn array_method(items: &[Value], name: &str, lname: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match lname {
        "contains" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Bool(items.iter().any(|x| ops::equals(x, &args[0]))))
        }
        "indexof" => {
            arity(name, args, 1, 1)?;
            let pos = items.iter().position(|x| ops::equals(x, &args[0]));
            Ok(Value::I32(pos.map_or(-1, |p| p as i32)))
        }
        _ => Err(no_member(&Value::Array(items.to_vec()), name)),
    }
}

/// `target[index]`
pub fn index(target: &Value, index: &Value) -> Result<Value, ScriptError> {
    let out_of_range = |i: i64, len: usize| {
        ScriptError::runtime(format!("index {i} is out of range for length {len}"))
    };
    match target {
        Value::Array(items) => {
            let i: i64 = to(index)?;
            usize::try_from(i)
                .ok()
                .and_then(|u| items.get(u))
                .cloned()
                .ok_or_else(|| out_of_range(i, items.len()))
        }
        Value::Str(s) => {
            let i: i64 = to(index)?;
            usize::try_from(i)
                .ok()
                .and_then(|u| s.chars().nth(u))
                .map(Value::Char)
                .ok_or_else(|| out_of_range(i, s.chars().count()))
        }
        Value::Object(o) => o.index(index).unwrap_or_else(|| {
            Err(ScriptError::runtime(format!("'{}' cannot be indexed", o.type_name())))
        }),
        other => Err(ScriptError::runtime(format!(
            "'{}' cannot be indexed",
            other.type_name()
        ))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
