//! Variable expansion: `${…}`, `${{…}}`, `[…]` and `[[…]]` markers.
//!
//! | Style | Marker | Literal escape |
//! |-------|--------|----------------|
//! | [`Delimiters::Brace`]        | `${expr}`   | `${{` → `${`   |
//! | [`Delimiters::DoubleBrace`]  | `${{expr}}` | `${{{` → `${{` |
//! | [`Delimiters::Square`]       | `[expr]`    | `[[` → `[`     |
//! | [`Delimiters::DoubleSquare`] | `[[expr]]`  | `[[[` → `[[`   |
//!
//! The marker body is a multi-expression (`a|b|=expr`).  When the whole
//! source is exactly one marker the typed value comes back unchanged;
//! otherwise every marker is stringified into the surrounding text.
//! Several styles can be expanded together with [`expand_styles`].

use super::cursor::Cursor;
use super::expr::{evaluate, EvalContext};
use super::parser::parse_multi_at;
use super::value::Value;
use crate::error::{ParseError, ScriptError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiters {
    Brace,
    DoubleBrace,
    Square,
    DoubleSquare,
}

impl Delimiters {
    pub fn open(self) -> &'static str {
        match self {
            Delimiters::Brace => "${",
            Delimiters::DoubleBrace => "${{",
            Delimiters::Square => "[",
            Delimiters::DoubleSquare => "[[",
        }
    }

    pub fn close(self) -> &'static str {
        match self {
            Delimiters::Brace => "}",
            Delimiters::DoubleBrace => "}}",
            Delimiters::Square => "]",
            Delimiters::DoubleSquare => "]]",
        }
    }

    /// Character that, right after the open sequence, marks a literal escape.
    fn escape(self) -> char {
        match self {
            Delimiters::Brace | Delimiters::DoubleBrace => '{',
            Delimiters::Square | Delimiters::DoubleSquare => '[',
        }
    }

    fn terminator(self) -> char {
        match self {
            Delimiters::Brace | Delimiters::DoubleBrace => '}',
            Delimiters::Square | Delimiters::DoubleSquare => ']',
        }
    }
}

/// Expand every marker of `style` in `src`.
pub fn expand(src: &str, style: Delimiters, ctx: &mut dyn EvalContext) -> Result<Value, ScriptError> {
    expand_styles(src, &[style], ctx)
}

/// Expand markers of any of `styles` in a single left-to-right pass.
///
/// Where several open sequences match at the same position the longest one
/// wins, so with both brace styles enabled `${{` always opens a
/// [`Delimiters::DoubleBrace`] marker.  Expanded values are copied to the
/// output and never scanned again.
pub fn expand_styles(
    src: &str,
    styles: &[Delimiters],
    ctx: &mut dyn EvalContext,
) -> Result<Value, ScriptError> {
    if !styles.iter().any(|s| src.contains(s.open())) {
        return Ok(Value::Str(src.to_owned()));
    }

    let mut cursor = Cursor::new(src);
    let mut out = String::with_capacity(src.len());
    while let Some(c) = cursor.peek() {
        let style = styles
            .iter()
            .copied()
            .filter(|s| cursor.starts_with(s.open()))
            .max_by_key(|s| s.open().len());
        let Some(style) = style else {
            out.push(c);
            cursor.read();
            continue;
        };
        let open = style.open();
        let close = style.close();

        let marker_start = cursor.pos();
        cursor.set_pos(marker_start + open.chars().count());
        if cursor.eat(style.escape()) {
            out.push_str(open);
            continue;
        }

        let op = parse_multi_at(&mut cursor, &[style.terminator()])?;
        cursor.skip_whitespace();
        if !cursor.starts_with(close) {
            return Err(ParseError::new(format!("expected '{close}'"), cursor.pos())
                .with_source(src)
                .into());
        }
        cursor.set_pos(cursor.pos() + close.chars().count());

        let value = evaluate(&op, ctx)?;
        if marker_start == 0 && cursor.is_eof() {
            return Ok(value);
        }
        out.push_str(&value.to_string());
    }
    Ok(Value::Str(out))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[derive(Default)]
    struct TestCtx {
        vars: FxHashMap<String, Value>,
    }

    impl EvalContext for TestCtx {
        fn get_var(&mut self, name: &str) -> Result<Option<Value>, ScriptError> {
            Ok(self.vars.get(name).cloned())
        }
        fn set_var(&mut self, name: &str, value: Value) -> Result<(), ScriptError> {
            self.vars.insert(name.to_owned(), value);
            Ok(())
        }
        fn call(&mut self, name: &str, _args: Vec<Value>) -> Result<Value, ScriptError> {
            Err(ScriptError::runtime(format!("no function {name}")))
        }
    }

    fn ctx() -> TestCtx {
        let mut c = TestCtx::default();
        c.vars.insert("v_int".into(), Value::I32(1));
        c.vars.insert("name".into(), Value::from("world"));
        c
    }

    #[test]
    fn whole_marker_keeps_type() {
        assert_eq!(expand("${v_int}", Delimiters::Brace, &mut ctx()).unwrap(), Value::I32(1));
        assert_eq!(
            expand("x${v_int}", Delimiters::Brace, &mut ctx()).unwrap(),
            Value::from("x1")
        );
        assert_eq!(
            expand("${v_int} ", Delimiters::Brace, &mut ctx()).unwrap(),
            Value::from("1 ")
        );
    }

    #[test]
    fn several_markers_concatenate() {
        let v = expand("hello ${name}, ${=$v_int+1}!", Delimiters::Brace, &mut ctx()).unwrap();
        assert_eq!(v, Value::from("hello world, 2!"));
    }

    #[test]
    fn escapes_emit_the_open_sequence() {
        assert_eq!(
            expand("${{name}", Delimiters::Brace, &mut ctx()).unwrap(),
            Value::from("${name}")
        );
        assert_eq!(expand("[[x]", Delimiters::Square, &mut ctx()).unwrap(), Value::from("[x]"));
        assert_eq!(
            expand("a[[[b]]", Delimiters::DoubleSquare, &mut ctx()).unwrap(),
            Value::from("a[[b]]")
        );
    }

    #[test]
    fn other_styles() {
        assert_eq!(expand("${{name}}", Delimiters::DoubleBrace, &mut ctx()).unwrap(), Value::from("world"));
        assert_eq!(expand("<[name]>", Delimiters::Square, &mut ctx()).unwrap(), Value::from("<world>"));
        assert_eq!(expand("[[ name ]]", Delimiters::DoubleSquare, &mut ctx()).unwrap(), Value::from("world"));
    }

    #[test]
    fn fallbacks_inside_markers() {
        assert_eq!(
            expand("${missing|name}", Delimiters::Brace, &mut ctx()).unwrap(),
            Value::from("world")
        );
        assert_eq!(expand("[${missing|}]", Delimiters::Brace, &mut ctx()).unwrap(), Value::from("[]"));
    }

    #[test]
    fn unclosed_marker_is_parse_error() {
        let err = expand("${name", Delimiters::Brace, &mut ctx()).unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
        let err = expand("${=1+}", Delimiters::Brace, &mut ctx()).unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
    }

    #[test]
    fn mixed_styles_in_one_pass() {
        let styles = [Delimiters::DoubleBrace, Delimiters::Brace, Delimiters::Square];
        assert_eq!(
            expand_styles("${name} ${{v_int}} [=$v_int+1]", &styles, &mut ctx()).unwrap(),
            Value::from("world 1 2")
        );
        assert_eq!(expand_styles("[name]", &styles, &mut ctx()).unwrap(), Value::from("world"));
        assert_eq!(
            expand_styles("${name}", &[], &mut ctx()).unwrap(),
            Value::from("${name}")
        );
    }

    #[test]
    fn expanded_values_are_not_rescanned() {
        let mut c = ctx();
        c.vars.insert("user".into(), Value::from("${secret} [secret]"));
        c.vars.insert("secret".into(), Value::from("S"));
        let styles = [
            Delimiters::DoubleBrace,
            Delimiters::Brace,
            Delimiters::DoubleSquare,
            Delimiters::Square,
        ];
        assert_eq!(
            expand_styles("hi ${{user}}", &styles, &mut c).unwrap(),
            Value::from("hi ${secret} [secret]")
        );
        assert_eq!(
            expand_styles("hi ${user}", &styles, &mut c).unwrap(),
            Value::from("hi ${secret} [secret]")
        );
    }

    #[test]
    fn longest_open_sequence_wins() {
        let styles = [Delimiters::Brace, Delimiters::DoubleBrace];
        // `${{{` escapes the double style only
        assert_eq!(
            expand_styles("a ${{{name}}", &styles, &mut ctx()).unwrap(),
            Value::from("a ${{name}}")
        );
        let err = expand_styles("${{name}", &styles, &mut ctx()).unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
    }

    #[test]
    fn unset_variable_is_runtime_error() {
        let err = expand("a ${missing}", Delimiters::Brace, &mut ctx()).unwrap_err();
        assert!(err.catchable().is_ok());
    }
}
