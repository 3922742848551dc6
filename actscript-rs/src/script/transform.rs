//! Value transformation: expansion plus text post-processing.
//!
//! Order of application:
//!
//! 1. `TRIM_BEFORE`: trim the source text (using the trim flags) before
//!    anything else, instead of after expansion.
//! 2. Expansion: every enabled style in one left-to-right pass, so
//!    expanded values are never expanded again.  A typed (non-string)
//!    result ends the pipeline and is returned as is.
//! 3. Text rules: trims, `TRIM_INTERNAL`, `REMOVE_CONTROL`, newline
//!    normalisation, `TAB_TO_SPACES`.
//! 4. Replace rules, in declaration order.

use bitflags::bitflags;

use super::expand::{expand_styles, Delimiters};
use super::expr::EvalContext;
use super::value::Value;
use crate::error::ScriptError;
use crate::pattern::Pattern;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransformRules: u32 {
        /// `${…}`
        const EXPAND             = 1 << 0;
        /// `${{…}}`
        const EXPAND_DUAL        = 1 << 1;
        /// `[…]`
        const EXPAND_SQUARE      = 1 << 2;
        /// `[[…]]`
        const EXPAND_DUAL_SQUARE = 1 << 3;
        const TRIM_BEFORE        = 1 << 4;
        const TRIM_START         = 1 << 5;
        const TRIM_END           = 1 << 6;
        const TRIM               = Self::TRIM_START.bits() | Self::TRIM_END.bits();
        /// Collapse runs of whitespace into one space.
        const TRIM_INTERNAL      = 1 << 7;
        /// Drop control characters other than `\n`, `\r` and `\t`.
        const REMOVE_CONTROL     = 1 << 8;
        const NEWLINE_TO_LF      = 1 << 9;
        const NEWLINE_TO_CRLF    = 1 << 10;
        const TAB_TO_SPACES      = 1 << 11;
    }
}

impl Default for TransformRules {
    fn default() -> Self {
        TransformRules::EXPAND
    }
}

/// Width used by `TAB_TO_SPACES`.
pub const TAB_WIDTH: usize = 4;

/// A `pattern → replacement` rule applied after the flag rules.
#[derive(Debug, Clone)]
pub struct ReplaceRule {
    pub pattern: Pattern,
    pub replacement: String,
}

/// Apply `rules` and `replaces` to `value`.  Non-string values pass through.
pub fn transform(
    value: &Value,
    rules: TransformRules,
    replaces: &[ReplaceRule],
    ctx: &mut dyn EvalContext,
) -> Result<Value, ScriptError> {
    let Value::Str(src) = value else {
        return Ok(value.clone());
    };

    let mut text = if rules.contains(TransformRules::TRIM_BEFORE) {
        trim(src, rules).to_owned()
    } else {
        src.clone()
    };

    let styles: Vec<Delimiters> = [
        (TransformRules::EXPAND_DUAL, Delimiters::DoubleBrace),
        (TransformRules::EXPAND, Delimiters::Brace),
        (TransformRules::EXPAND_DUAL_SQUARE, Delimiters::DoubleSquare),
        (TransformRules::EXPAND_SQUARE, Delimiters::Square),
    ]
    .into_iter()
    .filter(|(flag, _)| rules.contains(*flag))
    .map(|(_, style)| style)
    .collect();
    if !styles.is_empty() {
        match expand_styles(&text, &styles, ctx)? {
            Value::Str(s) => text = s,
            typed => return Ok(typed),
        }
    }

    Ok(Value::Str(post_process(text, rules, replaces)))
}

fn trim(s: &str, rules: TransformRules) -> &str {
    match (
        rules.contains(TransformRules::TRIM_START),
        rules.contains(TransformRules::TRIM_END),
    ) {
        (true, true) => s.trim(),
        (true, false) => s.trim_start(),
        (false, true) => s.trim_end(),
        // TRIM_BEFORE on its own trims both ends
        (false, false) if rules.contains(TransformRules::TRIM_BEFORE) => s.trim(),
        (false, false) => s,
    }
}

/// Flag-driven text rules, then replacements.
pub fn post_process(mut text: String, rules: TransformRules, replaces: &[ReplaceRule]) -> String {
    if !rules.contains(TransformRules::TRIM_BEFORE) {
        let trimmed = trim(&text, rules);
        if trimmed.len() != text.len() {
            text = trimmed.to_owned();
        }
    }
    if rules.contains(TransformRules::TRIM_INTERNAL) {
        text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    if rules.contains(TransformRules::REMOVE_CONTROL) {
        text.retain(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'));
    }
    if rules.intersects(TransformRules::NEWLINE_TO_LF | TransformRules::NEWLINE_TO_CRLF) {
        let lf = text.replace("\r\n", "\n").replace('\r', "\n");
        text = if rules.contains(TransformRules::NEWLINE_TO_CRLF) {
            lf.replace('\n', "\r\n")
        } else {
            lf
        };
    }
    if rules.contains(TransformRules::TAB_TO_SPACES) {
        text = text.replace('\t', &" ".repeat(TAB_WIDTH));
    }
    for r in replaces {
        text = r.pattern.replace_all(&text, &r.replacement);
    }
    text
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::MatchMode;
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

    fn run(src: &str, rules: TransformRules) -> Value {
        let mut ctx = TestCtx::default();
        ctx.vars.insert("x".into(), Value::from("  padded  "));
        ctx.vars.insert("n".into(), Value::I32(5));
        transform(&Value::from(src), rules, &[], &mut ctx).unwrap()
    }

    #[test]
    fn trim_after_expansion_sees_expanded_text() {
        let rules = TransformRules::EXPAND | TransformRules::TRIM;
        assert_eq!(run("${x}!", rules), Value::from("padded  !"));
        assert_eq!(run(" a${n} ", rules), Value::from("a5"));
    }

    #[test]
    fn trim_before_leaves_expanded_whitespace() {
        let rules = TransformRules::EXPAND | TransformRules::TRIM_BEFORE;
        assert_eq!(run("  [${x}]  ", rules), Value::from("[  padded  ]"));
    }

    #[test]
    fn typed_result_skips_text_rules() {
        let rules = TransformRules::EXPAND | TransformRules::TRIM;
        assert_eq!(run("${n}", rules), Value::I32(5));
    }

    #[test]
    fn combined_styles_keep_values_literal() {
        let mut ctx = TestCtx::default();
        ctx.vars.insert("user".into(), Value::from("${secret}"));
        ctx.vars.insert("secret".into(), Value::from("S"));
        let rules = TransformRules::EXPAND_DUAL | TransformRules::EXPAND;
        let out = transform(&Value::from("hi ${{user}}"), rules, &[], &mut ctx).unwrap();
        assert_eq!(out, Value::from("hi ${secret}"));
        let out = transform(&Value::from("${user}!"), rules, &[], &mut ctx).unwrap();
        assert_eq!(out, Value::from("${secret}!"));
    }

    #[test]
    fn text_rules() {
        assert_eq!(run("a  b\t\tc", TransformRules::TRIM_INTERNAL), Value::from("a b c"));
        assert_eq!(run("a\u{7}b", TransformRules::REMOVE_CONTROL), Value::from("ab"));
        assert_eq!(run("a\r\nb\rc", TransformRules::NEWLINE_TO_LF), Value::from("a\nb\nc"));
        assert_eq!(run("a\nb", TransformRules::NEWLINE_TO_CRLF), Value::from("a\r\nb"));
        assert_eq!(run("\tx", TransformRules::TAB_TO_SPACES), Value::from("    x"));
        assert_eq!(run("${x}", TransformRules::empty()), Value::from("${x}"));
    }

    #[test]
    fn replace_rules_run_last() {
        let mut ctx = TestCtx::default();
        ctx.vars.insert("n".into(), Value::I32(5));
        let rules = [ReplaceRule {
            pattern: Pattern::new(r"\d", MatchMode::Regex).unwrap(),
            replacement: "#".into(),
        }];
        let out = transform(&Value::from("n=${n}"), TransformRules::EXPAND, &rules, &mut ctx).unwrap();
        assert_eq!(out, Value::from("n=#"));
    }

    #[test]
    fn non_strings_pass_through() {
        let mut ctx = TestCtx::default();
        let v = transform(&Value::I64(3), TransformRules::all(), &[], &mut ctx).unwrap();
        assert_eq!(v, Value::I64(3));
    }
}
