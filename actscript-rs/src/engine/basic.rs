//! Leaf actions.

use super::action::{Action, ExecResult, Signal};
use super::context::ScriptContext;
use crate::error::ScriptError;
use crate::script::transform::TransformRules;
use crate::script::Value;

/// Leave the nearest call boundary.  The value text is expanded; without
/// one the result is null.
#[derive(Debug, Default)]
pub struct Return {
    value: Option<String>,
}

impl Return {
    pub fn new(value: impl Into<String>) -> Self {
        Return {
            value: Some(value.into()),
        }
    }
}

impl Action for Return {
    fn kind(&self) -> &'static str {
        "Return"
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        let value = match &self.value {
            Some(text) => ctx.expand(text)?,
            None => Value::Null,
        };
        Ok(Some(Signal::Return(value)))
    }
}

#[derive(Debug, Default)]
pub struct Break;

impl Action for Break {
    fn kind(&self) -> &'static str {
        "Break"
    }

    fn execute(&self, _ctx: &mut ScriptContext) -> ExecResult {
        Ok(Some(Signal::Break))
    }
}

// ── Set ───────────────────────────────────────────────────────────────────────

/// Assign a transformed value, or unset the variable when there is none.
#[derive(Debug)]
pub struct Set {
    name: String,
    value: Option<String>,
    rules: TransformRules,
}

impl Set {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Set {
            name: name.into(),
            value: Some(value.into()),
            rules: TransformRules::default(),
        }
    }

    pub fn unset(name: impl Into<String>) -> Self {
        Set {
            name: name.into(),
            value: None,
            rules: TransformRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: TransformRules) -> Self {
        self.rules = rules;
        self
    }
}

impl Action for Set {
    fn kind(&self) -> &'static str {
        "Set"
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        match &self.value {
            Some(text) => {
                let value = ctx.transform(&Value::from(text.as_str()), self.rules)?;
                ctx.set(&self.name, value)?;
            }
            None => {
                ctx.unset(&self.name);
            }
        }
        Ok(None)
    }
}

// ── Print ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Print {
    text: String,
    rules: TransformRules,
}

impl Print {
    pub fn new(text: impl Into<String>) -> Self {
        Print {
            text: text.into(),
            rules: TransformRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: TransformRules) -> Self {
        self.rules = rules;
        self
    }
}

impl Action for Print {
    fn kind(&self) -> &'static str {
        "Print"
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        let line = ctx.transform(&Value::from(self.text.as_str()), self.rules)?;
        ctx.write_line(&line.to_string())?;
        Ok(None)
    }
}

// ── Eval ──────────────────────────────────────────────────────────────────────

/// Evaluate an expression for its effect, optionally keeping the result.
#[derive(Debug)]
pub struct Eval {
    expr: String,
    output: Option<String>,
}

impl Eval {
    pub fn new(expr: impl Into<String>) -> Self {
        Eval {
            expr: expr.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, var: impl Into<String>) -> Self {
        self.output = Some(var.into());
        self
    }
}

impl Action for Eval {
    fn kind(&self) -> &'static str {
        "Eval"
    }

    fn compile(&self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        ctx.precompile(&self.expr)
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        let value = ctx.eval(&self.expr)?;
        if let Some(var) = &self.output {
            ctx.set(var, value)?;
        }
        Ok(None)
    }
}

// ── Throw ─────────────────────────────────────────────────────────────────────

/// Raise a user fault with the expanded message.
#[derive(Debug)]
pub struct Throw {
    message: String,
}

impl Throw {
    pub fn new(message: impl Into<String>) -> Self {
        Throw {
            message: message.into(),
        }
    }
}

impl Action for Throw {
    fn kind(&self) -> &'static str {
        "Throw"
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        let message = ctx.expand(&self.message)?;
        Err(ScriptError::user(message.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::node;
    use crate::engine::Output;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_keeps_typed_values_and_unsets() {
        let mut ctx = ScriptContext::new();
        ctx.execute(&node(Set::new("n", "${=2*3}"))).unwrap();
        assert_eq!(ctx.get("n").unwrap(), Some(Value::I32(6)));
        ctx.execute(&node(Set::new("s", "  n=${n}  ").with_rules(TransformRules::EXPAND | TransformRules::TRIM)))
            .unwrap();
        assert_eq!(ctx.get("s").unwrap(), Some(Value::from("n=6")));
        ctx.execute(&node(Set::unset("n"))).unwrap();
        assert!(!ctx.is_set("n").unwrap());
    }

    #[test]
    fn print_writes_to_current_output() {
        let mut ctx = ScriptContext::new();
        ctx.set("who", "world").unwrap();
        ctx.push_output(Output::capture());
        ctx.execute(&node(Print::new("hello ${who}"))).unwrap();
        ctx.execute(&node(Print::new("${=1 == 1}"))).unwrap();
        assert_eq!(ctx.pop_output().unwrap().into_lines(), vec!["hello world", "true"]);
    }

    #[test]
    fn eval_stores_result() {
        let mut ctx = ScriptContext::new();
        ctx.execute(&node(Eval::new("'ab'.ToUpper()").with_output("r"))).unwrap();
        assert_eq!(ctx.get("r").unwrap(), Some(Value::from("AB")));
        assert!(ctx.compile(&node(Eval::new("(1 2 +)"))).is_err());
    }

    #[test]
    fn return_break_and_throw() {
        let mut ctx = ScriptContext::new();
        assert_eq!(
            ctx.execute(&node(Return::default())).unwrap(),
            Some(Signal::Return(Value::Null))
        );
        assert_eq!(ctx.execute(&node(Break)).unwrap(), Some(Signal::Break));
        let err = ctx.execute(&node(Throw::new("no ${=1+1}"))).unwrap_err();
        assert_eq!(err.innermost(), &ScriptError::user("no 2"));
    }
}
