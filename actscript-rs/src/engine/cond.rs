//! Conditions and the [`If`] node.
//!
//! A [`Condition`] holds any subset of the probes below and always tests
//! them in this order, whatever order they were added in:
//!
//! | Probe | True when the (expanded) text… |
//! |-------|--------------------------------|
//! | `IsSet` / `IsNotSet` | names a variable that is (not) set |
//! | `IsNull` / `IsNotNull` | is (not) null |
//! | `IsZero` / `IsNotZero` | converts to a number equal (unequal) to 0 |
//! | `IsTrue` / `IsFalse` | converts to `true` / `false` |
//! | `IsEmpty` / `IsNotEmpty` | is null or `""` / anything else |
//! | `IsFile` / `IsNotFile` | names an existing file / does not |
//! | `IsDirectory` / `IsNotDirectory` | names an existing directory / does not |
//! | `Condition` | is an expression that evaluates truthy (not expanded) |
//!
//! With `all` (the default) the first failing probe makes the condition
//! false; otherwise the first succeeding probe makes it true.  A condition
//! without probes is true.

use std::path::Path;

use super::action::{run_all, Action, ActionRef, ExecResult};
use super::context::ScriptContext;
use crate::error::ScriptError;
use crate::script::coerce::to;
use crate::script::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Probe {
    IsSet,
    IsNotSet,
    IsNull,
    IsNotNull,
    IsZero,
    IsNotZero,
    IsTrue,
    IsFalse,
    IsEmpty,
    IsNotEmpty,
    IsFile,
    IsNotFile,
    IsDirectory,
    IsNotDirectory,
    Condition,
}

impl Probe {
    fn test(self, ctx: &mut ScriptContext, text: &str) -> Result<bool, ScriptError> {
        let value = match self {
            Probe::Condition => ctx.eval(text)?,
            _ => ctx.expand(text)?,
        };
        Ok(match self {
            Probe::IsSet => ctx.is_set(&value.to_string())?,
            Probe::IsNotSet => !ctx.is_set(&value.to_string())?,
            Probe::IsNull => value.is_null(),
            Probe::IsNotNull => !value.is_null(),
            Probe::IsZero => to::<f64>(&value)? == 0.0,
            Probe::IsNotZero => to::<f64>(&value)? != 0.0,
            Probe::IsTrue => to::<bool>(&value)?,
            Probe::IsFalse => !to::<bool>(&value)?,
            Probe::IsEmpty => is_empty(&value),
            Probe::IsNotEmpty => !is_empty(&value),
            Probe::IsFile => Path::new(&value.to_string()).is_file(),
            Probe::IsNotFile => !Path::new(&value.to_string()).is_file(),
            Probe::IsDirectory => Path::new(&value.to_string()).is_dir(),
            Probe::IsNotDirectory => !Path::new(&value.to_string()).is_dir(),
            Probe::Condition => value.is_truthy(),
        })
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Str(s) => s.is_empty(),
        other => other.to_string().is_empty(),
    }
}

#[derive(Debug, Clone)]
pub struct Condition {
    /// Sorted by probe; at most one entry per probe.
    probes: Vec<(Probe, String)>,
    all: bool,
}

impl Default for Condition {
    fn default() -> Self {
        Condition {
            probes: Vec::new(),
            all: true,
        }
    }
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a condition with only a `Condition` expression.
    pub fn expr(text: impl Into<String>) -> Self {
        Self::new().with(Probe::Condition, text)
    }

    /// Add (or replace) a probe.
    pub fn with(mut self, probe: Probe, text: impl Into<String>) -> Self {
        let text = text.into();
        match self.probes.binary_search_by_key(&probe, |(p, _)| *p) {
            Ok(i) => self.probes[i].1 = text,
            Err(i) => self.probes.insert(i, (probe, text)),
        }
        self
    }

    /// Switch to "any probe" semantics.
    pub fn any(mut self) -> Self {
        self.all = false;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn compile(&self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        for (probe, text) in &self.probes {
            if *probe == Probe::Condition {
                ctx.precompile(text)?;
            }
        }
        Ok(())
    }

    pub fn eval(&self, ctx: &mut ScriptContext) -> Result<bool, ScriptError> {
        for (probe, text) in &self.probes {
            let hit = probe.test(ctx, text)?;
            if hit != self.all {
                return Ok(hit);
            }
        }
        Ok(self.all || self.probes.is_empty())
    }
}

// ── If ────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct If {
    id: Option<String>,
    condition: Condition,
    body: Vec<ActionRef>,
    otherwise: Option<Vec<ActionRef>>,
}

impl If {
    pub fn new(condition: Condition, body: Vec<ActionRef>) -> Self {
        If {
            id: None,
            condition,
            body,
            otherwise: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_else(mut self, items: Vec<ActionRef>) -> Self {
        self.otherwise = Some(items);
        self
    }
}

impl Action for If {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn kind(&self) -> &'static str {
        "If"
    }

    fn compile(&self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.condition.compile(ctx)
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        if self.condition.eval(ctx)? {
            run_all(ctx, &self.body)
        } else if let Some(items) = &self.otherwise {
            run_all(ctx, items)
        } else {
            Ok(None)
        }
    }

    fn for_all_children(&self, visit: &mut dyn FnMut(&ActionRef)) {
        self.body.iter().for_each(&mut *visit);
        if let Some(items) = &self.otherwise {
            items.iter().for_each(visit);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::node;
    use crate::engine::basic::Set;

    fn check(ctx: &mut ScriptContext, cond: Condition) -> bool {
        cond.eval(ctx).unwrap()
    }

    #[test]
    fn no_probes_is_true() {
        let mut ctx = ScriptContext::new();
        assert!(check(&mut ctx, Condition::new()));
        assert!(check(&mut ctx, Condition::new().any()));
    }

    #[test]
    fn value_probes() {
        let mut ctx = ScriptContext::new();
        ctx.set("zero", 0).unwrap();
        ctx.set("text", "abc").unwrap();
        ctx.set("flag", "true").unwrap();
        ctx.set("nothing", Value::Null).unwrap();

        assert!(check(&mut ctx, Condition::new().with(Probe::IsSet, "zero")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsNotSet, "missing")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsZero, "${zero}")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsNotZero, "5")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsTrue, "${flag}")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsNull, "${nothing}")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsEmpty, "")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsNotEmpty, "${text}")));
        assert!(check(&mut ctx, Condition::expr("$text.Length == 3")));
        assert!(!check(&mut ctx, Condition::expr("$zero")));
    }

    #[test]
    fn all_and_any() {
        let mut ctx = ScriptContext::new();
        let failing_then_faulting = Condition::new()
            .with(Probe::IsSet, "missing")
            .with(Probe::Condition, "1/0 == 1");
        // `IsSet` fails first, so the faulting expression never runs
        assert!(!check(&mut ctx, failing_then_faulting.clone()));
        assert!(failing_then_faulting.any().eval(&mut ctx).is_err());

        let passing_then_faulting = Condition::new()
            .with(Probe::Condition, "1/0 == 1")
            .with(Probe::IsNotSet, "missing")
            .any();
        // probe order is fixed, not insertion order
        assert!(check(&mut ctx, passing_then_faulting));
    }

    #[test]
    fn filesystem_probes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let mut ctx = ScriptContext::new();
        ctx.set("dir", dir.path().display().to_string()).unwrap();
        ctx.set("file", file.display().to_string()).unwrap();

        assert!(check(&mut ctx, Condition::new().with(Probe::IsFile, "${file}")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsNotFile, "${dir}")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsDirectory, "${dir}")));
        assert!(check(&mut ctx, Condition::new().with(Probe::IsNotDirectory, "${file}")));
    }

    #[test]
    fn if_runs_body_or_else() {
        let mut ctx = ScriptContext::new();
        ctx.set("n", 3).unwrap();
        let action = node(
            If::new(Condition::expr("$n > 2"), vec![node(Set::new("r", "big"))])
                .with_else(vec![node(Set::new("r", "small"))]),
        );
        ctx.execute(&action).unwrap();
        assert_eq!(ctx.get("r").unwrap(), Some(Value::from("big")));
        ctx.set("n", 1).unwrap();
        ctx.execute(&action).unwrap();
        assert_eq!(ctx.get("r").unwrap(), Some(Value::from("small")));
    }

    #[test]
    fn compile_reports_bad_expressions() {
        let mut ctx = ScriptContext::new();
        let action = node(If::new(Condition::expr("1 2 +"), vec![]));
        assert!(ctx.compile(&action).is_err());
    }
}
