//! Subroutines: [`Sub`] declares, [`Call`] invokes.
//!
//! Argument binding works slot by slot over the declared parameters:
//!
//! - a named argument fills the parameter of that name (case-insensitive);
//!   naming an unknown or already-filled parameter is an error
//! - an unnamed argument fills the next parameter not yet filled; running
//!   out of parameters is an error
//! - unfilled parameters take their default (expanded in the caller),
//!   required ones without a default are an error, the rest stay unbound

use std::rc::Rc;

use rustc_hash::FxHashSet;
use tracing::debug;

use super::action::{describe, run_all, Action, ActionRef, ExecResult, Signal};
use super::callstack::Phase;
use super::context::{CallIsolation, ScriptContext};
use crate::error::{ParseError, ScriptError};
use crate::script::Value;

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    /// Expanded in the caller's scope when the argument is missing.
    pub default: Option<String>,
    pub required: bool,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            default: None,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.default = Some(text.into());
        self
    }
}

// ── Sub ───────────────────────────────────────────────────────────────────────

/// A callable body.  Executing a `Sub` in place does nothing.
#[derive(Debug)]
pub struct Sub {
    id: String,
    params: Vec<Param>,
    body: Vec<ActionRef>,
}

impl Sub {
    pub fn new(id: impl Into<String>, params: Vec<Param>, body: Vec<ActionRef>) -> Self {
        Sub {
            id: id.into(),
            params,
            body,
        }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Match `args` against the declared parameters.
    pub fn bind(
        &self,
        ctx: &mut ScriptContext,
        args: Vec<(Option<String>, Value)>,
    ) -> Result<Vec<(String, Value)>, ScriptError> {
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];

        for (name, value) in args {
            let index = match name {
                Some(name) => {
                    let index = self
                        .params
                        .iter()
                        .position(|p| p.name.eq_ignore_ascii_case(&name))
                        .ok_or_else(|| {
                            ScriptError::runtime(format!("sub '{}' has no parameter '{name}'", self.id))
                        })?;
                    if slots[index].is_some() {
                        return Err(ScriptError::runtime(format!(
                            "parameter '{name}' of sub '{}' is already set",
                            self.id
                        )));
                    }
                    index
                }
                None => slots.iter().position(Option::is_none).ok_or_else(|| {
                    ScriptError::runtime(format!(
                        "too many arguments for sub '{}' ({} parameters)",
                        self.id,
                        self.params.len()
                    ))
                })?,
            };
            slots[index] = Some(value);
        }

        let mut bound = Vec::with_capacity(self.params.len());
        for (param, slot) in self.params.iter().zip(slots) {
            let value = match (slot, &param.default) {
                (Some(v), _) => v,
                (None, Some(text)) => ctx.expand(text)?,
                (None, None) if param.required => {
                    return Err(ScriptError::runtime(format!(
                        "required parameter '{}' of sub '{}' is missing",
                        param.name, self.id
                    )))
                }
                (None, None) => continue,
            };
            bound.push((param.name.clone(), value));
        }
        Ok(bound)
    }

    /// Run the body; a `Return` becomes the result, anything else is null.
    pub fn invoke(&self, ctx: &mut ScriptContext) -> Result<Value, ScriptError> {
        match run_all(ctx, &self.body)? {
            Some(Signal::Return(v)) => Ok(v),
            Some(Signal::Break) | None => Ok(Value::Null),
        }
    }
}

impl Action for Sub {
    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn kind(&self) -> &'static str {
        "Sub"
    }

    fn initialize(&self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let mut seen = FxHashSet::default();
        for param in &self.params {
            if !seen.insert(param.name.to_lowercase()) {
                return Err(ParseError::new(
                    format!("{} declares parameter '{}' twice", describe(self), param.name),
                    0,
                )
                .into());
            }
        }
        Ok(())
    }

    fn execute(&self, _ctx: &mut ScriptContext) -> ExecResult {
        Ok(None)
    }

    fn for_all_children(&self, visit: &mut dyn FnMut(&ActionRef)) {
        self.body.iter().for_each(visit);
    }
}

// ── Call ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Arg {
    pub name: Option<String>,
    /// Expanded in the caller's scope.
    pub value: String,
}

impl Arg {
    pub fn positional(value: impl Into<String>) -> Self {
        Arg {
            name: None,
            value: value.into(),
        }
    }

    pub fn named(name: impl Into<String>, value: impl Into<String>) -> Self {
        Arg {
            name: Some(name.into()),
            value: value.into(),
        }
    }
}

#[derive(Debug)]
pub struct Call {
    id: Option<String>,
    sub_id: String,
    args: Vec<Arg>,
    /// `None` uses the configured default.
    isolation: Option<CallIsolation>,
    /// Variable receiving the sub's return value.
    output: Option<String>,
}

impl Call {
    pub fn new(sub_id: impl Into<String>) -> Self {
        Call {
            id: None,
            sub_id: sub_id.into(),
            args: Vec::new(),
            isolation: None,
            output: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_isolation(mut self, isolation: CallIsolation) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn with_output(mut self, var: impl Into<String>) -> Self {
        self.output = Some(var.into());
        self
    }

    fn resolve(&self, ctx: &ScriptContext) -> Result<Rc<Sub>, ScriptError> {
        ctx.find::<Sub>(&self.sub_id)
            .or_else(|| ctx.find_tree::<Sub>(&self.sub_id))
            .ok_or_else(|| ScriptError::runtime(format!("sub '{}' not found", self.sub_id)))
    }

    fn bind_args(&self, ctx: &mut ScriptContext, sub: &Sub) -> Result<Vec<(String, Value)>, ScriptError> {
        let mut args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            args.push((arg.name.clone(), ctx.expand(&arg.value)?));
        }
        sub.bind(ctx, args)
    }
}

impl Action for Call {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn kind(&self) -> &'static str {
        "Call"
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        let sub = self.resolve(ctx)?;

        let previous = ctx.enter_phase(Phase::ParsingArguments);
        let bound = self.bind_args(ctx, &sub);
        if let Some(phase) = previous {
            ctx.enter_phase(phase);
        }
        let bound = bound?;

        let isolation = self.isolation.unwrap_or(ctx.config().default_isolation);
        debug!(sub = %self.sub_id, ?isolation, args = bound.len(), "call");
        let frame: ActionRef = sub.clone();
        let value = ctx.with_frame(Phase::Executing, &frame, |ctx| {
            ctx.with_isolation(isolation, bound, |ctx| sub.invoke(ctx))
        })?;

        if let Some(var) = &self.output {
            ctx.set(var, value)?;
        }
        Ok(None)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::node;
    use crate::engine::basic::{Eval, Return, Set};
    use crate::engine::block::{Block, Script};
    use pretty_assertions::assert_eq;

    fn greet() -> ActionRef {
        node(Sub::new(
            "greet",
            vec![
                Param::new("name").required(),
                Param::new("greeting").with_default("Hello"),
                Param::new("extra"),
            ],
            vec![node(Return::new("${greeting}, ${name}${=IsSet('extra') ? $extra : ''}"))],
        ))
    }

    fn script(items: Vec<ActionRef>) -> ActionRef {
        node(Script::new(Block::new(items)))
    }

    fn call_greet(ctx: &mut ScriptContext, call: Call) -> Result<Option<Value>, ScriptError> {
        let root = script(vec![greet(), node(call.with_output("out"))]);
        ctx.unset("out");
        ctx.run(&root)?;
        ctx.get("out")
    }

    #[test]
    fn positional_named_and_defaults() {
        let mut ctx = ScriptContext::new();
        let out = call_greet(&mut ctx, Call::new("greet").arg(Arg::positional("Ann"))).unwrap();
        assert_eq!(out, Some(Value::from("Hello, Ann")));

        let out = call_greet(
            &mut ctx,
            Call::new("greet")
                .arg(Arg::named("greeting", "Hi"))
                .arg(Arg::positional("Bob"))
                .arg(Arg::positional("!")),
        )
        .unwrap();
        assert_eq!(out, Some(Value::from("Hi, Bob!")));
    }

    #[test]
    fn binding_errors() {
        let mut ctx = ScriptContext::new();
        for call in [
            Call::new("greet"),
            Call::new("greet").arg(Arg::named("nope", "x")),
            Call::new("greet").arg(Arg::positional("a")).arg(Arg::named("NAME", "b")),
            Call::new("greet")
                .arg(Arg::positional("a"))
                .arg(Arg::positional("b"))
                .arg(Arg::positional("c"))
                .arg(Arg::positional("d")),
            Call::new("missing"),
        ] {
            let err = call_greet(&mut ctx, call).unwrap_err();
            assert!(err.catchable().is_ok());
        }
    }

    #[test]
    fn duplicate_parameters_rejected() {
        let mut ctx = ScriptContext::new();
        let root = script(vec![node(Sub::new(
            "dup",
            vec![Param::new("a"), Param::new("A")],
            vec![],
        ))]);
        let err = ctx.run(&root).unwrap_err();
        assert!(matches!(err.innermost(), ScriptError::Parse(_)));
    }

    #[test]
    fn isolation_modes() {
        let body = vec![node(Eval::new("$shared = $p")), node(Return::new("${=IsSet('outer')}"))];
        let sub = || node(Sub::new("s", vec![Param::new("p")], body.clone()));
        let mut ctx = ScriptContext::new();

        for (isolation, sees_outer, keeps) in [
            (CallIsolation::None, true, true),
            (CallIsolation::Default, true, false),
            (CallIsolation::High, false, false),
        ] {
            ctx.set("outer", 1).unwrap();
            ctx.unset("shared");
            ctx.unset("p");
            let call = Call::new("s")
                .arg(Arg::positional("v"))
                .with_isolation(isolation)
                .with_output("saw");
            ctx.run(&script(vec![sub(), node(call)])).unwrap();
            assert_eq!(ctx.get("saw").unwrap(), Some(Value::Bool(sees_outer)), "{isolation:?}");
            assert_eq!(ctx.is_set("shared").unwrap(), keeps, "{isolation:?}");
        }
    }

    #[test]
    fn recursion_and_depth_limit() {
        let mut ctx = ScriptContext::new();
        let fact = node(Sub::new(
            "fact",
            vec![Param::new("n").required()],
            vec![
                node(Set::new("r", "1")),
                node(crate::engine::cond::If::new(
                    crate::engine::cond::Condition::expr("$n > 1"),
                    vec![node(
                        Call::new("fact")
                            .arg(Arg::positional("${=$n - 1}"))
                            .with_output("r"),
                    )],
                )),
                node(Return::new("${=$n * (int)$r}")),
            ],
        ));
        let root = script(vec![
            fact,
            node(Call::new("fact").arg(Arg::positional("${=5}")).with_output("result")),
        ]);
        ctx.run(&root).unwrap();
        assert_eq!(ctx.get("result").unwrap(), Some(Value::I32(120)));

        let mut ctx = ScriptContext::with_config(crate::config::EngineConfig {
            max_call_depth: 40,
            ..Default::default()
        });
        let forever = node(Sub::new("loop", vec![], vec![node(Call::new("loop"))]));
        let root = script(vec![forever, node(Call::new("loop"))]);
        let err = ctx.run(&root).unwrap_err();
        assert!(err.to_string().contains("call depth"));
    }
}
