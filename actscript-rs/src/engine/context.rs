//! [`ScriptContext`]: the state one script instance runs against.
//!
//! The context owns the variable store, the call stack, the expression
//! cache, the output stack and the abort flag.  Nothing here is shared
//! between instances except the [`AbortHandle`], which another thread may
//! hold to request cancellation.
//!
//! Expressions see the context through [`EvalContext`]:
//!
//! | Name | Resolves to |
//! |------|-------------|
//! | `$name` | a variable, or a computed name (see [`crate::var`]) |
//! | `f(args)` | `IsSet`, `Get`, then each receiver in order |
//! | `Context.Member` | `CurrentException`, `CallDepth`, `IsSet(n)`, `Get(n)` |
//! | `Enum.Member` | a registered enum value (`CallIsolation.High`) |
//! | `Math.PI`, `Str.strlen(s)` | receiver properties and calls |

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::action::{children_of, describe, downcast, is, Action, ActionRef, ExecResult, Signal};
use super::callstack::{CallStack, Phase};
use super::output::Output;
use crate::config::EngineConfig;
use crate::error::{Fault, ScriptError};
use crate::script::builtins::{default_receivers, Receiver};
use crate::script::coerce::{to, ValueType};
use crate::script::expr::{evaluate, EvalContext, Evaluator};
use crate::script::transform::{transform, ReplaceRule, TransformRules};
use crate::script::value::{EnumDef, EnumValue, ScriptObject, Value};
use crate::var::{classify, env_var, NameKind, Vars};

// ── CallIsolation ─────────────────────────────────────────────────────────────

/// How a called sub's variables relate to the caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallIsolation {
    /// The sub shares and permanently mutates the caller's variables.
    None,
    /// The sub sees the caller's variables; its changes are reverted.
    #[default]
    Default,
    /// The sub sees only its bound parameters; nothing escapes.
    High,
}

impl CallIsolation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(CallIsolation::None),
            "default" => Some(CallIsolation::Default),
            "high" => Some(CallIsolation::High),
            _ => None,
        }
    }
}

// ── AbortHandle ───────────────────────────────────────────────────────────────

/// Cancellation flag; clones share it and may live on other threads.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── Script-visible objects ────────────────────────────────────────────────────

/// A fault caught by a `Catch` block, exposed as `Context.CurrentException`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaughtError {
    pub fault: Fault,
    /// Call-stack trace captured where the fault escaped, if any.
    pub trace: Option<String>,
}

impl ScriptObject for CaughtError {
    fn type_name(&self) -> &str {
        self.fault.kind()
    }

    fn get_member(&self, name: &str) -> Option<Value> {
        match name.to_ascii_lowercase().as_str() {
            "message" => Some(Value::from(self.fault.message())),
            "kind" => Some(Value::from(self.fault.kind())),
            "stacktrace" => Some(Value::from(self.trace.clone())),
            _ => None,
        }
    }

    fn display(&self) -> String {
        self.fault.message().to_owned()
    }
}

/// An action reached through a `~id` variable.
#[derive(Debug)]
struct ActionObject(ActionRef);

impl ScriptObject for ActionObject {
    fn type_name(&self) -> &str {
        "Action"
    }

    fn get_member(&self, name: &str) -> Option<Value> {
        match name.to_ascii_lowercase().as_str() {
            "id" => Some(Value::from(self.0.id())),
            "kind" => Some(Value::from(self.0.kind())),
            _ => None,
        }
    }

    fn display(&self) -> String {
        describe(&*self.0)
    }
}

// ── ScriptContext ─────────────────────────────────────────────────────────────

pub struct ScriptContext {
    vars: Vars,
    stack: CallStack,
    evaluator: Evaluator,
    receivers: Vec<Box<dyn Receiver>>,
    /// Lowercased enum name → definition.
    enums: FxHashMap<String, Rc<EnumDef>>,
    outputs: Vec<Output>,
    abort: AbortHandle,
    /// Set once the termination error has been raised for the current abort.
    abort_raised: bool,
    /// Roots that have been initialized and compiled, by address.  Holding
    /// the root keeps its address from being reused.
    prepared: FxHashMap<usize, ActionRef>,
    current_exception: Option<Rc<CaughtError>>,
    config: EngineConfig,
}

impl fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("vars", &self.vars)
            .field("depth", &self.stack.depth())
            .field("outputs", &self.outputs)
            .field("aborted", &self.abort.is_aborted())
            .finish_non_exhaustive()
    }
}

impl Default for ScriptContext {
    fn default() -> Self {
        Self::new()
    }
}

fn addr(action: &ActionRef) -> usize {
    Rc::as_ptr(action) as *const () as usize
}

impl ScriptContext {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut ctx = ScriptContext {
            vars: Vars::new(),
            stack: CallStack::new(),
            evaluator: Evaluator::new(config.cache_capacity),
            receivers: default_receivers(),
            enums: FxHashMap::default(),
            outputs: Vec::new(),
            abort: AbortHandle::default(),
            abort_raised: false,
            prepared: FxHashMap::default(),
            current_exception: None,
            config,
        };
        ctx.register_enum(EnumDef::new(
            "CallIsolation",
            &[("None", 0), ("Default", 1), ("High", 2)],
        ));
        ctx.register_enum(EnumDef::new(
            "Phase",
            &[
                ("Loading", 0),
                ("Initializing", 1),
                ("Compiling", 2),
                ("ParsingArguments", 3),
                ("Executing", 4),
            ],
        ));
        ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Add a receiver consulted after the built-in ones.
    pub fn add_receiver(&mut self, receiver: Box<dyn Receiver>) {
        self.receivers.push(receiver);
    }

    /// Make an enum usable in casts and as `Name.Member`.
    pub fn register_enum(&mut self, def: EnumDef) -> Rc<EnumDef> {
        let def = Rc::new(def);
        self.enums.insert(def.name.to_lowercase(), Rc::clone(&def));
        def
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    pub fn eval(&mut self, text: &str) -> Result<Value, ScriptError> {
        let op = self.evaluator.parse(text)?;
        evaluate(&op, self)
    }

    /// Evaluate a multi-expression `a|b|=expr`.
    pub fn eval_multi(&mut self, text: &str) -> Result<Value, ScriptError> {
        let op = self.evaluator.parse_multi(text)?;
        evaluate(&op, self)
    }

    /// Parse `text` without evaluating it, so syntax errors surface early.
    pub fn precompile(&mut self, text: &str) -> Result<(), ScriptError> {
        self.evaluator.parse(text)?;
        Ok(())
    }

    pub fn transform(&mut self, value: &Value, rules: TransformRules) -> Result<Value, ScriptError> {
        transform(value, rules, &[], self)
    }

    pub fn transform_with(
        &mut self,
        value: &Value,
        rules: TransformRules,
        replaces: &[ReplaceRule],
    ) -> Result<Value, ScriptError> {
        transform(value, rules, replaces, self)
    }

    /// Expand `${…}` markers in `text` with the default rules.
    pub fn expand(&mut self, text: &str) -> Result<Value, ScriptError> {
        self.transform(&Value::from(text), TransformRules::default())
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ScriptError> {
        self.vars.set(name, value.into())
    }

    /// Read a variable, computed names included.
    pub fn get(&mut self, name: &str) -> Result<Option<Value>, ScriptError> {
        self.get_var(name)
    }

    pub fn is_set(&mut self, name: &str) -> Result<bool, ScriptError> {
        match classify(name) {
            NameKind::Plain => Ok(self.vars.contains(name)),
            _ => Ok(self.get_var(name)?.is_some()),
        }
    }

    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.vars.unset(name)
    }

    /// Run `f` with `overlay` bound under `prefix`, then put every touched
    /// variable back the way it was, in reverse order.  Names that did not
    /// exist before are removed.  Restoration happens on error too.
    pub fn with_vars<R>(
        &mut self,
        overlay: Vec<(String, Value)>,
        prefix: &str,
        f: impl FnOnce(&mut Self) -> Result<R, ScriptError>,
    ) -> Result<R, ScriptError> {
        let mut saved = Vec::with_capacity(overlay.len());
        let mut bound = Ok(());
        for (name, value) in overlay {
            let full = format!("{prefix}{name}");
            let previous = self.vars.get(&full).cloned();
            if let Err(e) = self.vars.set(&full, value) {
                bound = Err(e);
                break;
            }
            saved.push((full, previous));
        }
        let result = bound.and_then(|()| f(self));
        for (name, previous) in saved.into_iter().rev() {
            match previous {
                // the name was accepted by `set` above
                Some(v) => self.vars.set(&name, v)?,
                None => {
                    self.vars.unset(&name);
                }
            }
        }
        result
    }

    /// [`with_vars`](Self::with_vars) around a list of actions.
    pub fn execute_with_vars(
        &mut self,
        body: &[ActionRef],
        overlay: Vec<(String, Value)>,
        prefix: &str,
    ) -> ExecResult {
        self.with_vars(overlay, prefix, |ctx| super::action::run_all(ctx, body))
    }

    /// Run `f` as a sub call under `isolation` with `params` bound.
    pub fn with_isolation<R>(
        &mut self,
        isolation: CallIsolation,
        params: Vec<(String, Value)>,
        f: impl FnOnce(&mut Self) -> Result<R, ScriptError>,
    ) -> Result<R, ScriptError> {
        debug!(?isolation, params = params.len(), "entering sub");
        match isolation {
            CallIsolation::None => {
                self.bind_all(params)?;
                f(self)
            }
            CallIsolation::Default => {
                let snapshot = self.vars.clone();
                let result = self.bind_all(params).and_then(|()| f(self));
                self.vars = snapshot;
                result
            }
            CallIsolation::High => {
                let saved = std::mem::take(&mut self.vars);
                let result = self.bind_all(params).and_then(|()| f(self));
                self.vars = saved;
                result
            }
        }
    }

    fn bind_all(&mut self, params: Vec<(String, Value)>) -> Result<(), ScriptError> {
        for (name, value) in params {
            self.vars.set(&name, value)?;
        }
        Ok(())
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Execute one action inside its own call-stack frame.
    ///
    /// An error leaving the frame is wrapped in [`ScriptError::Traced`]
    /// unless an inner frame already did so.
    pub fn execute(&mut self, action: &ActionRef) -> ExecResult {
        self.check_abort()?;
        trace!(action = %describe(&**action), depth = self.stack.depth(), "execute");
        self.with_frame(Phase::Executing, action, |ctx| action.execute(ctx))
    }

    /// Run `f` inside a frame for `action`.  The frame is popped whatever
    /// `f` returns.
    pub fn with_frame<R>(
        &mut self,
        phase: Phase,
        action: &ActionRef,
        f: impl FnOnce(&mut Self) -> Result<R, ScriptError>,
    ) -> Result<R, ScriptError> {
        if self.stack.depth() >= self.config.max_call_depth {
            let err = ScriptError::runtime(format!(
                "call depth limit of {} exceeded",
                self.config.max_call_depth
            ));
            return Err(self.traced(err));
        }
        self.stack.push(phase, Rc::clone(action));
        let result = f(self).map_err(|e| self.traced(e));
        self.stack.pop();
        result
    }

    /// Change the phase of the innermost frame; returns the previous phase.
    pub fn enter_phase(&mut self, phase: Phase) -> Option<Phase> {
        self.stack.set_phase(phase)
    }

    fn traced(&self, err: ScriptError) -> ScriptError {
        if err.is_traced() {
            return err;
        }
        ScriptError::Traced {
            source: Box::new(err),
            trace: self.stack.format_trace(),
        }
    }

    /// Validate `root` and everything below it, depth first.
    pub fn initialize(&mut self, root: &ActionRef) -> Result<(), ScriptError> {
        self.with_frame(Phase::Initializing, root, |ctx| {
            root.initialize(ctx)?;
            for child in children_of(&**root) {
                ctx.initialize(&child)?;
            }
            Ok(())
        })
    }

    /// Give every action under `root`, breadth first, a chance to pre-parse
    /// its expressions.
    pub fn compile(&mut self, root: &ActionRef) -> Result<(), ScriptError> {
        let mut seen = FxHashSet::default();
        let mut queue = std::collections::VecDeque::from([Rc::clone(root)]);
        while let Some(action) = queue.pop_front() {
            if !seen.insert(addr(&action)) {
                continue;
            }
            self.with_frame(Phase::Compiling, &action, |ctx| action.compile(ctx))?;
            queue.extend(children_of(&*action));
        }
        Ok(())
    }

    /// Initialize and compile `root` unless that already happened.
    pub fn prepare(&mut self, root: &ActionRef) -> Result<(), ScriptError> {
        if self.prepared.contains_key(&addr(root)) {
            return Ok(());
        }
        self.initialize(root)?;
        self.compile(root)?;
        self.prepared.insert(addr(root), Rc::clone(root));
        Ok(())
    }

    /// Prepare and execute `root`; a `Return` signal becomes the result.
    pub fn run(&mut self, root: &ActionRef) -> Result<Value, ScriptError> {
        self.prepare(root)?;
        match self.execute(root)? {
            Some(Signal::Return(v)) => Ok(v),
            Some(Signal::Break) | None => Ok(Value::Null),
        }
    }

    /// Bounded lookup: frames from the innermost outwards, plus each
    /// frame's direct children.
    pub fn find<T: Action>(&self, id: &str) -> Option<Rc<T>> {
        self.stack.find(id, is::<T>).and_then(|a| downcast::<T>(&a))
    }

    /// Breadth-first search of the whole running tree.
    pub fn find_tree<T: Action>(&self, id: &str) -> Option<Rc<T>> {
        self.stack.find_tree(id, is::<T>).and_then(|a| downcast::<T>(&a))
    }

    /// [`find`](Self::find) for any action type.
    pub fn find_action(&self, id: &str) -> Option<ActionRef> {
        self.stack.find(id, |_| true)
    }

    /// [`find_tree`](Self::find_tree) for any action type.
    pub fn find_tree_action(&self, id: &str) -> Option<ActionRef> {
        self.stack.find_tree(id, |_| true)
    }

    // ── Exceptions ────────────────────────────────────────────────────────────

    pub fn current_exception(&self) -> Option<&Rc<CaughtError>> {
        self.current_exception.as_ref()
    }

    /// Swap the current exception, returning the previous one.
    pub fn replace_exception(&mut self, caught: Option<Rc<CaughtError>>) -> Option<Rc<CaughtError>> {
        std::mem::replace(&mut self.current_exception, caught)
    }

    /// User-facing report: the message, plus the trace when
    /// `verbose_errors` is set.
    pub fn describe_error(&self, err: &ScriptError) -> String {
        match err.trace() {
            Some(trace) if self.config.verbose_errors && !trace.is_empty() => {
                format!("{err}\n{trace}")
            }
            _ => err.to_string(),
        }
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) {
        debug!("abort requested");
        self.abort.abort();
    }

    /// Raise [`ScriptError::Terminated`] once after an abort.  Later checks
    /// pass so that unwinding can run `Finally` blocks.
    pub fn check_abort(&mut self) -> Result<(), ScriptError> {
        if self.abort.is_aborted() && !self.abort_raised {
            self.abort_raised = true;
            warn!("script terminated");
            return Err(ScriptError::Terminated);
        }
        Ok(())
    }

    /// Clear the abort flag so the context can run again.
    pub fn reset_abort(&mut self) {
        self.abort.reset();
        self.abort_raised = false;
    }

    // ── Output ────────────────────────────────────────────────────────────────

    pub fn push_output(&mut self, output: Output) {
        self.outputs.push(output);
    }

    pub fn pop_output(&mut self) -> Option<Output> {
        self.outputs.pop()
    }

    /// Write to the innermost output, or stdout when none is pushed.
    pub fn write_line(&mut self, line: &str) -> Result<(), ScriptError> {
        match self.outputs.last_mut() {
            Some(out) => out.write_line(line),
            None => Output::Stdout.write_line(line),
        }
    }

    // ── Built-in context functions ────────────────────────────────────────────

    /// `IsSet(name)`, `Get(name)`, `CurrentException`, `CallDepth`.
    fn context_member(&mut self, name: &str, args: Option<&[Value]>) -> Option<Result<Value, ScriptError>> {
        fn name_arg(func: &str, args: Option<&[Value]>) -> Result<String, ScriptError> {
            match args {
                Some([v]) => Ok(to::<String>(v)?),
                _ => Err(ScriptError::runtime(format!("{func} takes one argument"))),
            }
        }
        Some(match name.to_ascii_lowercase().as_str() {
            "isset" => name_arg(name, args).and_then(|n| self.is_set(&n)).map(Value::Bool),
            "get" => name_arg(name, args)
                .and_then(|n| self.get_var(&n))
                .map(Option::unwrap_or_default),
            "currentexception" if args.is_none() => Ok(match &self.current_exception {
                Some(e) => Value::Object(Rc::clone(e) as Rc<dyn ScriptObject>),
                None => Value::Null,
            }),
            "calldepth" if args.is_none() => Ok(Value::I32(self.stack.depth() as i32)),
            _ => return None,
        })
    }
}

impl EvalContext for ScriptContext {
    fn get_var(&mut self, name: &str) -> Result<Option<Value>, ScriptError> {
        match classify(name) {
            NameKind::Plain => Ok(self.vars.get(name).cloned()),
            NameKind::Expr(text) => self.eval(text).map(Some),
            NameKind::Multi(text) => self.eval_multi(text).map(Some),
            NameKind::Env { scope, name } => Ok(env_var(scope, name).map(Value::Str)),
            NameKind::Tree(id) => Ok(self
                .find_tree_action(id)
                .map(|a| Value::Object(Rc::new(ActionObject(a))))),
        }
    }

    fn set_var(&mut self, name: &str, value: Value) -> Result<(), ScriptError> {
        self.vars.set(name, value)
    }

    fn resolve_type(&self, name: &str) -> Option<ValueType> {
        ValueType::builtin(name).or_else(|| {
            self.enums
                .get(&name.to_lowercase())
                .map(|def| ValueType::Enum(Rc::clone(def)))
        })
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        if let Some(result) = self.context_member(name, Some(args.as_slice())) {
            return result;
        }
        for receiver in &self.receivers {
            if let Some(result) = receiver.call(name, &args) {
                return result;
            }
        }
        Err(ScriptError::runtime(format!("unknown function '{name}'")))
    }

    fn call_static(
        &mut self,
        type_name: &str,
        member: &str,
        args: Option<Vec<Value>>,
    ) -> Result<Option<Value>, ScriptError> {
        if type_name.eq_ignore_ascii_case("Context") {
            return match self.context_member(member, args.as_deref()) {
                Some(result) => result.map(Some),
                None => Err(ScriptError::runtime(format!("Context has no member '{member}'"))),
            };
        }

        if let Some(def) = self.enums.get(&type_name.to_lowercase()) {
            if args.is_some() {
                return Err(ScriptError::runtime(format!("enum {} has no methods", def.name)));
            }
            let value = def.value_of(member).ok_or_else(|| {
                ScriptError::runtime(format!("'{member}' is not a member of enum {}", def.name))
            })?;
            return Ok(Some(Value::Enum(EnumValue {
                def: Rc::clone(def),
                value,
            })));
        }

        let Some(receiver) = self
            .receivers
            .iter()
            .find(|r| r.name().eq_ignore_ascii_case(type_name))
        else {
            return Ok(None);
        };
        let found = match &args {
            None => receiver.property(member).map(Ok),
            Some(args) => receiver.call(member, args),
        };
        match found {
            Some(result) => result.map(Some),
            None => Err(ScriptError::runtime(format!(
                "{} has no member '{member}'",
                receiver.name()
            ))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn eval_uses_context_variables() {
        let mut ctx = ScriptContext::new();
        ctx.set("v_int", 1).unwrap();
        assert_eq!(ctx.eval("$v_int + 1").unwrap(), Value::I32(2));
        assert_eq!(ctx.eval("$V_INT").unwrap(), Value::I32(1));
        assert_eq!(ctx.eval_multi("missing|v_int").unwrap(), Value::I32(1));
    }

    #[test]
    fn typed_expansion_of_a_whole_marker() {
        let mut ctx = ScriptContext::new();
        ctx.set("v_int", 1).unwrap();
        assert_eq!(ctx.expand("${v_int}").unwrap(), Value::I32(1));
        assert_eq!(ctx.expand("n=${v_int}").unwrap(), Value::from("n=1"));
    }

    #[test]
    fn computed_names() {
        let mut ctx = ScriptContext::new();
        ctx.set("x", 4).unwrap();
        assert_eq!(ctx.get("=$x*2").unwrap(), Some(Value::I32(8)));
        assert_eq!(ctx.get("|nope|=7").unwrap(), Some(Value::I32(7)));
        std::env::set_var("ACTSCRIPT_CTX_TEST", "on");
        assert_eq!(ctx.get("%ACTSCRIPT_CTX_TEST%").unwrap(), Some(Value::from("on")));
        assert!(ctx.is_set("%ACTSCRIPT_CTX_TEST%").unwrap());
        assert!(!ctx.is_set("%ACTSCRIPT_CTX_MISSING%").unwrap());
        assert!(ctx.set("=1", 1).is_err());
    }

    #[test]
    fn with_vars_restores_on_success_and_error() {
        let mut ctx = ScriptContext::new();
        ctx.set("p.v", "old").unwrap();
        let seen = ctx
            .with_vars(vec![("v".into(), Value::from("new"))], "p.", |c| c.eval("$p.v"))
            .unwrap();
        assert_eq!(seen, Value::from("new"));
        assert_eq!(ctx.get("p.v").unwrap(), Some(Value::from("old")));

        let err = ctx.with_vars(
            vec![("w".into(), Value::I32(1)), ("v".into(), Value::I32(2))],
            "p.",
            |_| -> Result<(), ScriptError> { Err(ScriptError::user("boom")) },
        );
        assert!(err.is_err());
        assert_eq!(ctx.get("p.v").unwrap(), Some(Value::from("old")));
        assert!(!ctx.is_set("p.w").unwrap());
    }

    #[test]
    fn isolation_levels() {
        let mut ctx = ScriptContext::new();
        ctx.set("outer", 1).unwrap();

        let bump = |c: &mut ScriptContext| c.eval("$outer = $outer + 1");
        ctx.with_isolation(CallIsolation::None, vec![], bump).unwrap();
        assert_eq!(ctx.get("outer").unwrap(), Some(Value::I32(2)));

        ctx.with_isolation(CallIsolation::Default, vec![], bump).unwrap();
        assert_eq!(ctx.get("outer").unwrap(), Some(Value::I32(2)));

        let visible = ctx
            .with_isolation(CallIsolation::High, vec![("p".into(), Value::I32(9))], |c| {
                Ok((c.is_set("outer")?, c.get("p")?))
            })
            .unwrap();
        assert_eq!(visible, (false, Some(Value::I32(9))));
        assert!(!ctx.is_set("p").unwrap());
    }

    #[test]
    fn context_members_and_enums() {
        let mut ctx = ScriptContext::new();
        ctx.set("a", 1).unwrap();
        assert_eq!(ctx.eval("IsSet('a')").unwrap(), Value::Bool(true));
        assert_eq!(ctx.eval("Context.IsSet('b')").unwrap(), Value::Bool(false));
        assert_eq!(ctx.eval("Get('a')").unwrap(), Value::I32(1));
        assert_eq!(ctx.eval("Context.CallDepth").unwrap(), Value::I32(0));
        assert_eq!(ctx.eval("Context.CurrentException").unwrap(), Value::Null);
        assert_eq!(ctx.eval("CallIsolation.High").unwrap().to_string(), "High");
        assert_eq!(ctx.eval("(int)CallIsolation.High").unwrap(), Value::I32(2));
        assert_eq!(ctx.eval("(CallIsolation)'none'").unwrap().to_string(), "None");
        assert!(ctx.eval("CallIsolation.Extreme").is_err());
        assert_eq!(ctx.eval("Math.Max(2, 5)").unwrap(), Value::I32(5));
        assert!(ctx.eval("nosuchfn(1)").is_err());
    }

    #[test]
    fn abort_raises_once() {
        let mut ctx = ScriptContext::new();
        let handle = ctx.abort_handle();
        assert!(ctx.check_abort().is_ok());
        std::thread::spawn(move || handle.abort()).join().unwrap();
        assert_eq!(ctx.check_abort(), Err(ScriptError::Terminated));
        assert!(ctx.check_abort().is_ok());
        ctx.reset_abort();
        assert!(ctx.check_abort().is_ok());
    }

    #[test]
    fn describe_error_respects_verbosity() {
        let err = ScriptError::Traced {
            source: Box::new(ScriptError::runtime("bad")),
            trace: "   at Sequence (Executing)".into(),
        };
        assert_eq!(ScriptContext::new().describe_error(&err), "bad");
        let verbose = ScriptContext::with_config(EngineConfig {
            verbose_errors: true,
            ..EngineConfig::default()
        });
        assert_eq!(verbose.describe_error(&err), "bad\n   at Sequence (Executing)");
    }

    #[test]
    fn output_stack() {
        let mut ctx = ScriptContext::new();
        ctx.push_output(Output::capture());
        ctx.write_line("one").unwrap();
        ctx.push_output(Output::capture());
        ctx.write_line("two").unwrap();
        assert_eq!(ctx.pop_output().unwrap().into_lines(), vec!["two"]);
        assert_eq!(ctx.pop_output().unwrap().into_lines(), vec!["one"]);
    }
}
