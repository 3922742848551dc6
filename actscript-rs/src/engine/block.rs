//! Sequencing nodes: [`Sequence`], [`Block`] and the [`Script`] root.

use std::rc::Rc;

use tracing::debug;

use super::action::{describe, run_all, Action, ActionRef, ExecResult, Signal};
use super::context::{CaughtError, ScriptContext};
use crate::error::{ParseError, ScriptError};

fn visit_all(items: &[ActionRef], visit: &mut dyn FnMut(&ActionRef)) {
    for item in items {
        visit(item);
    }
}

// ── Sequence ──────────────────────────────────────────────────────────────────

/// Children in order; the first signal stops the run.
#[derive(Debug, Default)]
pub struct Sequence {
    id: Option<String>,
    items: Vec<ActionRef>,
}

impl Sequence {
    pub fn new(items: Vec<ActionRef>) -> Self {
        Sequence { id: None, items }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl Action for Sequence {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn kind(&self) -> &'static str {
        "Sequence"
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        run_all(ctx, &self.items)
    }

    fn for_all_children(&self, visit: &mut dyn FnMut(&ActionRef)) {
        visit_all(&self.items, visit);
    }
}

// ── Block ─────────────────────────────────────────────────────────────────────

/// A sequence with optional `Try` / `Catch` / `Finally` sections.
///
/// Execution order:
///
/// 1. The plain items.  If they produce a signal, the block returns it at
///    once and **none** of Try, Catch or Finally run.
/// 2. Try.  A catchable fault goes to Catch: a non-empty Catch runs with
///    `Context.CurrentException` set to the fault; an empty Catch swallows
///    it; a missing Catch lets the original error through.  Termination
///    and parse errors are never caught.
/// 3. Finally, always.  An error or signal from Finally replaces whatever
///    Try/Catch produced.
#[derive(Debug, Default)]
pub struct Block {
    id: Option<String>,
    items: Vec<ActionRef>,
    try_items: Option<Vec<ActionRef>>,
    catch_items: Option<Vec<ActionRef>>,
    finally_items: Option<Vec<ActionRef>>,
    allow_orphans: bool,
}

impl Block {
    pub fn new(items: Vec<ActionRef>) -> Self {
        Block {
            items,
            ..Block::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_try(mut self, items: Vec<ActionRef>) -> Self {
        self.try_items = Some(items);
        self
    }

    pub fn with_catch(mut self, items: Vec<ActionRef>) -> Self {
        self.catch_items = Some(items);
        self
    }

    pub fn with_finally(mut self, items: Vec<ActionRef>) -> Self {
        self.finally_items = Some(items);
        self
    }

    /// Accept Catch / Finally without a Try (callback-style blocks).
    pub fn allow_orphan_handlers(mut self) -> Self {
        self.allow_orphans = true;
        self
    }

    fn on_error(&self, ctx: &mut ScriptContext, err: ScriptError) -> ExecResult {
        let Some(catch) = &self.catch_items else {
            return Err(err);
        };
        let trace = err.trace().map(str::to_owned);
        let fault = err.catchable()?;
        if catch.is_empty() {
            debug!(block = ?self.id, error = %fault, "fault suppressed");
            return Ok(None);
        }
        debug!(block = ?self.id, error = %fault, "catching fault");
        let previous = ctx.replace_exception(Some(Rc::new(CaughtError { fault, trace })));
        let result = run_all(ctx, catch);
        ctx.replace_exception(previous);
        result
    }
}

impl Action for Block {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn kind(&self) -> &'static str {
        "Block"
    }

    fn initialize(&self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let orphaned = self.catch_items.is_some() || self.finally_items.is_some();
        if orphaned && self.try_items.is_none() && !self.allow_orphans {
            return Err(ParseError::new(
                format!("{} has Catch or Finally without Try", describe(self)),
                0,
            )
            .into());
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        if let Some(signal) = run_all(ctx, &self.items)? {
            return Ok(Some(signal));
        }

        let resolved = match &self.try_items {
            Some(items) => match run_all(ctx, items) {
                Err(err) => self.on_error(ctx, err),
                done => done,
            },
            None => Ok(None),
        };

        match &self.finally_items {
            Some(items) => match run_all(ctx, items)? {
                Some(signal) => {
                    if let Err(err) = &resolved {
                        debug!(block = ?self.id, error = %err, "finally signal discards pending error");
                    }
                    Ok(Some(signal))
                }
                None => resolved,
            },
            None => resolved,
        }
    }

    fn for_all_children(&self, visit: &mut dyn FnMut(&ActionRef)) {
        visit_all(&self.items, visit);
        for section in [&self.try_items, &self.catch_items, &self.finally_items] {
            if let Some(items) = section {
                visit_all(items, visit);
            }
        }
    }
}

// ── Script ────────────────────────────────────────────────────────────────────

/// Root of an action tree.  Subs declared directly under it can be called
/// from anywhere in the tree, and a `Break` reaching it just ends the run.
#[derive(Debug)]
pub struct Script {
    block: Block,
}

impl Script {
    pub fn new(block: Block) -> Self {
        Script {
            block: Block {
                allow_orphans: false,
                ..block
            },
        }
    }
}

impl Action for Script {
    fn id(&self) -> Option<&str> {
        self.block.id()
    }

    fn kind(&self) -> &'static str {
        "Script"
    }

    fn initialize(&self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.block.initialize(ctx)
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        match self.block.execute(ctx)? {
            Some(Signal::Break) => Ok(None),
            other => Ok(other),
        }
    }

    fn for_all_children(&self, visit: &mut dyn FnMut(&ActionRef)) {
        self.block.for_all_children(visit);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::node;
    use crate::engine::basic::{Break, Print, Return, Set, Throw};
    use crate::engine::Output;
    use crate::script::Value;
    use pretty_assertions::assert_eq;

    fn set(name: &str, value: &str) -> ActionRef {
        node(Set::new(name, value))
    }

    fn run(ctx: &mut ScriptContext, block: Block) -> ExecResult {
        let root = node(block);
        ctx.initialize(&root)?;
        ctx.execute(&root)
    }

    #[test]
    fn sequence_stops_at_first_signal() {
        let mut ctx = ScriptContext::new();
        let seq = node(Sequence::new(vec![
            set("a", "1"),
            node(Return::new("${a}")),
            set("b", "2"),
        ]));
        assert_eq!(ctx.execute(&seq).unwrap(), Some(Signal::Return(Value::from("1"))));
        assert!(!ctx.is_set("b").unwrap());
    }

    #[test]
    fn empty_catch_suppresses() {
        let mut ctx = ScriptContext::new();
        let block = Block::new(vec![])
            .with_try(vec![node(Throw::new("boom")), set("after", "x")])
            .with_catch(vec![]);
        assert_eq!(run(&mut ctx, block).unwrap(), None);
        assert!(!ctx.is_set("after").unwrap());
    }

    #[test]
    fn missing_catch_rethrows_identical_error() {
        let mut ctx = ScriptContext::new();
        let block = Block::new(vec![]).with_try(vec![node(Throw::new("boom"))]);
        let err = run(&mut ctx, block).unwrap_err();
        assert_eq!(err.innermost(), &ScriptError::user("boom"));
        assert!(err.trace().is_some_and(|t| t.contains("Throw")));
    }

    #[test]
    fn catch_sees_current_exception_and_restores_it() {
        let mut ctx = ScriptContext::new();
        let block = Block::new(vec![])
            .with_try(vec![node(Throw::new("bad ${=1+1}"))])
            .with_catch(vec![
                set("msg", "${=Context.CurrentException.Message}"),
                set("kind", "${=Context.CurrentException.Kind}"),
            ]);
        assert_eq!(run(&mut ctx, block).unwrap(), None);
        assert_eq!(ctx.get("msg").unwrap(), Some(Value::from("bad 2")));
        assert_eq!(ctx.get("kind").unwrap(), Some(Value::from("ScriptUserException")));
        assert!(ctx.current_exception().is_none());
    }

    #[test]
    fn runtime_faults_are_catchable() {
        let mut ctx = ScriptContext::new();
        let block = Block::new(vec![])
            .with_try(vec![set("x", "${=1/0}")])
            .with_catch(vec![set("caught", "${=Context.CurrentException.Kind}")]);
        run(&mut ctx, block).unwrap();
        assert_eq!(ctx.get("caught").unwrap(), Some(Value::from("ScriptRuntimeException")));
    }

    #[test]
    fn pre_try_signal_skips_everything() {
        let mut ctx = ScriptContext::new();
        let block = Block::new(vec![node(Return::new("early"))])
            .with_try(vec![set("try", "1")])
            .with_catch(vec![set("catch", "1")])
            .with_finally(vec![set("finally", "1")]);
        assert_eq!(
            run(&mut ctx, block).unwrap(),
            Some(Signal::Return(Value::from("early")))
        );
        for name in ["try", "catch", "finally"] {
            assert!(!ctx.is_set(name).unwrap(), "{name} ran");
        }
    }

    #[test]
    fn finally_always_runs() {
        let mut ctx = ScriptContext::new();
        let block = Block::new(vec![])
            .with_try(vec![node(Throw::new("boom"))])
            .with_finally(vec![set("cleanup", "done")]);
        assert!(run(&mut ctx, block).is_err());
        assert_eq!(ctx.get("cleanup").unwrap(), Some(Value::from("done")));

        let block = Block::new(vec![])
            .with_try(vec![node(Return::new("1"))])
            .with_finally(vec![node(Break)]);
        assert_eq!(run(&mut ctx, block).unwrap(), Some(Signal::Break));
    }

    #[test]
    fn finally_signal_replaces_pending_error() {
        let mut ctx = ScriptContext::new();
        let block = Block::new(vec![])
            .with_try(vec![node(Throw::new("lost"))])
            .with_finally(vec![node(Break)]);
        assert_eq!(run(&mut ctx, block).unwrap(), Some(Signal::Break));

        let block = Block::new(vec![])
            .with_try(vec![node(Throw::new("lost"))])
            .with_catch(vec![node(Throw::new("rethrown"))])
            .with_finally(vec![node(Return::new("${=7}"))]);
        assert_eq!(run(&mut ctx, block).unwrap(), Some(Signal::Return(Value::I32(7))));
    }

    /// Requests an abort when executed.
    #[derive(Debug)]
    struct AbortNow;

    impl Action for AbortNow {
        fn kind(&self) -> &'static str {
            "AbortNow"
        }
        fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
            ctx.abort();
            Ok(None)
        }
    }

    #[test]
    fn termination_is_never_caught() {
        let mut ctx = ScriptContext::new();
        ctx.push_output(Output::capture());
        let block = Block::new(vec![])
            .with_try(vec![node(AbortNow), node(Print::new("unreachable"))])
            .with_catch(vec![])
            .with_finally(vec![node(Print::new("cleanup"))]);
        let err = run(&mut ctx, block).unwrap_err();
        assert!(err.is_terminated());
        assert_eq!(ctx.pop_output().unwrap().into_lines(), vec!["cleanup"]);
    }

    #[test]
    fn orphan_handlers_are_rejected() {
        let mut ctx = ScriptContext::new();
        let err = run(&mut ctx, Block::new(vec![]).with_catch(vec![])).unwrap_err();
        assert!(matches!(err.innermost(), ScriptError::Parse(_)));
        assert!(run(&mut ctx, Block::new(vec![]).with_finally(vec![]).allow_orphan_handlers()).is_ok());
    }

    #[test]
    fn script_absorbs_break() {
        let mut ctx = ScriptContext::new();
        let root = node(Script::new(Block::new(vec![node(Break), set("x", "1")])));
        assert_eq!(ctx.run(&root).unwrap(), Value::Null);
        assert!(!ctx.is_set("x").unwrap());
    }
}
