//! The action node contract.
//!
//! An action tree is built once, [initialized](Action::initialize) once per
//! root, then [executed](Action::execute) any number of times.  Execution
//! returns a control-flow sentinel:
//!
//! | Result | Meaning |
//! |--------|---------|
//! | `Ok(None)` | continue with the next sibling |
//! | `Ok(Some(Signal::Break))` | leave the nearest loop |
//! | `Ok(Some(Signal::Return(v)))` | leave the nearest call boundary with `v` |
//! | `Err(_)` | an error is unwinding; see [`ScriptError::catchable`] |
//!
//! Actions never call each other's `execute` directly; they go through
//! [`ScriptContext::execute`] so the call stack stays strictly nested.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::context::ScriptContext;
use crate::error::ScriptError;
use crate::script::Value;

/// Control-flow signal carried up the tree by `Ok(Some(_))`.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Break,
    Return(Value),
}

pub type ExecResult = Result<Option<Signal>, ScriptError>;

pub type ActionRef = Rc<dyn Action>;

/// A row produced by a [`RowSource`]: column name → value.
pub type Row = Vec<(String, Value)>;

/// Upcasting helper so trees of `dyn Action` can be searched by concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

pub trait Action: AsAny + fmt::Debug {
    /// Identifier used by `Call`, `ForEach` row sources and `~id` lookups.
    fn id(&self) -> Option<&str> {
        None
    }

    /// Short node name used in traces.
    fn kind(&self) -> &'static str;

    /// Validate structure.  Called once per root before first execution.
    fn initialize(&self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Pre-parse any expressions this node carries.
    fn compile(&self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        Ok(())
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult;

    /// Visit direct children in execution order.
    fn for_all_children(&self, _visit: &mut dyn FnMut(&ActionRef)) {}

    /// Nodes that can feed a `ForEach` return themselves here.
    fn as_row_source(&self) -> Option<&dyn RowSource> {
        None
    }
}

/// A named source of rows for `ForEach`.
pub trait RowSource {
    fn rows(&self, ctx: &mut ScriptContext) -> Result<Vec<Row>, ScriptError>;
}

/// Share a concrete action as an [`ActionRef`].
pub fn node(action: impl Action) -> ActionRef {
    Rc::new(action)
}

/// `true` when the action's id equals `id`, ignoring case.
pub fn has_id(action: &dyn Action, id: &str) -> bool {
    action.id().is_some_and(|a| a.eq_ignore_ascii_case(id))
}

/// Downcast a shared action to its concrete type.
pub fn downcast<T: Action>(action: &ActionRef) -> Option<Rc<T>> {
    Rc::clone(action).into_any_rc().downcast::<T>().ok()
}

/// `true` when `action` is a `T`.
pub fn is<T: Action>(action: &ActionRef) -> bool {
    (**action).as_any().is::<T>()
}

/// Direct children, collected.
pub fn children_of(action: &dyn Action) -> Vec<ActionRef> {
    let mut out = Vec::new();
    action.for_all_children(&mut |c| out.push(Rc::clone(c)));
    out
}

/// Execute `items` in order; the first non-`None` result stops the run and
/// is returned unchanged.
pub fn run_all(ctx: &mut ScriptContext, items: &[ActionRef]) -> ExecResult {
    for item in items {
        if let Some(signal) = ctx.execute(item)? {
            return Ok(Some(signal));
        }
    }
    Ok(None)
}

/// Label used in traces and error messages: `Kind` or `Kind 'id'`.
pub fn describe(action: &dyn Action) -> String {
    match action.id() {
        Some(id) => format!("{} '{}'", action.kind(), id),
        None => action.kind().to_owned(),
    }
}
