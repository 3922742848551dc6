//! Action engine.
//!
//! A script is a tree of [`Action`] nodes run against a [`ScriptContext`].
//! The context carries the variables, the call stack and the expression
//! cache; nodes carry only their configuration, so one tree can run in any
//! number of contexts.
//!
//! ```rust
//! use actscript::engine::{node, Block, Call, Arg, Return, Script, ScriptContext, Sub, Param};
//!
//! let root = node(Script::new(Block::new(vec![
//!     node(Sub::new("twice", vec![Param::new("n").required()], vec![
//!         node(Return::new("${=$n * 2}")),
//!     ])),
//!     node(Call::new("twice").arg(Arg::positional("${=21}")).with_output("answer")),
//!     node(Return::new("${answer}")),
//! ])));
//! let mut ctx = ScriptContext::new();
//! assert_eq!(ctx.run(&root).unwrap().to_string(), "42");
//! ```

pub mod action;
pub mod basic;
pub mod block;
pub mod callstack;
pub mod cond;
pub mod context;
pub mod loops;
pub mod output;
pub mod sub;

pub use action::{node, Action, ActionRef, ExecResult, Row, RowSource, Signal};
pub use basic::{Break, Eval, Print, Return, Set, Throw};
pub use block::{Block, Script, Sequence};
pub use callstack::{CallStack, CallStackItem, Phase};
pub use cond::{Condition, If, Probe};
pub use context::{AbortHandle, CallIsolation, CaughtError, ScriptContext};
pub use loops::{ForEach, LoopSource, RowSet, While};
pub use output::Output;
pub use sub::{Arg, Call, Param, Sub};
