//! actscript: an embeddable scripting engine built from action trees.
//!
//! Hosts build a tree of [`engine::Action`] nodes (sequences, try blocks,
//! conditions, loops, subs) and run it against an
//! [`engine::ScriptContext`].  Node attributes are plain text with `${…}`
//! markers evaluated by the expression language in [`script`].

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pattern;
pub mod script;
pub mod var;

pub use config::EngineConfig;
pub use engine::{Action, ActionRef, ScriptContext};
pub use error::{Fault, ParseError, ScriptError};
pub use script::Value;
