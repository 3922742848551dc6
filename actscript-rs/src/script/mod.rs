//! Expression language and variable expansion.
//!
//! - [`cursor`] / [`lexer`]: characters and tokens, numeric literal typing
//! - [`parser`]: recursive descent into an [`expr::Operation`] tree
//! - [`expr`]: stack-machine evaluation and the parse cache ([`Evaluator`])
//! - [`coerce`]: dynamic conversion between [`Value`] types
//! - [`expand`] / [`transform`]: `${…}` markers and text rules
//! - [`builtins`] / [`members`]: functions, receivers and value members
//!
//! # Quick start
//!
//! ```rust
//! use actscript::engine::ScriptContext;
//! use actscript::script::Value;
//!
//! let mut ctx = ScriptContext::new();
//! ctx.set("x", 6).unwrap();
//! assert_eq!(ctx.eval("$x * 7").unwrap(), Value::I32(42));
//! assert_eq!(ctx.expand("x is ${x}").unwrap(), Value::from("x is 6"));
//! ```

pub mod builtins;
pub mod coerce;
pub mod cursor;
pub mod expand;
pub mod expr;
pub mod lexer;
pub mod members;
pub mod ops;
pub mod parser;
pub mod transform;
pub mod value;

// Re-exports for convenience.
pub use coerce::{convert, to, FromValue, ValueType};
pub use expr::{evaluate, EvalContext, Evaluator, Operation};
pub use transform::{ReplaceRule, TransformRules};
pub use value::{EnumDef, EnumValue, ScriptObject, Value};
