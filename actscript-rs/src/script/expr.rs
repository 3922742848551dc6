//! Expression tree and stack-machine evaluator.
//!
//! Every [`Operation`] pushes exactly one [`Value`] onto the shared stack.
//! Composite nodes evaluate their children left to right (each child pushes
//! one value) and then pop them in reverse push order.  `&&`, `||`, `??` and
//! `?:` decide at node level whether to evaluate a subtree at all, so an
//! unevaluated branch can never fault.
//!
//! Parsing lives in [`super::parser`]; [`Evaluator`] ties the two together
//! and caches parsed trees by source text.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use super::coerce::{convert, ValueType};
use super::members;
use super::ops::{self, BinOp, UnaryOp};
use super::parser;
use super::value::{Value, MAX_ALLOC_LEN};
use crate::error::{ParseError, ScriptError};

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the evaluator.
///
/// [`ScriptContext`](crate::engine::ScriptContext) implements this to give
/// expressions access to variables, types and external functions.
pub trait EvalContext {
    /// Look up a variable; `Ok(None)` when it is not set.
    fn get_var(&mut self, name: &str) -> Result<Option<Value>, ScriptError>;

    fn set_var(&mut self, name: &str, value: Value) -> Result<(), ScriptError>;

    /// Resolve a type name used in a cast or array constructor.
    fn resolve_type(&self, name: &str) -> Option<ValueType> {
        ValueType::builtin(name)
    }

    /// Call a bare function name.
    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError>;

    /// `Type.Member` (`args` is `None`) or `Type.Method(args)`.
    /// `Ok(None)` when `type_name` is not a known type.
    fn call_static(
        &mut self,
        _type_name: &str,
        _member: &str,
        _args: Option<Vec<Value>>,
    ) -> Result<Option<Value>, ScriptError> {
        Ok(None)
    }
}

// ── Operation ─────────────────────────────────────────────────────────────────

/// A type named in a cast or array constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub name: String,
    pub array: bool,
}

impl TypeRef {
    fn resolve(&self, ctx: &dyn EvalContext) -> Result<ValueType, ScriptError> {
        let base = ctx
            .resolve_type(&self.name)
            .ok_or_else(|| ScriptError::runtime(format!("unknown type '{}'", self.name)))?;
        Ok(if self.array {
            ValueType::Array(Box::new(base))
        } else {
            base
        })
    }
}

/// One alternative of a multi-expression `a|b|=expr`.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Variable name, wins when set.
    Name(String),
    /// `$…` or `(…)` expression, wins when non-null.
    Expr(Operation),
    /// Empty alternative, resolves to `""`.
    Empty,
    /// `=expr`, evaluated unconditionally.
    Fallback(Operation),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Literal(Value),
    Var(String),
    /// `$a.b.c`: the longest set dotted prefix is the variable, the rest are
    /// member accesses.
    Path(Vec<String>),
    Assign {
        name: String,
        op: Option<BinOp>,
        value: Box<Operation>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Operation>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Operation>,
        rhs: Box<Operation>,
    },
    And(Box<Operation>, Box<Operation>),
    Or(Box<Operation>, Box<Operation>),
    Coalesce(Box<Operation>, Box<Operation>),
    Ternary {
        cond: Box<Operation>,
        then: Box<Operation>,
        otherwise: Box<Operation>,
    },
    Cast {
        ty: TypeRef,
        operand: Box<Operation>,
    },
    Index {
        target: Box<Operation>,
        index: Box<Operation>,
    },
    Member {
        target: Box<Operation>,
        name: String,
    },
    MethodCall {
        target: Box<Operation>,
        name: String,
        args: Vec<Operation>,
    },
    /// Bare `name(args)`, dispatched through the context.
    Call {
        name: String,
        args: Vec<Operation>,
    },
    /// `Type.Member` or `Type.Method(args)`.
    Static {
        type_name: String,
        member: String,
        args: Option<Vec<Operation>>,
    },
    /// `{a, b}`, `new T[]{a, b}`, `new[]{a, b}`
    Array {
        elem: Option<TypeRef>,
        items: Vec<Operation>,
    },
    /// `new T[n]`
    NewArray {
        elem: TypeRef,
        len: Box<Operation>,
    },
    Multi(Vec<Segment>),
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, ScriptError> {
    stack
        .pop()
        .ok_or_else(|| ScriptError::Internal("value stack underflow".into()))
}

/// Pop `n` values, returned in push order.
fn pop_n(stack: &mut Vec<Value>, n: usize) -> Result<Vec<Value>, ScriptError> {
    if stack.len() < n {
        return Err(ScriptError::Internal("value stack underflow".into()));
    }
    Ok(stack.split_off(stack.len() - n))
}

fn not_defined(name: &str) -> ScriptError {
    ScriptError::runtime(format!("variable '{name}' is not defined"))
}

impl Operation {
    /// Evaluate this node, pushing exactly one value.
    pub fn eval(&self, ctx: &mut dyn EvalContext, stack: &mut Vec<Value>) -> Result<(), ScriptError> {
        let v = match self {
            Operation::Literal(v) => v.clone(),

            Operation::Var(name) => ctx.get_var(name)?.ok_or_else(|| not_defined(name))?,

            Operation::Path(parts) => {
                let mut found = None;
                for i in (1..=parts.len()).rev() {
                    if let Some(v) = ctx.get_var(&parts[..i].join("."))? {
                        found = Some((v, i));
                        break;
                    }
                }
                let (mut v, used) = found.ok_or_else(|| not_defined(&parts[0]))?;
                for member in &parts[used..] {
                    v = members::get(&v, member)?;
                }
                v
            }

            Operation::Assign { name, op, value } => {
                value.eval(ctx, stack)?;
                let rhs = pop(stack)?;
                let result = match op {
                    None => rhs,
                    Some(op) => {
                        let current = ctx.get_var(name)?.ok_or_else(|| not_defined(name))?;
                        ops::binary(*op, &current, &rhs)?
                    }
                };
                ctx.set_var(name, result.clone())?;
                result
            }

            Operation::Unary { op, operand } => {
                operand.eval(ctx, stack)?;
                let v = pop(stack)?;
                ops::unary(*op, &v)?
            }

            Operation::Binary { op, lhs, rhs } => {
                lhs.eval(ctx, stack)?;
                rhs.eval(ctx, stack)?;
                let r = pop(stack)?;
                let l = pop(stack)?;
                ops::binary(*op, &l, &r)?
            }

            Operation::And(lhs, rhs) => {
                lhs.eval(ctx, stack)?;
                if pop(stack)?.is_truthy() {
                    rhs.eval(ctx, stack)?;
                    Value::Bool(pop(stack)?.is_truthy())
                } else {
                    Value::Bool(false)
                }
            }

            Operation::Or(lhs, rhs) => {
                lhs.eval(ctx, stack)?;
                if pop(stack)?.is_truthy() {
                    Value::Bool(true)
                } else {
                    rhs.eval(ctx, stack)?;
                    Value::Bool(pop(stack)?.is_truthy())
                }
            }

            Operation::Coalesce(lhs, rhs) => {
                lhs.eval(ctx, stack)?;
                let l = pop(stack)?;
                if l.is_null() {
                    rhs.eval(ctx, stack)?;
                    pop(stack)?
                } else {
                    l
                }
            }

            Operation::Ternary { cond, then, otherwise } => {
                cond.eval(ctx, stack)?;
                let branch = if pop(stack)?.is_truthy() { then } else { otherwise };
                branch.eval(ctx, stack)?;
                pop(stack)?
            }

            Operation::Cast { ty, operand } => {
                operand.eval(ctx, stack)?;
                let v = pop(stack)?;
                convert(&v, &ty.resolve(ctx)?)?
            }

            Operation::Index { target, index } => {
                target.eval(ctx, stack)?;
                index.eval(ctx, stack)?;
                let i = pop(stack)?;
                let t = pop(stack)?;
                members::index(&t, &i)?
            }

            Operation::Member { target, name } => {
                target.eval(ctx, stack)?;
                let t = pop(stack)?;
                members::get(&t, name)?
            }

            Operation::MethodCall { target, name, args } => {
                target.eval(ctx, stack)?;
                let args = eval_args(args, ctx, stack)?;
                let t = pop(stack)?;
                members::call(&t, name, &args)?
            }

            Operation::Call { name, args } => {
                let args = eval_args(args, ctx, stack)?;
                ctx.call(name, args)?
            }

            Operation::Static { type_name, member, args } => {
                let args = match args {
                    Some(a) => Some(eval_args(a, ctx, stack)?),
                    None => None,
                };
                match ctx.call_static(type_name, member, args.clone())? {
                    Some(v) => v,
                    // `name.Member` on a bare variable name
                    None => match ctx.get_var(type_name)? {
                        Some(v) => match &args {
                            Some(a) => members::call(&v, member, a)?,
                            None => members::get(&v, member)?,
                        },
                        None => {
                            return Err(ScriptError::runtime(format!(
                                "'{type_name}' is not a known type or variable"
                            )))
                        }
                    },
                }
            }

            Operation::Array { elem, items } => {
                let values = eval_args(items, ctx, stack)?;
                match elem {
                    Some(ty) => {
                        let ty = ty.resolve(ctx)?;
                        values
                            .iter()
                            .map(|v| convert(v, &ty))
                            .collect::<Result<Vec<_>, _>>()
                            .map(Value::Array)?
                    }
                    None => Value::Array(values),
                }
            }

            Operation::NewArray { elem, len } => {
                len.eval(ctx, stack)?;
                let n = pop(stack)?;
                let n = match convert(&n, &ValueType::I64)? {
                    Value::I64(n) if n >= 0 && n as u64 <= MAX_ALLOC_LEN as u64 => n as usize,
                    _ => return Err(ScriptError::runtime(format!("invalid array length {n}"))),
                };
                let fill = convert(&Value::Null, &elem.resolve(ctx)?)?;
                let mut items = Vec::new();
                items.try_reserve_exact(n).map_err(|_| {
                    ScriptError::runtime(format!("cannot allocate an array of {n} elements"))
                })?;
                items.resize(n, fill);
                Value::Array(items)
            }

            Operation::Multi(segments) => eval_multi(segments, ctx, stack)?,
        };
        stack.push(v);
        Ok(())
    }
}

fn eval_args(
    args: &[Operation],
    ctx: &mut dyn EvalContext,
    stack: &mut Vec<Value>,
) -> Result<Vec<Value>, ScriptError> {
    for a in args {
        a.eval(ctx, stack)?;
    }
    pop_n(stack, args.len())
}

fn eval_multi(
    segments: &[Segment],
    ctx: &mut dyn EvalContext,
    stack: &mut Vec<Value>,
) -> Result<Value, ScriptError> {
    for seg in segments {
        match seg {
            Segment::Name(name) => {
                if let Some(v) = ctx.get_var(name)? {
                    return Ok(v);
                }
            }
            Segment::Expr(op) => {
                op.eval(ctx, stack)?;
                let v = pop(stack)?;
                if !v.is_null() {
                    return Ok(v);
                }
            }
            Segment::Empty => return Ok(Value::Str(String::new())),
            Segment::Fallback(op) => {
                op.eval(ctx, stack)?;
                return pop(stack);
            }
        }
    }
    let first = segments.iter().find_map(|s| match s {
        Segment::Name(n) => Some(n.as_str()),
        _ => None,
    });
    Err(match first {
        Some(name) => not_defined(name),
        None => ScriptError::runtime("no alternative of the expression produced a value"),
    })
}

/// Evaluate a parsed tree on a fresh stack.
pub fn evaluate(op: &Operation, ctx: &mut dyn EvalContext) -> Result<Value, ScriptError> {
    let mut stack = Vec::with_capacity(8);
    op.eval(ctx, &mut stack)?;
    match (stack.pop(), stack.len()) {
        (Some(v), 0) => Ok(v),
        (_, n) => Err(ScriptError::Internal(format!(
            "evaluation ended with stack depth {}",
            n + 1
        ))),
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Parser front-end with a source-text cache.
///
/// A capacity of `0` disables caching.  When the cache is full it is
/// cleared wholesale before the next insert.
#[derive(Debug, Default)]
pub struct Evaluator {
    exprs: FxHashMap<String, Rc<Operation>>,
    multis: FxHashMap<String, Rc<Operation>>,
    capacity: usize,
}

impl Evaluator {
    pub fn new(capacity: usize) -> Self {
        Evaluator {
            exprs: FxHashMap::default(),
            multis: FxHashMap::default(),
            capacity,
        }
    }

    /// Number of cached trees.
    pub fn cached(&self) -> usize {
        self.exprs.len() + self.multis.len()
    }

    pub fn clear(&mut self) {
        self.exprs.clear();
        self.multis.clear();
    }

    /// Parse an expression, reusing a cached tree for identical text.
    pub fn parse(&mut self, text: &str) -> Result<Rc<Operation>, ParseError> {
        self.lookup(text, false)
    }

    /// Parse a multi-expression `a|b|=expr`.
    pub fn parse_multi(&mut self, text: &str) -> Result<Rc<Operation>, ParseError> {
        self.lookup(text, true)
    }

    fn lookup(&mut self, text: &str, multi: bool) -> Result<Rc<Operation>, ParseError> {
        let map = if multi { &self.multis } else { &self.exprs };
        if let Some(op) = map.get(text) {
            return Ok(Rc::clone(op));
        }
        let op = Rc::new(if multi {
            parser::parse_multi(text)?
        } else {
            parser::parse_expression(text)?
        });
        if self.capacity > 0 {
            debug!(text, multi, "expression cache miss");
            if self.cached() >= self.capacity {
                self.clear();
            }
            let map = if multi { &mut self.multis } else { &mut self.exprs };
            map.insert(text.to_owned(), Rc::clone(&op));
        }
        Ok(op)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
