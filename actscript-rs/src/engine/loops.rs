//! Loops: [`ForEach`], [`While`], and the [`RowSet`] row source.

use tracing::debug;

use super::action::{run_all, Action, ActionRef, ExecResult, Row, RowSource, Signal};
use super::cond::Condition;
use super::context::ScriptContext;
use crate::error::ScriptError;
use crate::script::Value;

/// What `ForEach` iterates.
#[derive(Debug, Clone)]
pub enum LoopSource {
    /// Rows of the row source with this id.
    Rows(String),
    /// Elements of an expanded value: arrays iterate, null is empty, any
    /// other value (strings included) is a single element.
    Value(String),
}

#[derive(Debug)]
pub struct ForEach {
    id: Option<String>,
    source: LoopSource,
    /// Variable receiving each element of a `Value` source.
    var: String,
    prefix: String,
    max_count: Option<u64>,
    body: Vec<ActionRef>,
}

impl ForEach {
    pub fn new(source: LoopSource, body: Vec<ActionRef>) -> Self {
        ForEach {
            id: None,
            source,
            var: "item".to_owned(),
            prefix: String::new(),
            max_count: None,
            body,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_var(mut self, var: impl Into<String>) -> Self {
        self.var = var.into();
        self
    }

    /// Bind loop variables as `prefix + name`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Stop once `max` iterations have run.
    pub fn with_max_count(mut self, max: u64) -> Self {
        self.max_count = Some(max);
        self
    }

    fn rows(&self, ctx: &mut ScriptContext) -> Result<Vec<Row>, ScriptError> {
        match &self.source {
            LoopSource::Rows(id) => {
                let source = ctx
                    .find_action(id)
                    .or_else(|| ctx.find_tree_action(id))
                    .ok_or_else(|| ScriptError::runtime(format!("row source '{id}' not found")))?;
                match source.as_row_source() {
                    Some(rows) => rows.rows(ctx),
                    None => Err(ScriptError::runtime(format!(
                        "{} '{id}' is not a row source",
                        source.kind()
                    ))),
                }
            }
            LoopSource::Value(text) => {
                let items = match ctx.expand(text)? {
                    Value::Null => Vec::new(),
                    Value::Array(items) => items,
                    single => vec![single],
                };
                Ok(items
                    .into_iter()
                    .map(|v| vec![(self.var.clone(), v)])
                    .collect())
            }
        }
    }
}

impl Action for ForEach {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn kind(&self) -> &'static str {
        "ForEach"
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        let mut count = 0u64;
        for row in self.rows(ctx)? {
            if self.max_count.is_some_and(|max| count >= max) {
                break;
            }
            count += 1;
            match ctx.execute_with_vars(&self.body, row, &self.prefix)? {
                Some(Signal::Break) => break,
                Some(signal) => return Ok(Some(signal)),
                None => {}
            }
        }
        debug!(iterations = count, "foreach finished");
        Ok(None)
    }

    fn for_all_children(&self, visit: &mut dyn FnMut(&ActionRef)) {
        self.body.iter().for_each(visit);
    }
}

// ── While ─────────────────────────────────────────────────────────────────────

/// Repeat the body while the condition holds.  Besides its own optional
/// cap, the loop is bounded by `max_loop_iterations` from the engine
/// configuration, which raises a runtime fault instead of stopping quietly.
#[derive(Debug)]
pub struct While {
    id: Option<String>,
    condition: Condition,
    max_count: Option<u64>,
    body: Vec<ActionRef>,
}

impl While {
    pub fn new(condition: Condition, body: Vec<ActionRef>) -> Self {
        While {
            id: None,
            condition,
            max_count: None,
            body,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_max_count(mut self, max: u64) -> Self {
        self.max_count = Some(max);
        self
    }
}

impl Action for While {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn kind(&self) -> &'static str {
        "While"
    }

    fn compile(&self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.condition.compile(ctx)
    }

    fn execute(&self, ctx: &mut ScriptContext) -> ExecResult {
        let guard = ctx.config().max_loop_iterations;
        let mut count = 0u64;
        while self.condition.eval(ctx)? {
            if self.max_count.is_some_and(|max| count >= max) {
                break;
            }
            if guard > 0 && count >= guard {
                return Err(ScriptError::runtime(format!(
                    "While loop exceeded {guard} iterations"
                )));
            }
            count += 1;
            match run_all(ctx, &self.body)? {
                Some(Signal::Break) => break,
                Some(signal) => return Ok(Some(signal)),
                None => {}
            }
        }
        debug!(iterations = count, "while finished");
        Ok(None)
    }

    fn for_all_children(&self, visit: &mut dyn FnMut(&ActionRef)) {
        self.body.iter().for_each(visit);
    }
}

// ── RowSet ────────────────────────────────────────────────────────────────────

/// Inline table usable as a `ForEach` row source.  Does nothing when
/// executed.
#[derive(Debug)]
pub struct RowSet {
    id: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(id: impl Into<String>, columns: &[&str]) -> Self {
        RowSet {
            id: id.into(),
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; missing trailing cells read as null.
    pub fn row(mut self, cells: Vec<Value>) -> Self {
        self.rows.push(cells);
        self
    }
}

impl RowSource for RowSet {
    fn rows(&self, _ctx: &mut ScriptContext) -> Result<Vec<Row>, ScriptError> {
        self.rows
            .iter()
            .map(|cells| {
                if cells.len() > self.columns.len() {
                    return Err(ScriptError::runtime(format!(
                        "row set '{}' has {} columns but a row has {} cells",
                        self.id,
                        self.columns.len(),
                        cells.len()
                    )));
                }
                Ok(self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.clone(), cells.get(i).cloned().unwrap_or_default()))
                    .collect())
            })
            .collect()
    }
}

impl Action for RowSet {
    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn kind(&self) -> &'static str {
        "RowSet"
    }

    fn execute(&self, _ctx: &mut ScriptContext) -> ExecResult {
        Ok(None)
    }

    fn as_row_source(&self) -> Option<&dyn RowSource> {
        Some(self)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
