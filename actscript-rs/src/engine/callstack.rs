//! Explicit call stack of executing actions.
//!
//! Frames are pushed and popped by [`ScriptContext`](super::ScriptContext)
//! around every initialize/compile/execute call, so the stack mirrors the
//! path from the root to the action currently running.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use super::action::{children_of, describe, has_id, ActionRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Initializing,
    Compiling,
    ParsingArguments,
    Executing,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Loading => "Loading",
            Phase::Initializing => "Initializing",
            Phase::Compiling => "Compiling",
            Phase::ParsingArguments => "ParsingArguments",
            Phase::Executing => "Executing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallStackItem {
    pub phase: Phase,
    pub action: ActionRef,
}

#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<CallStackItem>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, phase: Phase, action: ActionRef) {
        self.frames.push(CallStackItem { phase, action });
    }

    pub fn pop(&mut self) -> Option<CallStackItem> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn top(&self) -> Option<&CallStackItem> {
        self.frames.last()
    }

    /// Change the phase of the innermost frame, returning the old one.
    pub fn set_phase(&mut self, phase: Phase) -> Option<Phase> {
        let top = self.frames.last_mut()?;
        Some(std::mem::replace(&mut top.phase, phase))
    }

    /// Frames from the root to the innermost.
    pub fn frames(&self) -> &[CallStackItem] {
        &self.frames
    }

    /// Look for `id` from the innermost frame outwards.  Each frame's own
    /// action is checked, then its direct children.  The first match that
    /// `accept` takes wins.
    pub fn find(&self, id: &str, accept: impl Fn(&ActionRef) -> bool) -> Option<ActionRef> {
        for frame in self.frames.iter().rev() {
            if has_id(&*frame.action, id) && accept(&frame.action) {
                return Some(Rc::clone(&frame.action));
            }
            for child in children_of(&*frame.action) {
                if has_id(&*child, id) && accept(&child) {
                    return Some(child);
                }
            }
        }
        None
    }

    /// Breadth-first search of the whole tree under the outermost frame.
    /// Nodes reachable along more than one path are visited once.
    pub fn find_tree(&self, id: &str, accept: impl Fn(&ActionRef) -> bool) -> Option<ActionRef> {
        let root = self.frames.first()?;
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([Rc::clone(&root.action)]);
        while let Some(action) = queue.pop_front() {
            if !seen.insert(Rc::as_ptr(&action) as *const () as usize) {
                continue;
            }
            if has_id(&*action, id) && accept(&action) {
                return Some(action);
            }
            queue.extend(children_of(&*action));
        }
        None
    }

    /// One line per frame, innermost first.
    pub fn format_trace(&self) -> String {
        let mut out = String::new();
        for frame in self.frames.iter().rev() {
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = write!(out, "   at {} ({})", describe(&*frame.action), frame.phase.name());
        }
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
