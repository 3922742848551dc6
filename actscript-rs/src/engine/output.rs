//! Output targets for `Print` and host code.
//!
//! The context keeps a stack of targets; the innermost receives every line.
//! With nothing pushed, lines go to stdout.

use std::fmt;
use std::io::{self, Write};

use crate::error::ScriptError;

pub enum Output {
    Stdout,
    Stderr,
    /// Lines kept in memory.
    Capture(Vec<String>),
    Writer(Box<dyn Write>),
}

impl Output {
    pub fn capture() -> Self {
        Output::Capture(Vec::new())
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), ScriptError> {
        let result = match self {
            Output::Stdout => writeln!(io::stdout().lock(), "{line}"),
            Output::Stderr => writeln!(io::stderr().lock(), "{line}"),
            Output::Capture(lines) => {
                lines.push(line.to_owned());
                Ok(())
            }
            Output::Writer(w) => writeln!(w, "{line}"),
        };
        result.map_err(|e| ScriptError::runtime(format!("cannot write output: {e}")))
    }

    /// Captured lines; empty for other targets.
    pub fn into_lines(self) -> Vec<String> {
        match self {
            Output::Capture(lines) => lines,
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stdout => f.write_str("Stdout"),
            Output::Stderr => f.write_str("Stderr"),
            Output::Capture(lines) => f.debug_tuple("Capture").field(lines).finish(),
            Output::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
