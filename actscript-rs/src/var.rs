//! Script variable store.
//!
//! Names are case-insensitive and iteration follows insertion order.
//! Some names are *computed* rather than stored:
//!
//! | Leading char | Meaning | Example |
//! |--------------|---------|---------|
//! | digit or `=` | inline expression, evaluated on read | `=1+2`, `5*$x` |
//! | `\|` | inline multi-expression, evaluated on read | `\|a\|b\|=0` |
//! | `%` | environment variable, optionally scoped | `%PATH%`, `%process:HOME%` |
//! | `~` | action looked up by id in the running action tree | `~mySub` |
//!
//! Computed names can be read through the context but never assigned.

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::ScriptError;
use crate::script::Value;

/// Where a `%NAME%` lookup reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvScope {
    Process,
    User,
    Machine,
}

/// What a variable name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind<'a> {
    Plain,
    Expr(&'a str),
    Multi(&'a str),
    Env { scope: EnvScope, name: &'a str },
    Tree(&'a str),
}

/// Classify a variable name.
pub fn classify(name: &str) -> NameKind<'_> {
    let Some(first) = name.chars().next() else {
        return NameKind::Plain;
    };
    match first {
        c if c.is_ascii_digit() => NameKind::Expr(name),
        '=' => NameKind::Expr(&name[1..]),
        '|' => NameKind::Multi(&name[1..]),
        '~' => NameKind::Tree(&name[1..]),
        '%' => {
            let body = &name[1..];
            let body = body.strip_suffix('%').unwrap_or(body);
            let (scope, rest) = match body.split_once(':') {
                Some((s, rest)) if s.eq_ignore_ascii_case("process") => (EnvScope::Process, rest),
                Some((s, rest)) if s.eq_ignore_ascii_case("user") => (EnvScope::User, rest),
                Some((s, rest)) if s.eq_ignore_ascii_case("machine") => (EnvScope::Machine, rest),
                _ => (EnvScope::Process, body),
            };
            NameKind::Env { scope, name: rest }
        }
        _ => NameKind::Plain,
    }
}

/// Read an environment variable.
///
/// Only the process environment is available; user and machine scopes
/// always read as unset.
pub fn env_var(scope: EnvScope, name: &str) -> Option<String> {
    match scope {
        EnvScope::Process => std::env::var(name).ok(),
        EnvScope::User | EnvScope::Machine => None,
    }
}

/// Ordered, case-insensitive name → value map.
#[derive(Debug, Clone, Default)]
pub struct Vars {
    entries: Vec<(String, Value)>,
    /// Lowercased name → index into `entries`.
    index: FxHashMap<String, usize>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.  Computed names are rejected.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ScriptError> {
        if name.is_empty() {
            return Err(ScriptError::runtime("variable name cannot be empty"));
        }
        if classify(name) != NameKind::Plain {
            return Err(ScriptError::runtime(format!(
                "variable '{name}' is computed and cannot be assigned"
            )));
        }
        let key = name.to_lowercase();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((name.to_owned(), value));
            }
        }
        Ok(())
    }

    /// Stored value of a plain variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let i = *self.index.get(&name.to_lowercase())?;
        Some(&self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Remove a variable, returning its value.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        let i = self.index.remove(&name.to_lowercase())?;
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Variables in insertion order, with their original spelling.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Build from pairs, failing on the first computed or empty name.
    pub fn try_from_iter<I>(iter: I) -> Result<Self, ScriptError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut vars = Vars::new();
        for (name, value) in iter {
            vars.set(&name, value)?;
        }
        Ok(vars)
    }
}

impl FromIterator<(String, Value)> for Vars {
    /// Later duplicates overwrite earlier ones.  Computed and empty names
    /// are dropped with a warning; use [`Vars::try_from_iter`] to reject them.
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut vars = Vars::new();
        for (name, value) in iter {
            if let Err(err) = vars.set(&name, value) {
                warn!(name = %name, error = %err, "dropping variable");
            }
        }
        vars
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
