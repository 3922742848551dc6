//! Error taxonomy shared by the expression evaluator and the action engine.
//!
//! | Type | Catchable by a script `Catch` | Raised by |
//! |------|-------------------------------|-----------|
//! | [`ParseError`] | no | malformed expressions, invalid action trees |
//! | [`Fault::Runtime`] | yes | coercion failures, division by zero, unknown members … |
//! | [`Fault::User`] | yes | the `Throw` action |
//! | [`ScriptError::Terminated`] | no | cooperative cancellation |
//! | [`ScriptError::Traced`] | same as the wrapped error | any error escaping an action |

use thiserror::Error;

/// A malformed expression or action tree.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset}{}", source_suffix(.source_text))]
pub struct ParseError {
    pub message: String,
    /// Character offset into the parsed text.
    pub offset: usize,
    /// The text being parsed, when known.
    pub source_text: Option<String>,
}

fn source_suffix(src: &Option<String>) -> String {
    match src {
        Some(s) => format!(" in '{s}'"),
        None => String::new(),
    }
}

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        ParseError {
            message: message.into(),
            offset,
            source_text: None,
        }
    }

    /// Attach the source text if none was recorded yet.
    pub fn with_source(mut self, src: &str) -> Self {
        if self.source_text.is_none() {
            self.source_text = Some(src.to_owned());
        }
        self
    }
}

/// A value could not be converted to the requested type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("cannot convert {from} to {to}")]
    Mismatch { from: String, to: String },

    #[error("'{text}' is not a valid {to}")]
    Format { text: String, to: String },

    #[error("'{name}' is not a member of enum {enum_name}")]
    UnknownEnumMember { name: String, enum_name: String },
}

/// A catchable execution failure.
///
/// This is the only error type a script-level `Catch` ever sees; termination
/// and parse errors cannot be represented here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    #[error("{message}")]
    Runtime { message: String },

    #[error("{message}")]
    User { message: String },
}

impl Fault {
    pub fn message(&self) -> &str {
        match self {
            Fault::Runtime { message } | Fault::User { message } => message,
        }
    }

    /// Short kind name exposed to scripts as `Kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::Runtime { .. } => "ScriptRuntimeException",
            Fault::User { .. } => "ScriptUserException",
        }
    }
}

/// Any error produced while parsing, evaluating or executing a script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("script execution was aborted")]
    Terminated,

    /// An error that escaped an action, with the call stack at that point.
    #[error("{source}")]
    Traced {
        source: Box<ScriptError>,
        trace: String,
    },

    /// Broken evaluator invariant; never caused by script content.
    #[error("internal evaluator error: {0}")]
    Internal(String),
}

impl ScriptError {
    /// Shorthand for a catchable runtime fault.
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Fault(Fault::Runtime {
            message: message.into(),
        })
    }

    /// Shorthand for a catchable user fault.
    pub fn user(message: impl Into<String>) -> Self {
        ScriptError::Fault(Fault::User {
            message: message.into(),
        })
    }

    /// The error with any trace wrapper removed.
    pub fn innermost(&self) -> &ScriptError {
        match self {
            ScriptError::Traced { source, .. } => source.innermost(),
            other => other,
        }
    }

    pub fn is_traced(&self) -> bool {
        matches!(self, ScriptError::Traced { .. })
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.innermost(), ScriptError::Terminated)
    }

    /// The formatted call-stack trace, if one was attached.
    pub fn trace(&self) -> Option<&str> {
        match self {
            ScriptError::Traced { trace, .. } => Some(trace),
            _ => None,
        }
    }

    /// Split catchable faults from everything else.
    ///
    /// Returns `Ok` with the unwrapped fault, or gives the original error
    /// back untouched (trace included) when it must keep propagating.
    pub fn catchable(self) -> Result<Fault, ScriptError> {
        match self.innermost() {
            ScriptError::Fault(fault) => Ok(fault.clone()),
            _ => Err(self),
        }
    }
}

impl From<CoercionError> for ScriptError {
    fn from(e: CoercionError) -> Self {
        ScriptError::runtime(e.to_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_offset_and_source() {
        let e = ParseError::new("unexpected token", 4).with_source("1 2 +");
        assert_eq!(e.to_string(), "unexpected token at offset 4 in '1 2 +'");
    }

    #[test]
    fn traced_keeps_inner_message() {
        let inner = ScriptError::runtime("boom");
        let traced = ScriptError::Traced {
            source: Box::new(inner.clone()),
            trace: "at Sequence".into(),
        };
        assert_eq!(traced.to_string(), "boom");
        assert_eq!(traced.innermost(), &inner);
        assert_eq!(traced.trace(), Some("at Sequence"));
    }

    #[test]
    fn only_faults_are_catchable() {
        assert!(ScriptError::user("x").catchable().is_ok());
        assert!(ScriptError::Terminated.catchable().is_err());
        assert!(ScriptError::Parse(ParseError::new("bad", 0)).catchable().is_err());

        let traced = ScriptError::Traced {
            source: Box::new(ScriptError::Terminated),
            trace: String::new(),
        };
        let back = traced.clone().catchable().unwrap_err();
        assert_eq!(back, traced);
        assert!(back.is_terminated());
    }

    #[test]
    fn coercion_error_becomes_runtime_fault() {
        let e: ScriptError = CoercionError::Format {
            text: "abc".into(),
            to: "int".into(),
        }
        .into();
        assert_eq!(
            e.catchable(),
            Ok(Fault::Runtime {
                message: "'abc' is not a valid int".into()
            })
        );
    }
}
