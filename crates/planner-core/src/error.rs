//! Planner-level error types.
//!
//! Mirrors the shape of the rest of this crate's fallible APIs: hand-written
//! enums with a manual `Display`/`Error` impl rather than a derive-macro
//! crate, so every variant can carry exactly the structured payload its
//! caller needs instead of a generic message string.

use std::fmt;

/// Position of an event within the parser's event stream, for error
/// reporting (spec §6 "Exit/error surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventPosition {
    /// Index of the event that was being processed when the error occurred.
    pub index: u32,
    /// Total number of events in the stream.
    pub total: u32,
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {} of {}", self.index, self.total)
    }
}

/// A worked example offered alongside a `TargetNotFound` error, so callers
/// can show the user what a valid invocation looks like.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Example {
    pub description: String,
    pub snippet: String,
}

/// Top-level planner failure (spec §7).
///
/// Structural and type errors are local to the failing statement; resolver
/// errors abort the current wave and the planner run. No variant here is
/// ever constructed from a caught-and-discarded traversal error — every
/// fallible traversal returns `Result` and propagates with `?`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PlannerError {
    /// The parser reported errors; the planner refuses to proceed.
    ParseConsumed { messages: Vec<String> },
    /// Missing required name, malformed literal, or duplicate declaration
    /// discovered while building IR.
    StructuralIr {
        message: String,
        position: EventPosition,
    },
    /// `undefined variable "X"` during resolution.
    UndefinedName {
        name: String,
        position: EventPosition,
    },
    /// Non-numeric comparison, bad cast without the optional flag, or a
    /// pattern-match kind mismatch.
    TypeError {
        message: String,
        position: EventPosition,
    },
    /// A decorator batch failed to resolve. The decorator path and call
    /// index are prepended to the inner message, verbatim, as spec §7
    /// requires.
    DecoratorError {
        path: String,
        call_index: usize,
        message: String,
    },
    /// The wave loop's cancellation handle fired between waves or batches.
    Canceled { cause: String },
    /// The materialized plan failed plan-format validation.
    PlanValidation { message: String },
    /// Command mode: no function with the requested name exists.
    TargetNotFound {
        name: String,
        suggestion: Option<String>,
        available: Vec<String>,
        example: Example,
        position: EventPosition,
    },
    /// The wave fixpoint terminated with unresolved blockers and made no
    /// progress on its final pass.
    ResolutionStalled {
        stalling_name: String,
        position: EventPosition,
    },
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseConsumed { messages } => {
                write!(f, "refusing to plan: parser reported {} error(s): {}", messages.len(), messages.join("; "))
            }
            Self::StructuralIr { message, position } => {
                write!(f, "malformed IR at {position}: {message}")
            }
            Self::UndefinedName { name, position } => {
                write!(f, "undefined variable \"{name}\" at {position}")
            }
            Self::TypeError { message, position } => {
                write!(f, "type error at {position}: {message}")
            }
            Self::DecoratorError { path, call_index, message } => {
                write!(f, "{path}[{call_index}]: {message}")
            }
            Self::Canceled { cause } => write!(f, "resolution canceled: {cause}"),
            Self::PlanValidation { message } => write!(f, "plan validation failed: {message}"),
            Self::TargetNotFound { name, suggestion, available, position, .. } => {
                write!(f, "no such command \"{name}\" at {position}")?;
                if let Some(suggestion) = suggestion {
                    write!(f, " (did you mean \"{suggestion}\"?)")?;
                }
                if !available.is_empty() {
                    write!(f, " — available: {}", available.join(", "))?;
                }
                Ok(())
            }
            Self::ResolutionStalled { stalling_name, position } => {
                write!(f, "resolution stalled at {position}: no progress possible, stalled on \"{stalling_name}\"")
            }
        }
    }
}

impl std::error::Error for PlannerError {}

/// Result alias used throughout the builder and resolver.
pub type PlannerResult<T> = Result<T, PlannerError>;
