//! Typed errors for the flow runtime
//!
//! `EvalError` is fatal to the originating flow instance only: the scheduler
//! converts it into a `FlowFailed` event and tears down that instance's
//! subtree. `RuntimeError` is an operational failure of an `advance` call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Evaluation failure inside one flow instance.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum EvalError {
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("unknown attribute `{attribute}` on {kind}")]
    UnknownAttribute { kind: String, attribute: String },

    #[error("unknown reference `{0}`")]
    UnknownReference(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("{function}() expected {expected} argument(s), got {got}")]
    WrongArgCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid regex `{pattern}`: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("`{0}` used outside of a loop")]
    OutsideLoop(String),

    #[error("flow aborted: {0}")]
    Aborted(String),

    #[error("awaited {kind} failed: {message}")]
    AwaitedFailure { kind: String, message: String },
}

/// Operational failure of a scheduling step.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("internal event budget exhausted after {0} events in one step")]
    EventBudgetExhausted(usize),

    #[error("unknown flow `{0}`")]
    UnknownFlow(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}
