//! # Flow engine - deterministic event-driven interpreter
//!
//! Single-threaded core that interprets compiled flow definitions against a
//! stream of events.
//!
//! ## Core principles
//!
//! 1. **Heads, not call stacks**: every suspension point is explicit data in
//!    `frames: Vec<Frame>`, no recursion, no captured futures
//! 2. **Two-pass dispatch**: a read-only match scan, then a commit pass, so
//!    every blocked head sees the same event regardless of wake order
//! 3. **Outbox side effects**: statement handlers record effects, the
//!    scheduler applies them in a fixed order
//! 4. **Deterministic identity**: monotonic uids and a logical clock make a
//!    replayed event sequence byte-identical

pub mod errors;
pub mod exec_loop;
pub mod expressions;
pub mod lifecycle;
pub mod matching;
pub mod outbox;
pub mod resolver;
pub mod runtime;
pub mod state;
pub mod statements;
pub mod stdlib;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use errors::{EvalError, RuntimeError};
pub use runtime::Runtime;
pub use state::{ActionState, EngineState, FlowInstance};
pub use types::{Expr, Stmt, Val};
