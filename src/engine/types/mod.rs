//! Type definitions for the engine
//!
//! This module contains all the core types the scheduler consumes:
//! - AST nodes (Stmt, Expr, patterns)
//! - Runtime values (Val)
//! - Instruction pointers (Head, Frame, WaitCondition)

pub mod ast;
pub mod heads;
pub mod values;

// Re-export all types for convenient access
pub use ast::{
    AwaitMember, AwaitPolicy, BinOp, EventPattern, EventSpec, Expr, FieldPattern, InterpPart,
    StartTarget, Stmt, UnaryOp, WhenBranch,
};
pub use heads::{
    CancelTarget, Frame, FrameKind, Head, HeadOutcome, HeadStatus, StmtOutcome, WaitArm,
    WaitCondition,
};
pub use values::Val;
