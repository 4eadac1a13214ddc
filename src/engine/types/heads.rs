//! Instruction pointers: heads, frames and wait conditions
//!
//! A head is an explicit instruction pointer into a flow's statement tree.
//! Suspension is plain data: a blocked head carries the `WaitCondition` it is
//! parked on, and resumption is a normal function call that feeds the matched
//! event back in. Nothing here captures a stack.

use serde::{Deserialize, Serialize};

use super::ast::{AwaitPolicy, EventPattern, Stmt};
use crate::engine::errors::EvalError;

/* ===================== Frames ===================== */

/// Frame kind - the position state of one nesting level
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FrameKind {
    /// A statement sequence with a cursor
    Body { stmts: Vec<Stmt>, idx: usize },
    /// A loop header; re-evaluates its test each time it becomes the top frame
    While {
        test: super::ast::Expr,
        body: Vec<Stmt>,
    },
}

/// One nesting level of a head's position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
}

impl Frame {
    pub fn body(stmts: Vec<Stmt>) -> Self {
        Frame {
            kind: FrameKind::Body { stmts, idx: 0 },
        }
    }
}

/* ===================== Wait conditions ===================== */

/// What to cancel when a competing arm wins an `or` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum CancelTarget {
    Action { action_uid: String },
    Flow { instance_uid: String },
}

/// One pattern a blocked head is watching for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitArm {
    pub pattern: EventPattern,
    /// Name to bind the matched event to (`as $ref`)
    #[serde(default)]
    pub capture: Option<String>,
    /// Statements to execute when this arm wins (`when`/`orwhen` branch body)
    #[serde(default)]
    pub branch: Option<Vec<Stmt>>,
    /// Matching this arm fails the flow (await on `<A>Failed` / `FlowFailed`)
    #[serde(default)]
    pub fails: bool,
    /// What to stop if a sibling arm wins first
    #[serde(default)]
    pub cancel: Option<CancelTarget>,
    /// Set once this arm has matched (only meaningful under `All`)
    #[serde(default)]
    pub satisfied: bool,
}

impl WaitArm {
    pub fn new(pattern: EventPattern) -> Self {
        WaitArm {
            pattern,
            capture: None,
            branch: None,
            fails: false,
            cancel: None,
            satisfied: false,
        }
    }
}

/// The full suspension state of a blocked head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitCondition {
    pub policy: AwaitPolicy,
    pub arms: Vec<WaitArm>,
}

impl WaitCondition {
    pub fn single(arm: WaitArm) -> Self {
        WaitCondition {
            policy: AwaitPolicy::All,
            arms: vec![arm],
        }
    }

    /// True when the condition as a whole has resolved. Failure arms never
    /// count towards satisfaction; matching one fails the flow outright.
    pub fn is_satisfied(&self) -> bool {
        match self.policy {
            AwaitPolicy::Any => self.arms.iter().any(|a| a.satisfied && !a.fails),
            AwaitPolicy::All => self
                .arms
                .iter()
                .filter(|a| !a.fails)
                .all(|a| a.satisfied),
        }
    }
}

/* ===================== Heads ===================== */

/// Execution status of one head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HeadStatus {
    Runnable,
    Blocked(WaitCondition),
    Done,
}

/// An instruction pointer within a flow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Head {
    pub frames: Vec<Frame>,
    pub status: HeadStatus,
}

impl Head {
    /// A fresh head positioned at the start of a flow body.
    pub fn at_body(body: Vec<Stmt>) -> Self {
        Head {
            frames: vec![Frame::body(body)],
            status: HeadStatus::Runnable,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.status, HeadStatus::Blocked(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, HeadStatus::Done)
    }
}

/* ===================== Step outcomes ===================== */

/// Result of running one head to its next suspension point.
#[derive(Debug)]
pub enum HeadOutcome {
    /// Head parked on a wait condition
    Blocked,
    /// Head ran off the end of its frames (or hit `return`)
    Finished,
}

/// Result of executing a single statement.
#[derive(Debug)]
pub enum StmtOutcome {
    Continue,
    Block(WaitCondition),
    Push(Frame),
    Break,
    LoopContinue,
    Return,
    Fail(EvalError),
}
