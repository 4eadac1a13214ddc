//! Statement and expression node types
//!
//! This is the compiled form of the flow DSL that the runtime consumes. The
//! out-of-scope compiler serializes these nodes as JSON; everything here
//! round-trips through serde.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// One piece of an interpolated string literal ("... {$var} ...")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum InterpPart {
    Lit { v: String },
    Expr { expr: Expr },
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitNull,
    LitBool { v: bool },
    LitNum { v: f64 },
    LitStr { v: String },
    Interp { parts: Vec<InterpPart> },
    LitList { elements: Vec<Expr> },
    LitObj { properties: Vec<(String, Expr)> },
    Var { name: String },
    Member { object: Box<Expr>, property: String },
    Index { object: Box<Expr>, index: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Call { function: String, args: Vec<Expr> },
}

/// Expected value for one event field in a match expression.
///
/// `Set` is an unordered subset test, `Seq` an ordered subsequence test with
/// gaps, `Dict` a recursive sub-match over the listed keys only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FieldPattern {
    Value { expr: Expr },
    Regex { pattern: String },
    LessThan { expr: Expr },
    GreaterThan { expr: Expr },
    EqualLessThan { expr: Expr },
    EqualGreaterThan { expr: Expr },
    NotEqualTo { expr: Expr },
    Set { items: Vec<FieldPattern> },
    Seq { items: Vec<FieldPattern> },
    Dict { fields: BTreeMap<String, FieldPattern> },
}

/// Match expression over one event kind.
///
/// Field expressions are evaluated in the owning instance's scope at match
/// time; a BTreeMap keeps field iteration order stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPattern {
    pub event: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldPattern>,
}

/// Event synthesized by a `send` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<(String, Expr)>,
}

/// What a `start`/`await` statement launches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum StartTarget {
    Action {
        name: String,
        #[serde(default)]
        arguments: Vec<(String, Expr)>,
    },
    Flow {
        flow_id: String,
        #[serde(default)]
        arguments: Vec<(String, Expr)>,
    },
}

/// How an `and`/`or` group resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwaitPolicy {
    /// First member to resolve wins; the rest are cancelled
    Any,
    /// Every member must resolve
    All,
}

/// One member of an `await` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwaitMember {
    pub target: StartTarget,
    #[serde(default)]
    pub capture: Option<String>,
}

/// One `when`/`orwhen` competing branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenBranch {
    pub pattern: EventPattern,
    #[serde(default)]
    pub capture: Option<String>,
    pub body: Vec<Stmt>,
}

/// Statement AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Match {
        pattern: EventPattern,
        #[serde(default)]
        capture: Option<String>,
    },
    Send {
        event: EventSpec,
    },
    Start {
        target: StartTarget,
        #[serde(default)]
        capture: Option<String>,
    },
    Await {
        policy: AwaitPolicy,
        members: Vec<AwaitMember>,
    },
    When {
        branches: Vec<WhenBranch>,
    },
    If {
        test: Expr,
        then_body: Vec<Stmt>,
        #[serde(default)]
        else_body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Assign {
        name: String,
        expr: Expr,
    },
    Global {
        name: String,
    },
    Activate {
        flow_id: String,
        #[serde(default)]
        arguments: Vec<(String, Expr)>,
    },
    Priority {
        expr: Expr,
    },
    Return {
        #[serde(default)]
        values: Vec<(String, Expr)>,
    },
    Abort {
        #[serde(default)]
        message: Option<Expr>,
    },
}
