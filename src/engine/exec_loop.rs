//! Head step loop
//!
//! Runs one head statement by statement until it blocks on a wait condition,
//! runs off the end of its frames or fails. The cursor advances before the
//! statement executes, so resuming a blocked head naturally continues at the
//! statement after the one that parked it.

use super::errors::EvalError;
use super::expressions::eval;
use super::outbox::Outbox;
use super::state::{EngineState, FlowInstance};
use super::statements::{eval_ctx, exec_stmt};
use super::types::{Expr, Frame, FrameKind, HeadOutcome, HeadStatus, Stmt, StmtOutcome};

enum Next {
    Stmt(Stmt),
    Loop { test: Expr, body: Vec<Stmt> },
    Pop,
    Done,
}

/// Run one head until it suspends or finishes.
pub fn run_head(
    instance: &mut FlowInstance,
    head_idx: usize,
    state: &mut EngineState,
    outbox: &mut Outbox,
) -> Result<HeadOutcome, EvalError> {
    loop {
        let next = {
            let head = &mut instance.heads[head_idx];
            match head.frames.last_mut() {
                None => Next::Done,
                Some(frame) => match &mut frame.kind {
                    FrameKind::Body { stmts, idx } => {
                        if *idx >= stmts.len() {
                            Next::Pop
                        } else {
                            let stmt = stmts[*idx].clone();
                            *idx += 1;
                            Next::Stmt(stmt)
                        }
                    }
                    FrameKind::While { test, body } => Next::Loop {
                        test: test.clone(),
                        body: body.clone(),
                    },
                },
            }
        };

        match next {
            Next::Done => {
                instance.heads[head_idx].status = HeadStatus::Done;
                return Ok(HeadOutcome::Finished);
            }

            Next::Pop => {
                instance.heads[head_idx].frames.pop();
            }

            Next::Loop { test, body } => {
                let taken = {
                    let ctx = eval_ctx(instance, state, outbox);
                    eval(&test, &ctx)?.is_truthy()
                };
                let head = &mut instance.heads[head_idx];
                if taken {
                    head.frames.push(Frame::body(body));
                } else {
                    head.frames.pop();
                }
            }

            Next::Stmt(stmt) => match exec_stmt(&stmt, instance, state, outbox) {
                StmtOutcome::Continue => {}

                StmtOutcome::Push(frame) => {
                    instance.heads[head_idx].frames.push(frame);
                }

                StmtOutcome::Block(condition) => {
                    instance.heads[head_idx].status = HeadStatus::Blocked(condition);
                    return Ok(HeadOutcome::Blocked);
                }

                StmtOutcome::Break => {
                    let head = &mut instance.heads[head_idx];
                    let mut found = false;
                    while let Some(frame) = head.frames.pop() {
                        if matches!(frame.kind, FrameKind::While { .. }) {
                            found = true;
                            break;
                        }
                    }
                    if !found {
                        return Err(EvalError::OutsideLoop("break".to_string()));
                    }
                }

                StmtOutcome::LoopContinue => {
                    let head = &mut instance.heads[head_idx];
                    // Pop body frames back to the loop header; it re-evaluates
                    // its test on the next iteration.
                    while matches!(
                        head.frames.last().map(|f| &f.kind),
                        Some(FrameKind::Body { .. })
                    ) {
                        head.frames.pop();
                    }
                    if head.frames.is_empty() {
                        return Err(EvalError::OutsideLoop("continue".to_string()));
                    }
                }

                StmtOutcome::Return => {
                    let head = &mut instance.heads[head_idx];
                    head.frames.clear();
                    head.status = HeadStatus::Done;
                    return Ok(HeadOutcome::Finished);
                }

                StmtOutcome::Fail(e) => return Err(e),
            },
        }
    }
}
