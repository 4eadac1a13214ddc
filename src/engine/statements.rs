//! Statement handlers
//!
//! One function per statement kind, each returning a `StmtOutcome` that tells
//! the step loop how to move the head. Side effects go through the `Outbox`;
//! nothing here touches the event queue or the action table directly.

use std::collections::BTreeMap;

use crate::events::{self, names, EventKind};

use super::errors::EvalError;
use super::expressions::{eval, write_var, EvalCtx};
use super::outbox::Outbox;
use super::state::{ActionState, EngineState, FlowInstance};
use super::types::{
    AwaitPolicy, CancelTarget, EventPattern, EventSpec, Expr, FieldPattern, Frame, StartTarget,
    Stmt, StmtOutcome, Val, WaitArm, WaitCondition,
};

/// Execute one statement against a flow instance.
pub fn exec_stmt(
    stmt: &Stmt,
    instance: &mut FlowInstance,
    state: &mut EngineState,
    outbox: &mut Outbox,
) -> StmtOutcome {
    match exec(stmt, instance, state, outbox) {
        Ok(outcome) => outcome,
        Err(e) => StmtOutcome::Fail(e),
    }
}

/// Borrow the pieces of engine and instance state the evaluator reads.
pub fn eval_ctx<'a>(
    instance: &'a FlowInstance,
    state: &'a EngineState,
    outbox: &'a Outbox,
) -> EvalCtx<'a> {
    EvalCtx {
        scope: &instance.scope,
        global_names: &instance.global_names,
        globals: &state.globals,
        actions: &state.actions,
        pending_actions: &outbox.new_actions,
        instances: &state.instances,
        instance_order: &state.instance_order,
        registry: &state.registry,
    }
}

fn exec(
    stmt: &Stmt,
    instance: &mut FlowInstance,
    state: &mut EngineState,
    outbox: &mut Outbox,
) -> Result<StmtOutcome, EvalError> {
    match stmt {
        Stmt::Match { pattern, capture } => {
            let mut arm = WaitArm::new(pattern.clone());
            arm.capture = capture.clone();
            Ok(StmtOutcome::Block(WaitCondition::single(arm)))
        }

        Stmt::Send { event } => {
            exec_send(event, instance, state, outbox)?;
            Ok(StmtOutcome::Continue)
        }

        Stmt::Start { target, capture } => {
            let reference = start_target(target, instance, state, outbox)?.reference;
            if let Some(name) = capture {
                write_var(
                    name,
                    reference,
                    &mut instance.scope,
                    &instance.global_names,
                    &mut state.globals,
                );
            }
            Ok(StmtOutcome::Continue)
        }

        Stmt::Await { policy, members } => {
            let mut arms = Vec::new();
            for member in members {
                let started = start_target(&member.target, instance, state, outbox)?;
                if let Some(name) = &member.capture {
                    write_var(
                        name,
                        started.reference.clone(),
                        &mut instance.scope,
                        &instance.global_names,
                        &mut state.globals,
                    );
                }
                // Only the completion arm carries a cancel target so a losing
                // member is stopped exactly once.
                let cancel = match *policy {
                    AwaitPolicy::Any => Some(started.cancel.clone()),
                    AwaitPolicy::All => None,
                };
                let mut finish = WaitArm::new(started.finished);
                finish.cancel = cancel;
                arms.push(finish);
                let mut fail = WaitArm::new(started.failed);
                fail.fails = true;
                arms.push(fail);
            }
            Ok(StmtOutcome::Block(WaitCondition {
                policy: *policy,
                arms,
            }))
        }

        Stmt::When { branches } => {
            let arms = branches
                .iter()
                .map(|b| {
                    let mut arm = WaitArm::new(b.pattern.clone());
                    arm.capture = b.capture.clone();
                    arm.branch = Some(b.body.clone());
                    arm
                })
                .collect();
            Ok(StmtOutcome::Block(WaitCondition {
                policy: AwaitPolicy::Any,
                arms,
            }))
        }

        Stmt::If {
            test,
            then_body,
            else_body,
        } => {
            let taken = {
                let ctx = eval_ctx(instance, state, outbox);
                eval(test, &ctx)?.is_truthy()
            };
            let body = if taken { then_body } else { else_body };
            if body.is_empty() {
                Ok(StmtOutcome::Continue)
            } else {
                Ok(StmtOutcome::Push(Frame::body(body.clone())))
            }
        }

        Stmt::While { test, body } => Ok(StmtOutcome::Push(Frame {
            kind: super::types::FrameKind::While {
                test: test.clone(),
                body: body.clone(),
            },
        })),

        Stmt::Break => Ok(StmtOutcome::Break),
        Stmt::Continue => Ok(StmtOutcome::LoopContinue),

        Stmt::Assign { name, expr } => {
            let value = {
                let ctx = eval_ctx(instance, state, outbox);
                eval(expr, &ctx)?
            };
            write_var(
                name,
                value,
                &mut instance.scope,
                &instance.global_names,
                &mut state.globals,
            );
            Ok(StmtOutcome::Continue)
        }

        Stmt::Global { name } => {
            instance.global_names.insert(name.clone());
            Ok(StmtOutcome::Continue)
        }

        Stmt::Activate { flow_id, arguments } => {
            start_flow(flow_id, arguments, true, instance, state, outbox)?;
            Ok(StmtOutcome::Continue)
        }

        Stmt::Priority { expr } => {
            let value = {
                let ctx = eval_ctx(instance, state, outbox);
                eval(expr, &ctx)?
            };
            let Some(n) = value.as_num() else {
                return Err(EvalError::TypeMismatch(format!(
                    "priority must be a number, got {}",
                    value.type_name()
                )));
            };
            instance.priority = n;
            Ok(StmtOutcome::Continue)
        }

        Stmt::Return { values } => {
            let mut results = BTreeMap::new();
            {
                let ctx = eval_ctx(instance, state, outbox);
                for (name, expr) in values {
                    results.insert(name.clone(), eval(expr, &ctx)?);
                }
            }
            instance.results.extend(results);
            Ok(StmtOutcome::Return)
        }

        Stmt::Abort { message } => {
            let text = match message {
                Some(expr) => {
                    let ctx = eval_ctx(instance, state, outbox);
                    eval(expr, &ctx)?.to_string()
                }
                None => "aborted".to_string(),
            };
            Err(EvalError::Aborted(text))
        }
    }
}

/* ===================== send ===================== */

fn exec_send(
    spec: &EventSpec,
    instance: &mut FlowInstance,
    state: &mut EngineState,
    outbox: &mut Outbox,
) -> Result<(), EvalError> {
    let mut arguments = eval_arguments(&spec.arguments, instance, state, outbox)?;

    match events::classify(&spec.name) {
        EventKind::ActionStart { action } => {
            start_action(&action, arguments, instance, state, outbox);
        }
        EventKind::ActionStop { .. } => {
            // An explicit action reference moves into the envelope.
            let action_uid = match arguments.remove("action_uid") {
                Some(Val::Action(uid)) | Some(Val::Str(uid)) => Some(uid),
                Some(other) => {
                    return Err(EvalError::TypeMismatch(format!(
                        "action_uid must be an action reference, got {}",
                        other.type_name()
                    )))
                }
                None => None,
            };
            let mut event = state.new_event(spec.name.clone());
            if let Some(uid) = action_uid {
                event.action_uid = Some(uid);
            }
            event.arguments = arguments;
            outbox.outgoing.push(event);
        }
        _ => {
            let mut event = state.new_event(spec.name.clone());
            event.arguments = arguments;
            outbox.internal.push(event);
        }
    }
    Ok(())
}

fn eval_arguments(
    pairs: &[(String, Expr)],
    instance: &FlowInstance,
    state: &EngineState,
    outbox: &Outbox,
) -> Result<BTreeMap<String, Val>, EvalError> {
    let ctx = eval_ctx(instance, state, outbox);
    let mut out = BTreeMap::new();
    for (name, expr) in pairs {
        out.insert(name.clone(), eval(expr, &ctx)?);
    }
    Ok(out)
}

/* ===================== start ===================== */

/// What launching one target produced: the value to bind, the lifecycle
/// patterns to wait on and the cancel target for losing `or` members.
pub struct Started {
    pub reference: Val,
    pub finished: EventPattern,
    pub failed: EventPattern,
    pub cancel: CancelTarget,
}

fn start_target(
    target: &StartTarget,
    instance: &mut FlowInstance,
    state: &mut EngineState,
    outbox: &mut Outbox,
) -> Result<Started, EvalError> {
    match target {
        StartTarget::Action { name, arguments } => {
            let arguments = eval_arguments(arguments, instance, state, outbox)?;
            let action_uid = start_action(name, arguments, instance, state, outbox);
            Ok(Started {
                reference: Val::Action(action_uid.clone()),
                finished: uid_pattern(
                    events::finished_event_name(name),
                    "action_uid",
                    &action_uid,
                ),
                failed: uid_pattern(events::failed_event_name(name), "action_uid", &action_uid),
                cancel: CancelTarget::Action { action_uid },
            })
        }
        StartTarget::Flow { flow_id, arguments } => {
            let instance_uid = start_flow(flow_id, arguments, false, instance, state, outbox)?;
            Ok(Started {
                reference: Val::Flow(instance_uid.clone()),
                finished: uid_pattern(names::FLOW_FINISHED, "flow_instance_uid", &instance_uid),
                failed: uid_pattern(names::FLOW_FAILED, "flow_instance_uid", &instance_uid),
                cancel: CancelTarget::Flow { instance_uid },
            })
        }
    }
}

fn uid_pattern(event: impl Into<String>, field: &str, uid: &str) -> EventPattern {
    EventPattern {
        event: event.into(),
        fields: BTreeMap::from([(
            field.to_string(),
            FieldPattern::Value {
                expr: Expr::LitStr { v: uid.to_string() },
            },
        )]),
    }
}

/// Allocate an action instance and queue its `Start<A>` as a candidate.
fn start_action(
    action_name: &str,
    arguments: BTreeMap<String, Val>,
    instance: &mut FlowInstance,
    state: &mut EngineState,
    outbox: &mut Outbox,
) -> String {
    let action_uid = state.uids.next("action");
    outbox.new_actions.push(ActionState::new(
        action_uid.clone(),
        action_name.to_string(),
        arguments.clone(),
        instance.uid.clone(),
    ));
    instance.owned_actions.push(action_uid.clone());

    let mut event = state.new_event(events::start_event_name(action_name));
    event.action_uid = Some(action_uid.clone());
    event.arguments = arguments;
    outbox.candidates.push(event);

    action_uid
}

/// Allocate a child instance uid and queue the internal `StartFlow`.
fn start_flow(
    flow_id: &str,
    arguments: &[(String, Expr)],
    activated: bool,
    instance: &mut FlowInstance,
    state: &mut EngineState,
    outbox: &mut Outbox,
) -> Result<String, EvalError> {
    let params = eval_arguments(arguments, instance, state, outbox)?;
    let instance_uid = state.uids.next("flow");
    instance.child_uids.push(instance_uid.clone());

    let mut event = state.new_event(names::START_FLOW);
    event.arguments.insert(
        "flow_id".to_string(),
        Val::Str(flow_id.to_string()),
    );
    event.arguments.insert(
        "flow_instance_uid".to_string(),
        Val::Str(instance_uid.clone()),
    );
    event.arguments.insert(
        "parent_flow_uid".to_string(),
        Val::Str(instance.uid.clone()),
    );
    event
        .arguments
        .insert("params".to_string(), Val::Obj(params));
    event
        .arguments
        .insert("activated".to_string(), Val::Bool(activated));
    outbox.internal.push(event);

    Ok(instance_uid)
}
