//! Flow instance lifecycle
//!
//! Creation, completion, failure, stopping and the activation restart cycle.
//! Lifecycle transitions synthesize internal events directly onto the engine
//! queue; `Stop<A>` events for orphaned actions are appended to the outgoing
//! buffer the caller passes in.

use std::collections::BTreeMap;

use crate::events::{self, names, Event};
use crate::types::{ActionStatus, FlowStatus};

use super::errors::{EvalError, RuntimeError};
use super::expressions::{eval, EvalCtx};
use super::state::{EngineState, FlowInstance};
use super::types::{Head, Val};

/* ===================== Creation ===================== */

/// Create a flow instance from a `StartFlow` request.
///
/// Returns the uid of the created instance, or `None` when an identical
/// activated instance already exists (activation is idempotent).
pub fn create_instance(
    state: &mut EngineState,
    flow_id: &str,
    instance_uid: String,
    parent_uid: Option<String>,
    params: BTreeMap<String, Val>,
    activated: bool,
) -> Result<Option<String>, RuntimeError> {
    let definition = state
        .registry
        .latest(flow_id)
        .ok_or_else(|| RuntimeError::UnknownFlow(flow_id.to_string()))?;

    if activated && find_duplicate_activation(state, flow_id, &params) {
        tracing::debug!(flow_id, "activation already live, skipping");
        return Ok(None);
    }

    let specificity = parent_uid
        .as_deref()
        .and_then(|uid| state.instances.get(uid))
        .map(|parent| parent.specificity + 1)
        .unwrap_or(0);

    let (scope, priority) = match bind_scope(state, &definition, &params) {
        Ok(bound) => bound,
        Err(e) => {
            // A bad parameter default fails the instance before it ever runs.
            let mut event = state.new_event(names::FLOW_FAILED);
            event
                .arguments
                .insert("flow_id".to_string(), Val::Str(flow_id.to_string()));
            event.arguments.insert(
                "flow_instance_uid".to_string(),
                Val::Str(instance_uid.clone()),
            );
            event
                .arguments
                .insert("error".to_string(), Val::Str(e.to_string()));
            state.queue.push_back(event);
            return Ok(None);
        }
    };

    let instance = FlowInstance {
        uid: instance_uid.clone(),
        flow_id: flow_id.to_string(),
        heads: vec![Head::at_body(definition.body.clone())],
        definition,
        scope,
        global_names: Default::default(),
        status: FlowStatus::Starting,
        parent_uid,
        child_uids: Vec::new(),
        activated,
        priority,
        specificity,
        results: BTreeMap::new(),
        owned_actions: Vec::new(),
        start_arguments: params,
    };

    state.instances.insert(instance_uid.clone(), instance);
    state.instance_order.push(instance_uid.clone());
    push_flow_event(state, names::FLOW_STARTED, flow_id, &instance_uid);
    tracing::debug!(flow_id, uid = %instance_uid, "flow instance created");
    Ok(Some(instance_uid))
}

fn find_duplicate_activation(
    state: &EngineState,
    flow_id: &str,
    params: &BTreeMap<String, Val>,
) -> bool {
    state.instance_order.iter().any(|uid| {
        state
            .instances
            .get(uid)
            .map(|i| {
                i.activated && i.is_live() && i.flow_id == flow_id && i.start_arguments == *params
            })
            .unwrap_or(false)
    })
}

/// Bind parameters into a fresh scope and evaluate the declared priority.
/// Defaults may reference parameters bound earlier in the list.
fn bind_scope(
    state: &EngineState,
    definition: &crate::flows::FlowDefinition,
    params: &BTreeMap<String, Val>,
) -> Result<(BTreeMap<String, Val>, f64), EvalError> {
    let empty_names = Default::default();
    let mut scope = BTreeMap::new();

    for parameter in &definition.parameters {
        let value = match params.get(&parameter.name) {
            Some(value) => value.clone(),
            None => match &parameter.default {
                Some(expr) => {
                    let ctx = scope_ctx(state, &scope, &empty_names);
                    eval(expr, &ctx)?
                }
                None => Val::Null,
            },
        };
        scope.insert(parameter.name.clone(), value);
    }

    let priority = match &definition.priority {
        Some(expr) => {
            let ctx = scope_ctx(state, &scope, &empty_names);
            let value = eval(expr, &ctx)?;
            value.as_num().ok_or_else(|| {
                EvalError::TypeMismatch(format!(
                    "priority must be a number, got {}",
                    value.type_name()
                ))
            })?
        }
        None => 1.0,
    };

    Ok((scope, priority))
}

fn scope_ctx<'a>(
    state: &'a EngineState,
    scope: &'a BTreeMap<String, Val>,
    empty_names: &'a std::collections::BTreeSet<String>,
) -> EvalCtx<'a> {
    EvalCtx {
        scope,
        global_names: empty_names,
        globals: &state.globals,
        actions: &state.actions,
        pending_actions: &[],
        instances: &state.instances,
        instance_order: &state.instance_order,
        registry: &state.registry,
    }
}

/* ===================== Completion ===================== */

/// Mark an instance finished and emit `FlowFinished` carrying its results.
///
/// Returns `true` when the instance was activated and has been restarted in
/// place; the caller must run it again.
pub fn finish_instance(state: &mut EngineState, uid: &str, out: &mut Vec<Event>) -> bool {
    let Some(instance) = state.instances.get_mut(uid) else {
        return false;
    };
    if !instance.is_live() {
        return false;
    }
    instance.status = FlowStatus::Finished;
    let flow_id = instance.flow_id.clone();
    let results = instance.results.clone();
    let activated = instance.activated;

    let mut event = flow_event(state, names::FLOW_FINISHED, &flow_id, uid);
    for (name, value) in results {
        event.arguments.insert(name, value);
    }
    state.queue.push_back(event);

    release_descendants(state, uid, out);

    if activated {
        restart_instance(state, uid);
        return true;
    }
    false
}

/// Mark an instance failed and emit `FlowFailed`.
pub fn fail_instance(state: &mut EngineState, uid: &str, message: &str, out: &mut Vec<Event>) {
    let Some(instance) = state.instances.get_mut(uid) else {
        return;
    };
    if !instance.is_live() {
        return;
    }
    instance.status = FlowStatus::Failed;
    let flow_id = instance.flow_id.clone();
    tracing::warn!(flow_id = %flow_id, uid, message, "flow failed");

    let mut event = flow_event(state, names::FLOW_FAILED, &flow_id, uid);
    event
        .arguments
        .insert("error".to_string(), Val::Str(message.to_string()));
    state.queue.push_back(event);

    release_descendants(state, uid, out);
}

/// Stop an instance and everything under it. Idempotent: stopping a terminal
/// instance is a no-op.
pub fn stop_instance(state: &mut EngineState, uid: &str, out: &mut Vec<Event>) {
    let Some(instance) = state.instances.get_mut(uid) else {
        return;
    };
    if !instance.is_live() {
        return;
    }
    instance.status = FlowStatus::Stopped;
    let flow_id = instance.flow_id.clone();

    let mut event = flow_event(state, names::FLOW_FINISHED, &flow_id, uid);
    event
        .arguments
        .insert("status".to_string(), Val::Str("stopped".to_string()));
    state.queue.push_back(event);

    release_descendants(state, uid, out);
}

/// Stop child instances and orphaned actions of a terminated instance.
/// Children are stopped regardless of activation; a parent leaving scope
/// deactivates what it activated.
fn release_descendants(state: &mut EngineState, uid: &str, out: &mut Vec<Event>) {
    let (children, owned) = match state.instances.get(uid) {
        Some(instance) => (instance.child_uids.clone(), instance.owned_actions.clone()),
        None => return,
    };

    for child in children {
        stop_instance(state, &child, out);
    }

    for action_uid in owned {
        let Some(action) = state.actions.get_mut(&action_uid) else {
            continue;
        };
        action.refs.remove(uid);
        if action.refs.is_empty() && action.status.is_live() {
            action.status = ActionStatus::Stopped;
            let name = action.name.clone();
            let mut event = state.new_event(events::stop_event_name(&name));
            event.action_uid = Some(action_uid.clone());
            out.push(event);
        }
    }
}

/* ===================== Activation restart ===================== */

/// Reset an activated instance in place so it keeps matching. Same uid, same
/// start arguments, fresh head at the top of the body.
fn restart_instance(state: &mut EngineState, uid: &str) {
    let (flow_id, rebound) = {
        let Some(instance) = state.instances.get(uid) else {
            return;
        };
        let rebound = bind_scope(state, &instance.definition, &instance.start_arguments);
        (instance.flow_id.clone(), rebound)
    };

    let (scope, priority) = match rebound {
        Ok(bound) => bound,
        // The defaults evaluated once already; a failure here means a global
        // they referenced changed shape, so the restart fails instead.
        Err(e) => {
            let message = e.to_string();
            let mut unused = Vec::new();
            fail_instance(state, uid, &message, &mut unused);
            return;
        }
    };

    if let Some(instance) = state.instances.get_mut(uid) {
        let body = instance.definition.body.clone();
        instance.heads = vec![Head::at_body(body)];
        instance.scope = scope;
        instance.global_names.clear();
        instance.status = FlowStatus::Starting;
        instance.priority = priority;
        instance.results.clear();
        instance.owned_actions.clear();
        instance.child_uids.clear();
    }
    push_flow_event(state, names::FLOW_STARTED, &flow_id, uid);
    tracing::debug!(flow_id = %flow_id, uid, "activated flow restarted");
}

/* ===================== Garbage collection ===================== */

/// Drop terminal instances nothing can observe anymore and action records
/// with no live referents.
///
/// A terminal instance stays while its parent is live; the parent may still
/// hold a reference and read its status or results.
pub fn collect_garbage(state: &mut EngineState) {
    let retained: Vec<String> = state
        .instance_order
        .iter()
        .filter(|uid| {
            let Some(instance) = state.instances.get(*uid) else {
                return false;
            };
            if instance.is_live() {
                return true;
            }
            instance
                .parent_uid
                .as_deref()
                .and_then(|p| state.instances.get(p))
                .map(|p| p.is_live())
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    if retained.len() != state.instance_order.len() {
        state.instances.retain(|uid, _| retained.contains(uid));
        state.instance_order = retained;
    }

    state.actions.retain(|_, action| {
        if action.status.is_live() {
            return true;
        }
        action
            .refs
            .iter()
            .any(|uid| state.instances.get(uid).map(|i| i.is_live()).unwrap_or(false))
    });
}

/* ===================== Helpers ===================== */

fn flow_event(state: &mut EngineState, name: &str, flow_id: &str, instance_uid: &str) -> Event {
    let mut event = state.new_event(name);
    event
        .arguments
        .insert("flow_id".to_string(), Val::Str(flow_id.to_string()));
    event.arguments.insert(
        "flow_instance_uid".to_string(),
        Val::Str(instance_uid.to_string()),
    );
    event
}

fn push_flow_event(state: &mut EngineState, name: &str, flow_id: &str, instance_uid: &str) {
    let event = flow_event(state, name, flow_id, instance_uid);
    state.queue.push_back(event);
}
