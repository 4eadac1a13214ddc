//! Scheduler
//!
//! Single-threaded, event-driven core. `advance` takes one external event,
//! drains the internal queue to quiescence and returns the outgoing events.
//! Determinism is structural: dispatch iterates instances in creation order,
//! uids come from a monotonic counter and synthesized events inherit the
//! external event's timestamp, so the same event sequence always yields the
//! same output bytes.

use std::collections::BTreeMap;

use crate::config::RuntimeConfig;
use crate::events::{names, Event, EventKind};
use crate::flows::FlowRegistry;
use crate::types::FlowStatus;

use super::errors::RuntimeError;
use super::exec_loop::run_head;
use super::lifecycle;
use super::matching::match_event;
use super::outbox::Outbox;
use super::resolver::{self, Candidate};
use super::state::EngineState;
use super::statements::eval_ctx;
use super::types::{Frame, HeadStatus, Val};

/// The flow runtime. Owns all state; callers feed events in one at a time.
pub struct Runtime {
    state: EngineState,
    /// Emission counter for conflict-resolution recency
    seq: u64,
}

/// One match found during the scan pass.
struct PendingMatch {
    instance_uid: String,
    head_idx: usize,
    arm_idx: usize,
}

impl Runtime {
    pub fn new(registry: FlowRegistry, config: RuntimeConfig) -> Self {
        Runtime {
            state: EngineState::new(registry, config),
            seq: 0,
        }
    }

    /// Read-only view of the engine state, for introspection and tests.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Start the main flow and run to quiescence. Returns the events emitted
    /// before the first external input (typically none, or an opening
    /// utterance the main flow produces unconditionally).
    pub fn initialize(&mut self) -> Result<Vec<Event>, RuntimeError> {
        let main_flow_id = self.state.config.main_flow_id.clone();
        if !self.state.registry.contains(&main_flow_id) {
            return Err(RuntimeError::UnknownFlow(main_flow_id));
        }

        let uid = self.state.uids.next("flow");
        let mut event = self.state.new_event(names::START_FLOW);
        event
            .arguments
            .insert("flow_id".to_string(), Val::Str(main_flow_id));
        event
            .arguments
            .insert("flow_instance_uid".to_string(), Val::Str(uid));
        self.state.queue.push_back(event);

        self.drain()
    }

    /// Process one external event and return everything emitted in response.
    pub fn advance(&mut self, external: Event) -> Result<Vec<Event>, RuntimeError> {
        // Logical time follows the outside world; everything synthesized
        // while processing this event carries its timestamp.
        self.state.clock = external.created_at;
        tracing::debug!(event = %external.name, uid = %external.uid, "external event");
        self.state.queue.push_back(external);
        self.drain()
    }

    /* ===================== Queue drain ===================== */

    fn drain(&mut self) -> Result<Vec<Event>, RuntimeError> {
        let mut out = Vec::new();
        let mut candidates = Vec::new();
        let budget = self.state.config.max_internal_events;
        let mut processed = 0usize;

        while let Some(event) = self.state.queue.pop_front() {
            processed += 1;
            if processed > budget {
                return Err(RuntimeError::EventBudgetExhausted(budget));
            }
            self.dispatch(&event, &mut out, &mut candidates)?;
        }

        let resolution = resolver::resolve(candidates);
        for loser in &resolution.losers {
            // The start never happened; drop the speculative action record.
            if let Some(action_uid) = &loser.action_uid {
                self.state.actions.remove(action_uid);
            }
        }
        out.extend(resolution.winners);

        lifecycle::collect_garbage(&mut self.state);
        Ok(out)
    }

    /* ===================== Dispatch ===================== */

    fn dispatch(
        &mut self,
        event: &Event,
        out: &mut Vec<Event>,
        candidates: &mut Vec<Candidate>,
    ) -> Result<(), RuntimeError> {
        let kind = event.kind();

        let consumed = match &kind {
            EventKind::StartFlow => {
                self.handle_start_flow(event, out, candidates)?;
                true
            }
            EventKind::StopFlow => {
                self.handle_stop_flow(event, out);
                true
            }
            EventKind::ContextUpdate => {
                for (name, value) in &event.arguments {
                    self.state.globals.insert(name.clone(), value.clone());
                }
                true
            }
            EventKind::ActionStarted { .. }
            | EventKind::ActionFinished { .. }
            | EventKind::ActionFailed { .. } => {
                self.update_action_state(event);
                false
            }
            _ => false,
        };

        let matched = self.dispatch_to_heads(event, out, candidates)?;

        if !matched && !consumed && unhandled_eligible(&kind) {
            let mut unhandled = self.state.new_event(names::UNHANDLED_EVENT);
            unhandled.arguments = event.arguments.clone();
            unhandled
                .arguments
                .insert("event".to_string(), Val::Str(event.name.clone()));
            if let Some(action_uid) = &event.action_uid {
                unhandled.action_uid = Some(action_uid.clone());
            }
            self.state.queue.push_back(unhandled);
        }
        Ok(())
    }

    fn handle_start_flow(
        &mut self,
        event: &Event,
        out: &mut Vec<Event>,
        candidates: &mut Vec<Candidate>,
    ) -> Result<(), RuntimeError> {
        let Some(flow_id) = event.str_arg("flow_id").map(str::to_string) else {
            tracing::warn!("StartFlow without flow_id, dropping");
            return Ok(());
        };
        let instance_uid = match event.str_arg("flow_instance_uid") {
            Some(uid) => uid.to_string(),
            None => self.state.uids.next("flow"),
        };
        let parent_uid = event.str_arg("parent_flow_uid").map(str::to_string);
        let params = match event.arg("params") {
            Some(Val::Obj(map)) => map.clone(),
            _ => BTreeMap::new(),
        };
        let activated = event.bool_arg("activated").unwrap_or(false);

        match lifecycle::create_instance(
            &mut self.state,
            &flow_id,
            instance_uid,
            parent_uid,
            params,
            activated,
        ) {
            Ok(Some(uid)) => self.run_instance(&uid, out, candidates),
            Ok(None) => Ok(()),
            Err(RuntimeError::UnknownFlow(id)) => {
                tracing::warn!(flow_id = %id, "StartFlow for unknown flow");
                let mut unhandled = self.state.new_event(names::UNHANDLED_EVENT);
                unhandled
                    .arguments
                    .insert("event".to_string(), Val::Str(names::START_FLOW.to_string()));
                unhandled
                    .arguments
                    .insert("flow_id".to_string(), Val::Str(id));
                self.state.queue.push_back(unhandled);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn handle_stop_flow(&mut self, event: &Event, out: &mut Vec<Event>) {
        let deactivate = event.bool_arg("deactivate").unwrap_or(false);
        if let Some(uid) = event.str_arg("flow_instance_uid").map(str::to_string) {
            if deactivate {
                if let Some(instance) = self.state.instances.get_mut(&uid) {
                    instance.activated = false;
                }
            }
            lifecycle::stop_instance(&mut self.state, &uid, out);
            return;
        }
        // No instance uid: stop the oldest live instance of the flow.
        if let Some(flow_id) = event.str_arg("flow_id") {
            let target = self.state.instance_order.iter().find(|uid| {
                self.state
                    .instances
                    .get(*uid)
                    .map(|i| i.flow_id == flow_id && i.is_live())
                    .unwrap_or(false)
            });
            if let Some(uid) = target.cloned() {
                if deactivate {
                    if let Some(instance) = self.state.instances.get_mut(&uid) {
                        instance.activated = false;
                    }
                }
                lifecycle::stop_instance(&mut self.state, &uid, out);
            }
        }
    }

    /// Merge lifecycle data into the tracked action record.
    fn update_action_state(&mut self, event: &Event) {
        let Some(action_uid) = &event.action_uid else {
            return;
        };
        let Some(action) = self.state.actions.get_mut(action_uid) else {
            // User actions carry transport-assigned uids we never tracked.
            return;
        };
        action.status = match event.kind() {
            EventKind::ActionStarted { .. } => crate::types::ActionStatus::Started,
            EventKind::ActionFinished { .. } => crate::types::ActionStatus::Finished,
            EventKind::ActionFailed { .. } => crate::types::ActionStatus::Failed,
            _ => action.status,
        };
        for (name, value) in &event.arguments {
            action.context.insert(name.clone(), value.clone());
        }
    }

    /* ===================== Head dispatch ===================== */

    /// Offer an event to every blocked head. Two passes: a read-only scan
    /// that records matches, then a commit pass that binds captures and
    /// wakes heads. Returns whether anything matched.
    fn dispatch_to_heads(
        &mut self,
        event: &Event,
        out: &mut Vec<Event>,
        candidates: &mut Vec<Candidate>,
    ) -> Result<bool, RuntimeError> {
        let mut matches = Vec::new();
        let mut match_failures = Vec::new();

        let order = self.state.instance_order.clone();
        for instance_uid in &order {
            let Some(instance) = self.state.instances.get(instance_uid) else {
                continue;
            };
            if !instance.is_live() {
                continue;
            }
            let empty_outbox = Outbox::new();
            let ctx = eval_ctx(instance, &self.state, &empty_outbox);
            for (head_idx, head) in instance.heads.iter().enumerate() {
                let HeadStatus::Blocked(condition) = &head.status else {
                    continue;
                };
                for (arm_idx, arm) in condition.arms.iter().enumerate() {
                    if arm.satisfied {
                        continue;
                    }
                    match match_event(&arm.pattern, event, &ctx) {
                        Ok(true) => {
                            matches.push(PendingMatch {
                                instance_uid: instance_uid.clone(),
                                head_idx,
                                arm_idx,
                            });
                        }
                        Ok(false) => {}
                        Err(e) => {
                            match_failures.push((instance_uid.clone(), e.to_string()));
                        }
                    }
                }
            }
        }

        for (uid, message) in match_failures {
            lifecycle::fail_instance(&mut self.state, &uid, &message, out);
        }

        let matched = !matches.is_empty();
        let mut woken = Vec::new();
        for pending in matches {
            if let Some(uid) = self.commit_match(&pending, event, out) {
                woken.push(uid);
            }
        }

        for uid in woken {
            self.run_instance(&uid, out, candidates)?;
        }
        Ok(matched)
    }

    /// Bind the match into the instance and decide whether the head wakes.
    /// Returns the instance uid when it has a runnable head afterwards.
    fn commit_match(
        &mut self,
        pending: &PendingMatch,
        event: &Event,
        out: &mut Vec<Event>,
    ) -> Option<String> {
        let instance = self.state.instances.get_mut(&pending.instance_uid)?;
        if !instance.is_live() {
            return None;
        }
        let HeadStatus::Blocked(condition) = &mut instance.heads[pending.head_idx].status else {
            return None;
        };
        let arm = condition.arms.get_mut(pending.arm_idx)?;
        if arm.satisfied {
            return None;
        }
        arm.satisfied = true;
        let fails = arm.fails;
        let capture = arm.capture.clone();
        let branch = arm.branch.clone();
        let resolved = condition.is_satisfied();

        // Cancel targets of the arms that lost the race.
        let cancels: Vec<_> = if resolved {
            condition
                .arms
                .iter()
                .filter(|a| !a.satisfied)
                .filter_map(|a| a.cancel.clone())
                .collect()
        } else {
            Vec::new()
        };

        if let Some(name) = capture {
            let value = event.as_val();
            let global_names = instance.global_names.clone();
            super::expressions::write_var(
                &name,
                value,
                &mut instance.scope,
                &global_names,
                &mut self.state.globals,
            );
        }

        if fails {
            let error = super::errors::EvalError::AwaitedFailure {
                kind: event.name.clone(),
                message: event
                    .str_arg("error")
                    .unwrap_or("no error detail")
                    .to_string(),
            };
            let message = error.to_string();
            lifecycle::fail_instance(&mut self.state, &pending.instance_uid, &message, out);
            return None;
        }

        if !resolved {
            return None;
        }

        let head = &mut instance.heads[pending.head_idx];
        if let Some(body) = branch {
            head.frames.push(Frame::body(body));
        }
        head.status = HeadStatus::Runnable;

        for cancel in cancels {
            self.cancel_target(cancel, out);
        }
        Some(pending.instance_uid.clone())
    }

    fn cancel_target(&mut self, target: super::types::CancelTarget, out: &mut Vec<Event>) {
        match target {
            super::types::CancelTarget::Action { action_uid } => {
                let Some(action) = self.state.actions.get_mut(&action_uid) else {
                    return;
                };
                if !action.status.is_live() {
                    return;
                }
                action.status = crate::types::ActionStatus::Stopped;
                let name = action.name.clone();
                let mut event = self.state.new_event(crate::events::stop_event_name(&name));
                event.action_uid = Some(action_uid);
                out.push(event);
            }
            super::types::CancelTarget::Flow { instance_uid } => {
                lifecycle::stop_instance(&mut self.state, &instance_uid, out);
            }
        }
    }

    /* ===================== Instance execution ===================== */

    /// Run an instance's runnable heads to quiescence, applying side effects
    /// after each head run.
    fn run_instance(
        &mut self,
        uid: &str,
        out: &mut Vec<Event>,
        candidates: &mut Vec<Candidate>,
    ) -> Result<(), RuntimeError> {
        loop {
            // The instance comes out of the map while its head runs so the
            // evaluator can borrow the rest of the state.
            let Some(mut instance) = self.state.instances.remove(uid) else {
                return Ok(());
            };
            let Some(head_idx) = instance.runnable_head() else {
                if instance.is_live() {
                    instance.status = FlowStatus::Waiting;
                }
                self.state.instances.insert(uid.to_string(), instance);
                return Ok(());
            };

            instance.status = FlowStatus::Active;
            let specificity = instance.specificity;
            let mut outbox = Outbox::new();
            let result = run_head(&mut instance, head_idx, &mut self.state, &mut outbox);

            let all_done = instance.heads.iter().all(|h| h.is_done());
            // Read the priority after the run; a `priority` statement may
            // have executed before the head emitted its candidates.
            let priority = instance.priority;
            self.state.instances.insert(uid.to_string(), instance);
            self.apply_outbox(outbox, priority, specificity, out, candidates);

            match result {
                Err(e) => {
                    lifecycle::fail_instance(&mut self.state, uid, &e.to_string(), out);
                    return Ok(());
                }
                Ok(super::types::HeadOutcome::Finished) if all_done => {
                    let restarted = lifecycle::finish_instance(&mut self.state, uid, out);
                    if !restarted {
                        return Ok(());
                    }
                    // Restarted activation: fall through and run it again.
                }
                _ => {}
            }
        }
    }

    fn apply_outbox(
        &mut self,
        outbox: Outbox,
        priority: f64,
        specificity: u32,
        out: &mut Vec<Event>,
        candidates: &mut Vec<Candidate>,
    ) {
        for action in outbox.new_actions {
            self.state.actions.insert(action.action_uid.clone(), action);
        }
        for event in outbox.internal {
            self.state.queue.push_back(event);
        }
        for event in outbox.candidates {
            self.seq += 1;
            candidates.push(Candidate {
                event,
                priority,
                specificity,
                seq: self.seq,
            });
        }
        out.extend(outbox.outgoing);
    }
}

/// Events whose non-consumption the outside world should hear about. Flow
/// lifecycle chatter and our own fallback never re-trigger.
fn unhandled_eligible(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Other
            | EventKind::ActionStarted { .. }
            | EventKind::ActionFinished { .. }
            | EventKind::ActionFailed { .. }
    )
}
