//! Engine state
//!
//! All mutable runtime state lives in one `EngineState` value owned by the
//! `Runtime` and threaded through every call; there are no process-wide
//! singletons. Uids come from a single monotonic generator so replaying the
//! same event sequence reproduces the same uids byte for byte.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::events::Event;
use crate::flows::{FlowDefinition, FlowRegistry};
use crate::types::{ActionStatus, FlowStatus};

use super::types::{Head, Val};

/* ===================== Uids ===================== */

/// Monotonic uid generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UidGen {
    next: u64,
}

impl UidGen {
    pub fn next(&mut self, prefix: &str) -> String {
        self.next += 1;
        format!("{}-{}", prefix, self.next)
    }
}

/* ===================== Flow instances ===================== */

/// One running activation of a flow definition.
#[derive(Debug, Clone)]
pub struct FlowInstance {
    pub uid: String,
    pub flow_id: String,
    /// Pinned definition; registry updates never retarget a live instance
    pub definition: Arc<FlowDefinition>,
    /// Local variable scope (parameters are bound here)
    pub scope: BTreeMap<String, Val>,
    /// Names aliased to the process-wide global table via `global`
    pub global_names: BTreeSet<String>,
    pub heads: Vec<Head>,
    pub status: FlowStatus,
    pub parent_uid: Option<String>,
    pub child_uids: Vec<String>,
    /// Activated flows restart their matching window after completion
    pub activated: bool,
    /// Conflict-resolution weight, default 1.0
    pub priority: f64,
    /// Depth of the activation chain that produced this instance
    pub specificity: u32,
    /// Named results exposed by `return`
    pub results: BTreeMap<String, Val>,
    /// Action instances this flow started and still nominally owns
    pub owned_actions: Vec<String>,
    /// Arguments the instance was started with (used for activation restart)
    pub start_arguments: BTreeMap<String, Val>,
}

impl FlowInstance {
    /// True while the instance can still react to events.
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn runnable_head(&self) -> Option<usize> {
        self.heads
            .iter()
            .position(|h| matches!(h.status, super::types::HeadStatus::Runnable))
    }
}

/* ===================== Action state ===================== */

/// Tracks one external action instance.
#[derive(Debug, Clone)]
pub struct ActionState {
    pub action_uid: String,
    /// UMIM action name, e.g. `UtteranceBotAction`
    pub name: String,
    pub status: ActionStatus,
    /// Parameters the action was started with
    pub arguments: BTreeMap<String, Val>,
    /// Data merged in from lifecycle events (`return_value`, `error`, ...)
    pub context: BTreeMap<String, Val>,
    /// Flow instance that started the action
    pub owner_uid: String,
    /// Flow instances currently referencing the action
    pub refs: BTreeSet<String>,
}

impl ActionState {
    pub fn new(
        action_uid: String,
        name: String,
        arguments: BTreeMap<String, Val>,
        owner_uid: String,
    ) -> Self {
        let refs = BTreeSet::from([owner_uid.clone()]);
        ActionState {
            action_uid,
            name,
            status: ActionStatus::Starting,
            arguments,
            context: BTreeMap::new(),
            owner_uid,
            refs,
        }
    }

    /// Resolve an attribute for `$ref.x` access: fixed attributes first,
    /// then start parameters, then lifecycle context.
    pub fn attribute(&self, name: &str) -> Option<Val> {
        match name {
            "uid" | "action_uid" => Some(Val::Str(self.action_uid.clone())),
            "name" => Some(Val::Str(self.name.clone())),
            "status" => Some(Val::Str(status_str(self.status).to_string())),
            "context" => {
                let mut merged = self.arguments.clone();
                merged.extend(self.context.clone());
                Some(Val::Obj(merged))
            }
            _ => self
                .context
                .get(name)
                .or_else(|| self.arguments.get(name))
                .cloned(),
        }
    }
}

fn status_str(status: ActionStatus) -> &'static str {
    match status {
        ActionStatus::Starting => "starting",
        ActionStatus::Started => "started",
        ActionStatus::Finished => "finished",
        ActionStatus::Stopped => "stopped",
        ActionStatus::Failed => "failed",
    }
}

/* ===================== Engine state ===================== */

/// Everything the scheduler owns.
#[derive(Debug)]
pub struct EngineState {
    pub registry: FlowRegistry,
    pub instances: HashMap<String, FlowInstance>,
    /// Creation order; the stable iteration order for dispatch
    pub instance_order: Vec<String>,
    pub actions: HashMap<String, ActionState>,
    /// Process-wide variable table shared through `global`
    pub globals: BTreeMap<String, Val>,
    /// Internal FIFO event queue
    pub queue: VecDeque<Event>,
    pub uids: UidGen,
    /// Logical time: the `created_at` of the external event being processed.
    /// Synthesized events inherit it so replays stay deterministic.
    pub clock: DateTime<Utc>,
    pub config: RuntimeConfig,
}

impl EngineState {
    pub fn new(registry: FlowRegistry, config: RuntimeConfig) -> Self {
        EngineState {
            registry,
            instances: HashMap::new(),
            instance_order: Vec::new(),
            actions: HashMap::new(),
            globals: BTreeMap::new(),
            queue: VecDeque::new(),
            uids: UidGen::default(),
            clock: DateTime::<Utc>::UNIX_EPOCH,
            config,
        }
    }

    /// Synthesize an engine-sourced event stamped with the logical clock.
    pub fn new_event(&mut self, name: impl Into<String>) -> Event {
        let uid = self.uids.next("event");
        Event::new(name, uid, self.clock, self.config.source_uid.clone())
    }

    /// Live instance uids in creation order.
    pub fn live_instances(&self) -> Vec<String> {
        self.instance_order
            .iter()
            .filter(|uid| {
                self.instances
                    .get(*uid)
                    .map(|i| i.is_live())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}
