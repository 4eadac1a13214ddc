//! Test helpers for engine tests
//!
//! Builders for flow definitions, events and the runtime, so tests read as
//! scenarios instead of struct literals.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::RuntimeConfig;
use crate::engine::expressions::EvalCtx;
use crate::engine::runtime::Runtime;
use crate::engine::state::{ActionState, FlowInstance};
use crate::engine::types::{
    EventPattern, Expr, FieldPattern, StartTarget, Stmt, Val,
};
use crate::events::Event;
use crate::flows::{FlowDefinition, FlowRegistry};

pub fn ts() -> DateTime<Utc> {
    "2024-01-01T00:00:00Z".parse().unwrap()
}

/* ===================== Expressions ===================== */

pub fn lit(s: &str) -> Expr {
    Expr::LitStr { v: s.to_string() }
}

pub fn num(v: f64) -> Expr {
    Expr::LitNum { v }
}

pub fn var(name: &str) -> Expr {
    Expr::Var {
        name: name.to_string(),
    }
}

pub fn binary(op: crate::engine::types::BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/* ===================== Patterns ===================== */

pub fn pattern(event: &str) -> EventPattern {
    EventPattern {
        event: event.to_string(),
        fields: BTreeMap::new(),
    }
}

pub fn pattern_with(event: &str, fields: Vec<(&str, FieldPattern)>) -> EventPattern {
    EventPattern {
        event: event.to_string(),
        fields: fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    }
}

pub fn eq(expr: Expr) -> FieldPattern {
    FieldPattern::Value { expr }
}

/* ===================== Statements ===================== */

/// `match UtteranceUserActionFinished(final_transcript=text)`
pub fn match_user(text: &str) -> Stmt {
    Stmt::Match {
        pattern: pattern_with(
            "UtteranceUserActionFinished",
            vec![("final_transcript", eq(lit(text)))],
        ),
        capture: None,
    }
}

/// `start UtteranceBotAction(script=text)`
pub fn say(text: &str) -> Stmt {
    say_expr(lit(text))
}

pub fn say_expr(script: Expr) -> Stmt {
    Stmt::Start {
        target: StartTarget::Action {
            name: "UtteranceBotAction".to_string(),
            arguments: vec![("script".to_string(), script)],
        },
        capture: None,
    }
}

/// A match that never resolves; keeps a flow alive at the end of its body.
pub fn wait_forever() -> Stmt {
    Stmt::Match {
        pattern: pattern("Never"),
        capture: None,
    }
}

pub fn start_flow_stmt(flow_id: &str) -> Stmt {
    Stmt::Start {
        target: StartTarget::Flow {
            flow_id: flow_id.to_string(),
            arguments: vec![],
        },
        capture: None,
    }
}

/* ===================== Flow definitions ===================== */

pub fn def(id: &str, body: Vec<Stmt>) -> FlowDefinition {
    FlowDefinition {
        id: id.to_string(),
        parameters: vec![],
        priority: None,
        is_activatable: false,
        body,
    }
}

pub fn prioritized(id: &str, priority: f64, body: Vec<Stmt>) -> FlowDefinition {
    FlowDefinition {
        priority: Some(num(priority)),
        ..def(id, body)
    }
}

pub fn activatable(id: &str, body: Vec<Stmt>) -> FlowDefinition {
    FlowDefinition {
        is_activatable: true,
        ..def(id, body)
    }
}

/* ===================== Runtime ===================== */

/// Build a runtime over the given flows and start the main flow.
pub fn boot(flows: Vec<FlowDefinition>) -> (Runtime, Vec<Event>) {
    boot_with_config(flows, RuntimeConfig::default())
}

pub fn boot_with_config(
    flows: Vec<FlowDefinition>,
    config: RuntimeConfig,
) -> (Runtime, Vec<Event>) {
    let mut registry = FlowRegistry::new();
    for flow in flows {
        registry.register(flow);
    }
    let mut runtime = Runtime::new(registry, config);
    let initial = runtime.initialize().expect("initialize failed");
    (runtime, initial)
}

/* ===================== Events ===================== */

pub fn external(name: &str, uid: &str) -> Event {
    Event::new(name, uid, ts(), "test")
}

/// `UtteranceUserActionFinished(final_transcript=text)`
pub fn user_said(text: &str, uid: &str) -> Event {
    external("UtteranceUserActionFinished", uid)
        .with_arg("final_transcript", Val::Str(text.to_string()))
}

/// Completion event for a previously emitted `Start<A>`.
pub fn action_finished(action: &str, action_uid: &str, uid: &str) -> Event {
    external(&format!("{}Finished", action), uid).with_action_uid(action_uid)
}

/* ===================== Assertions ===================== */

/// All events in `out` with the given name, in order.
pub fn named<'a>(out: &'a [Event], name: &str) -> Vec<&'a Event> {
    out.iter().filter(|e| e.name == name).collect()
}

/// Scripts of every `StartUtteranceBotAction` in `out`, in order.
pub fn scripts(out: &[Event]) -> Vec<String> {
    named(out, "StartUtteranceBotAction")
        .iter()
        .filter_map(|e| e.str_arg("script").map(str::to_string))
        .collect()
}

/* ===================== Evaluator fixtures ===================== */

/// Owns everything an `EvalCtx` borrows, for evaluator and matcher tests
/// that do not need a whole runtime.
pub struct CtxParts {
    pub scope: BTreeMap<String, Val>,
    pub global_names: BTreeSet<String>,
    pub globals: BTreeMap<String, Val>,
    pub actions: HashMap<String, ActionState>,
    pub instances: HashMap<String, FlowInstance>,
    pub instance_order: Vec<String>,
    pub registry: FlowRegistry,
}

impl CtxParts {
    pub fn new() -> Self {
        CtxParts {
            scope: BTreeMap::new(),
            global_names: BTreeSet::new(),
            globals: BTreeMap::new(),
            actions: HashMap::new(),
            instances: HashMap::new(),
            instance_order: Vec::new(),
            registry: FlowRegistry::new(),
        }
    }

    pub fn ctx(&self) -> EvalCtx<'_> {
        EvalCtx {
            scope: &self.scope,
            global_names: &self.global_names,
            globals: &self.globals,
            actions: &self.actions,
            pending_actions: &[],
            instances: &self.instances,
            instance_order: &self.instance_order,
            registry: &self.registry,
        }
    }
}
