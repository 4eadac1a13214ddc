//! Event model
//!
//! Events are immutable records exchanged between the scheduler, the flow
//! instances and the outside world. Internal events (flow lifecycle) never
//! cross the process boundary; UMIM action events (`Start<A>`, `<A>Started`,
//! `<A>Finished`, `<A>Failed`, `Stop<A>`) are the wire vocabulary spoken with
//! external actuators.
//!
//! The wire shape is `{type, uid, event_created_at, source_uid, action_uid?,
//! ...named_arguments}`; unknown argument names are carried in the open
//! argument map so unmodeled fields survive a round trip.

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use std::collections::BTreeMap;

use crate::engine::types::Val;

/* ===================== Names ===================== */

/// Internal event vocabulary.
pub mod names {
    pub const START_FLOW: &str = "StartFlow";
    pub const FLOW_STARTED: &str = "FlowStarted";
    pub const FLOW_FINISHED: &str = "FlowFinished";
    pub const FLOW_FAILED: &str = "FlowFailed";
    pub const STOP_FLOW: &str = "StopFlow";
    pub const CONTEXT_UPDATE: &str = "ContextUpdate";
    pub const UNHANDLED_EVENT: &str = "UnhandledEvent";
}

/// `Start<A>` for an action named `A`.
pub fn start_event_name(action: &str) -> String {
    format!("Start{}", action)
}

/// `Stop<A>` for an action named `A`.
pub fn stop_event_name(action: &str) -> String {
    format!("Stop{}", action)
}

/// `<A>Started` for an action named `A`.
pub fn started_event_name(action: &str) -> String {
    format!("{}Started", action)
}

/// `<A>Finished` for an action named `A`.
pub fn finished_event_name(action: &str) -> String {
    format!("{}Finished", action)
}

/// `<A>Failed` for an action named `A`.
pub fn failed_event_name(action: &str) -> String {
    format!("{}Failed", action)
}

/* ===================== Classification ===================== */

/// Tagged classification of an event name.
///
/// Known shapes get a variant; anything else is `Other` and still carries its
/// open argument map on the event itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    StartFlow,
    FlowStarted,
    FlowFinished,
    FlowFailed,
    StopFlow,
    ContextUpdate,
    UnhandledEvent,
    ActionStart { action: String },
    ActionStarted { action: String },
    ActionFinished { action: String },
    ActionFailed { action: String },
    ActionStop { action: String },
    Other,
}

/// Classify an event name into the known vocabulary.
pub fn classify(name: &str) -> EventKind {
    match name {
        names::START_FLOW => return EventKind::StartFlow,
        names::FLOW_STARTED => return EventKind::FlowStarted,
        names::FLOW_FINISHED => return EventKind::FlowFinished,
        names::FLOW_FAILED => return EventKind::FlowFailed,
        names::STOP_FLOW => return EventKind::StopFlow,
        names::CONTEXT_UPDATE => return EventKind::ContextUpdate,
        names::UNHANDLED_EVENT => return EventKind::UnhandledEvent,
        _ => {}
    }

    // UMIM action names end in "Action"; lifecycle events wrap that base name.
    if let Some(base) = name.strip_prefix("Start") {
        if base.ends_with("Action") && !base.is_empty() {
            return EventKind::ActionStart {
                action: base.to_string(),
            };
        }
    }
    if let Some(base) = name.strip_prefix("Stop") {
        if base.ends_with("Action") && !base.is_empty() {
            return EventKind::ActionStop {
                action: base.to_string(),
            };
        }
    }
    if let Some(base) = name.strip_suffix("Started") {
        if base.ends_with("Action") && !base.is_empty() {
            return EventKind::ActionStarted {
                action: base.to_string(),
            };
        }
    }
    if let Some(base) = name.strip_suffix("Finished") {
        if base.ends_with("Action") && !base.is_empty() {
            return EventKind::ActionFinished {
                action: base.to_string(),
            };
        }
    }
    if let Some(base) = name.strip_suffix("Failed") {
        if base.ends_with("Action") && !base.is_empty() {
            return EventKind::ActionFailed {
                action: base.to_string(),
            };
        }
    }

    EventKind::Other
}

/* ===================== Event record ===================== */

/// An immutable event record.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub uid: String,
    pub created_at: DateTime<Utc>,
    pub source_uid: String,
    pub action_uid: Option<String>,
    pub arguments: BTreeMap<String, Val>,
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        uid: impl Into<String>,
        created_at: DateTime<Utc>,
        source_uid: impl Into<String>,
    ) -> Self {
        Event {
            name: name.into(),
            uid: uid.into(),
            created_at,
            source_uid: source_uid.into(),
            action_uid: None,
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_action_uid(mut self, action_uid: impl Into<String>) -> Self {
        self.action_uid = Some(action_uid.into());
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: Val) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn kind(&self) -> EventKind {
        classify(&self.name)
    }

    pub fn arg(&self, name: &str) -> Option<&Val> {
        self.arguments.get(name)
    }

    pub fn str_arg(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(|v| v.as_str())
    }

    pub fn bool_arg(&self, name: &str) -> Option<bool> {
        match self.arguments.get(name) {
            Some(Val::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Snapshot this event as a value a flow variable can hold.
    pub fn as_val(&self) -> Val {
        let mut arguments = self.arguments.clone();
        if let Some(action_uid) = &self.action_uid {
            arguments.insert("action_uid".to_string(), Val::Str(action_uid.clone()));
        }
        Val::Event {
            name: self.name.clone(),
            arguments,
        }
    }
}

/* ===================== Wire shape ===================== */

const WIRE_TYPE: &str = "type";
const WIRE_UID: &str = "uid";
const WIRE_CREATED_AT: &str = "event_created_at";
const WIRE_SOURCE_UID: &str = "source_uid";
const WIRE_ACTION_UID: &str = "action_uid";

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = 4 + usize::from(self.action_uid.is_some());
        let mut map = serializer.serialize_map(Some(self.arguments.len() + extra))?;
        map.serialize_entry(WIRE_TYPE, &self.name)?;
        map.serialize_entry(WIRE_UID, &self.uid)?;
        map.serialize_entry(WIRE_CREATED_AT, &self.created_at.to_rfc3339())?;
        map.serialize_entry(WIRE_SOURCE_UID, &self.source_uid)?;
        if let Some(action_uid) = &self.action_uid {
            map.serialize_entry(WIRE_ACTION_UID, action_uid)?;
        }
        for (k, v) in &self.arguments {
            map.serialize_entry(k, &val_to_json(v))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = JsonMap::deserialize(deserializer)?;

        let name = take_string(&mut map, WIRE_TYPE).map_err(D::Error::custom)?;
        let uid = take_string(&mut map, WIRE_UID).map_err(D::Error::custom)?;
        let created_raw = take_string(&mut map, WIRE_CREATED_AT).map_err(D::Error::custom)?;
        let created_at = DateTime::parse_from_rfc3339(&created_raw)
            .map_err(|e| D::Error::custom(format!("bad event_created_at: {}", e)))?
            .with_timezone(&Utc);
        let source_uid = take_string(&mut map, WIRE_SOURCE_UID).map_err(D::Error::custom)?;
        let action_uid = match map.remove(WIRE_ACTION_UID) {
            Some(JsonValue::String(s)) => Some(s),
            Some(JsonValue::Null) | None => None,
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "action_uid must be a string, got {}",
                    other
                )))
            }
        };

        let mut arguments = BTreeMap::new();
        for (k, v) in map {
            arguments.insert(k, json_to_val(&v));
        }

        Ok(Event {
            name,
            uid,
            created_at,
            source_uid,
            action_uid,
            arguments,
        })
    }
}

fn take_string(map: &mut JsonMap<String, JsonValue>, key: &str) -> Result<String, String> {
    match map.remove(key) {
        Some(JsonValue::String(s)) => Ok(s),
        Some(other) => Err(format!("field `{}` must be a string, got {}", key, other)),
        None => Err(format!("missing field `{}`", key)),
    }
}

/* ===================== Val <-> JSON ===================== */

const REF_KEY: &str = "__ref";

/// Convert a runtime value to plain JSON for the wire.
///
/// Reference kinds encode as small tagged objects so they survive a round
/// trip through the event transport without losing their identity.
pub fn val_to_json(val: &Val) -> JsonValue {
    match val {
        Val::Null => JsonValue::Null,
        Val::Bool(b) => JsonValue::Bool(*b),
        Val::Num(n) => Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Val::Str(s) => JsonValue::String(s.clone()),
        Val::List(items) => JsonValue::Array(items.iter().map(val_to_json).collect()),
        Val::Obj(map) => {
            let mut out = JsonMap::new();
            for (k, v) in map {
                out.insert(k.clone(), val_to_json(v));
            }
            JsonValue::Object(out)
        }
        Val::Action(uid) => serde_json::json!({ REF_KEY: "action", "uid": uid }),
        Val::Flow(uid) => serde_json::json!({ REF_KEY: "flow", "uid": uid }),
        Val::Event { name, arguments } => {
            let mut args = JsonMap::new();
            for (k, v) in arguments {
                args.insert(k.clone(), val_to_json(v));
            }
            serde_json::json!({ REF_KEY: "event", "name": name, "arguments": args })
        }
    }
}

/// Convert plain JSON into a runtime value.
pub fn json_to_val(value: &JsonValue) -> Val {
    match value {
        JsonValue::Null => Val::Null,
        JsonValue::Bool(b) => Val::Bool(*b),
        JsonValue::Number(n) => Val::Num(n.as_f64().unwrap_or(0.0)),
        JsonValue::String(s) => Val::Str(s.clone()),
        JsonValue::Array(items) => Val::List(items.iter().map(json_to_val).collect()),
        JsonValue::Object(map) => {
            if let Some(JsonValue::String(kind)) = map.get(REF_KEY) {
                match (kind.as_str(), map.get("uid"), map.get("name")) {
                    ("action", Some(JsonValue::String(uid)), _) => {
                        return Val::Action(uid.clone());
                    }
                    ("flow", Some(JsonValue::String(uid)), _) => {
                        return Val::Flow(uid.clone());
                    }
                    ("event", _, Some(JsonValue::String(name))) => {
                        let mut arguments = BTreeMap::new();
                        if let Some(JsonValue::Object(args)) = map.get("arguments") {
                            for (k, v) in args {
                                arguments.insert(k.clone(), json_to_val(v));
                            }
                        }
                        return Val::Event {
                            name: name.clone(),
                            arguments,
                        };
                    }
                    _ => {}
                }
            }
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), json_to_val(v));
            }
            Val::Obj(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        "2024-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_classify_internal_names() {
        assert_eq!(classify("StartFlow"), EventKind::StartFlow);
        assert_eq!(classify("FlowFinished"), EventKind::FlowFinished);
        assert_eq!(classify("UnhandledEvent"), EventKind::UnhandledEvent);
        assert_eq!(classify("ContextUpdate"), EventKind::ContextUpdate);
    }

    #[test]
    fn test_classify_action_lifecycle_names() {
        assert_eq!(
            classify("StartUtteranceBotAction"),
            EventKind::ActionStart {
                action: "UtteranceBotAction".into()
            }
        );
        assert_eq!(
            classify("UtteranceUserActionFinished"),
            EventKind::ActionFinished {
                action: "UtteranceUserAction".into()
            }
        );
        assert_eq!(
            classify("TimerBotActionFailed"),
            EventKind::ActionFailed {
                action: "TimerBotAction".into()
            }
        );
        assert_eq!(
            classify("StopGestureBotAction"),
            EventKind::ActionStop {
                action: "GestureBotAction".into()
            }
        );
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(classify("UserIntent"), EventKind::Other);
        // "StartFlow" is internal, not an action start
        assert_eq!(classify("StartFlow"), EventKind::StartFlow);
        // Needs the Action suffix to be an action event
        assert_eq!(classify("StartSomething"), EventKind::Other);
    }

    #[test]
    fn test_wire_round_trip() {
        let event = Event::new("StartUtteranceBotAction", "event-1", ts(), "engine")
            .with_action_uid("action-7")
            .with_arg("script", Val::Str("Hello world".into()))
            .with_arg("intensity", Val::Num(0.5));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StartUtteranceBotAction");
        assert_eq!(json["uid"], "event-1");
        assert_eq!(json["action_uid"], "action-7");
        assert_eq!(json["script"], "Hello world");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_wire_preserves_unknown_arguments() {
        let raw = serde_json::json!({
            "type": "UtteranceUserActionFinished",
            "uid": "u-1",
            "event_created_at": "2024-01-01T00:00:00+00:00",
            "source_uid": "transport",
            "final_transcript": "hi",
            "some_vendor_field": {"nested": [1, 2]}
        });

        let event: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(event.str_arg("final_transcript"), Some("hi"));
        assert!(event.arg("some_vendor_field").is_some());
        assert_eq!(event.action_uid, None);
    }

    #[test]
    fn test_val_json_reference_round_trip() {
        for val in [
            Val::Action("action-3".into()),
            Val::Flow("flow-2".into()),
            Val::Event {
                name: "UserIntent".into(),
                arguments: BTreeMap::from([("intent".into(), Val::Str("greet".into()))]),
            },
        ] {
            let json = val_to_json(&val);
            assert_eq!(json_to_val(&json), val);
        }
    }
}
