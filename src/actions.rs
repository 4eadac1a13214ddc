//! Action executor registry
//!
//! The engine only emits `Start<A>`/`Stop<A>` events; something outside has
//! to perform them. This registry is the in-process collaborator: handlers
//! run async, produce the correlated `<A>Started` and `<A>Finished`/`<A>Failed`
//! events, and the caller feeds those back into `Runtime::advance` like any
//! other external input.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::types::Val;
use crate::events::{self, Event};

/// One action implementation.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Perform the action. `Ok` becomes the `return_value` of `<A>Finished`,
    /// `Err` the `error` of `<A>Failed`.
    async fn execute(&self, arguments: BTreeMap<String, Val>) -> Result<Val, String>;
}

#[async_trait]
impl<F> ActionHandler for F
where
    F: Fn(BTreeMap<String, Val>) -> Result<Val, String> + Send + Sync,
{
    async fn execute(&self, arguments: BTreeMap<String, Val>) -> Result<Val, String> {
        self(arguments)
    }
}

/// Maps UMIM action names to handlers.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Execute the handler behind a `Start<A>` event.
    ///
    /// Returns the lifecycle events in emission order: `<A>Started` followed
    /// by `<A>Finished` or `<A>Failed`, all correlated through the start
    /// event's `action_uid`. A start with no registered handler fails the
    /// action rather than stalling it.
    pub async fn dispatch(&self, start: &Event) -> Vec<Event> {
        let Some(action) = action_name(&start.name) else {
            tracing::warn!(event = %start.name, "dispatch of a non-start event");
            return Vec::new();
        };
        let action_uid = start
            .action_uid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut out = vec![lifecycle_event(
            events::started_event_name(&action),
            &action_uid,
        )];

        match self.handlers.get(&action) {
            Some(handler) => match handler.execute(start.arguments.clone()).await {
                Ok(value) => {
                    let mut finished =
                        lifecycle_event(events::finished_event_name(&action), &action_uid);
                    finished.arguments.insert("return_value".to_string(), value);
                    finished
                        .arguments
                        .insert("is_success".to_string(), Val::Bool(true));
                    out.push(finished);
                }
                Err(message) => {
                    let mut failed =
                        lifecycle_event(events::failed_event_name(&action), &action_uid);
                    failed
                        .arguments
                        .insert("error".to_string(), Val::Str(message));
                    out.push(failed);
                }
            },
            None => {
                let mut failed = lifecycle_event(events::failed_event_name(&action), &action_uid);
                failed.arguments.insert(
                    "error".to_string(),
                    Val::Str(format!("no handler registered for {}", action)),
                );
                out.push(failed);
            }
        }
        out
    }
}

fn action_name(event_name: &str) -> Option<String> {
    match events::classify(event_name) {
        events::EventKind::ActionStart { action } => Some(action),
        _ => None,
    }
}

fn lifecycle_event(name: String, action_uid: &str) -> Event {
    Event::new(name, Uuid::new_v4().to_string(), Utc::now(), "executor")
        .with_action_uid(action_uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        async fn execute(&self, arguments: BTreeMap<String, Val>) -> Result<Val, String> {
            arguments
                .get("script")
                .cloned()
                .ok_or_else(|| "missing script".to_string())
        }
    }

    fn start_event() -> Event {
        Event::new(
            "StartUtteranceBotAction",
            "event-1",
            DateTime::<Utc>::UNIX_EPOCH,
            "engine",
        )
        .with_action_uid("action-1")
        .with_arg("script", Val::Str("Hello world".into()))
    }

    #[tokio::test]
    async fn test_dispatch_success_correlates_events() {
        let mut registry = ActionRegistry::new();
        registry.register("UtteranceBotAction", Arc::new(Echo));

        let out = registry.dispatch(&start_event()).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "UtteranceBotActionStarted");
        assert_eq!(out[1].name, "UtteranceBotActionFinished");
        assert_eq!(out[0].action_uid.as_deref(), Some("action-1"));
        assert_eq!(out[1].action_uid.as_deref(), Some("action-1"));
        assert_eq!(
            out[1].arg("return_value"),
            Some(&Val::Str("Hello world".into()))
        );
    }

    #[tokio::test]
    async fn test_dispatch_without_handler_fails_action() {
        let registry = ActionRegistry::new();
        let out = registry.dispatch(&start_event()).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].name, "UtteranceBotActionFailed");
        assert!(out[1].str_arg("error").is_some());
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failed_event() {
        let mut registry = ActionRegistry::new();
        registry.register("UtteranceBotAction", Arc::new(Echo));

        let start = Event::new(
            "StartUtteranceBotAction",
            "event-2",
            DateTime::<Utc>::UNIX_EPOCH,
            "engine",
        )
        .with_action_uid("action-2");
        let out = registry.dispatch(&start).await;
        assert_eq!(out[1].name, "UtteranceBotActionFailed");
        assert_eq!(out[1].str_arg("error"), Some("missing script"));
    }
}
