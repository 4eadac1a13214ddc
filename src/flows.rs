//! Flow definitions and the append-only definition registry
//!
//! A definition is an immutable template. Registering a new definition for an
//! existing id appends a new version; live instances keep the `Arc` to the
//! exact definition they were started against, so additions never change a
//! running instance's behavior.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::types::{Expr, Stmt};

/// One declared flow parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowParameter {
    pub name: String,
    #[serde(default)]
    pub default: Option<Expr>,
}

/// An immutable flow template: the compiled form of one DSL flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    #[serde(default)]
    pub parameters: Vec<FlowParameter>,
    /// Conflict-resolution weight; defaults to 1.0 when absent
    #[serde(default)]
    pub priority: Option<Expr>,
    #[serde(default)]
    pub is_activatable: bool,
    pub body: Vec<Stmt>,
}

/// Append-only registry of flow definitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    by_id: HashMap<String, Vec<Arc<FlowDefinition>>>,
    order: Vec<String>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Re-registering an id appends a new version;
    /// `latest` returns it, live instances keep their pinned version.
    pub fn register(&mut self, definition: FlowDefinition) -> Arc<FlowDefinition> {
        let definition = Arc::new(definition);
        let versions = self.by_id.entry(definition.id.clone()).or_default();
        if versions.is_empty() {
            self.order.push(definition.id.clone());
        }
        versions.push(Arc::clone(&definition));
        definition
    }

    pub fn latest(&self, id: &str) -> Option<Arc<FlowDefinition>> {
        self.by_id.get(id).and_then(|v| v.last()).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Flow ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
