//! Runtime configuration

use serde::{Deserialize, Serialize};

/// Tunables for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on internal events processed per `advance` call; exceeding
    /// it fails the step instead of looping forever.
    pub max_internal_events: usize,
    /// Flow started implicitly at initialization.
    pub main_flow_id: String,
    /// `source_uid` stamped on engine-synthesized events.
    pub source_uid: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_internal_events: 1000,
            main_flow_id: "main".to_string(),
            source_uid: "colloquy".to_string(),
        }
    }
}
