use serde::{Deserialize, Serialize};

/// Lifecycle state of a flow instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Starting,
    Active,
    Waiting,
    Finished,
    Failed,
    Stopped,
}

impl FlowStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowStatus::Finished | FlowStatus::Failed | FlowStatus::Stopped
        )
    }
}

/// Lifecycle state of one external action instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Starting,
    Started,
    Finished,
    Stopped,
    Failed,
}

impl ActionStatus {
    /// Live actions still expect lifecycle events from the actuator.
    pub fn is_live(&self) -> bool {
        matches!(self, ActionStatus::Starting | ActionStatus::Started)
    }
}
