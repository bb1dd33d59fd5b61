use serde::{Deserialize, Serialize};

use crate::slot::SlotId;

/// Final status reported to the arbiter when the coordinator unregisters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalStatus {
    Succeeded,
    Failed,
    Killed,
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalStatus::Succeeded => write!(f, "SUCCEEDED"),
            FinalStatus::Failed => write!(f, "FAILED"),
            FinalStatus::Killed => write!(f, "KILLED"),
        }
    }
}

/// Container state as seen by an execution agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    New,
    Running,
    Complete,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::New => write!(f, "new"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Complete => write!(f, "complete"),
        }
    }
}

/// Status snapshot returned by an agent status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub slot_id: SlotId,
    pub state: ContainerState,
    pub exit_code: Option<i32>,
    pub diagnostics: String,
}
