use serde::{Deserialize, Serialize};

use crate::slot::Capability;

/// Opaque container identifier assigned by the arbiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlotId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A pending ask for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRequest {
    pub capability: Capability,
    pub priority: i32,
    pub node_hint: Option<String>,
    pub rack_hint: Option<String>,
}

impl SlotRequest {
    /// An ask the arbiter is free to place on any node and rack.
    pub fn new(capability: Capability, priority: i32) -> Self {
        Self {
            capability,
            priority,
            node_hint: None,
            rack_hint: None,
        }
    }

    pub fn with_node_hint(mut self, node: impl Into<String>) -> Self {
        self.node_hint = Some(node.into());
        self
    }

    pub fn with_rack_hint(mut self, rack: impl Into<String>) -> Self {
        self.rack_hint = Some(rack.into());
        self
    }
}

/// A granted container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub capability: Capability,
    /// `host:port` of the execution agent that owns the slot.
    pub node_address: String,
}

impl Slot {
    pub fn new(id: impl Into<String>, capability: Capability, node_address: impl Into<String>) -> Self {
        Self {
            id: SlotId::new(id),
            capability,
            node_address: node_address.into(),
        }
    }
}

/// Exit status of one work unit, as reported in a completion event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnitOutcome {
    pub slot_id: SlotId,
    pub exit_code: i32,
    pub diagnostics: String,
}

impl WorkUnitOutcome {
    pub fn new(slot_id: impl Into<String>, exit_code: i32, diagnostics: impl Into<String>) -> Self {
        Self {
            slot_id: SlotId::new(slot_id),
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn succeeded(slot_id: impl Into<String>) -> Self {
        Self::new(slot_id, 0, "")
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}
