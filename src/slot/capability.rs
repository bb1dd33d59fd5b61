use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, Result};

/// A resource quantity: memory in megabytes and virtual cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub memory_mb: u64,
    pub vcores: u32,
}

impl Capability {
    pub fn new(memory_mb: u64, vcores: u32) -> Self {
        Self { memory_mb, vcores }
    }

    /// Component-wise minimum of `self` and `max`.
    ///
    /// Memory and cores are capped independently, so the result never exceeds
    /// `max` in either dimension.
    pub fn capped_to(&self, max: &Capability) -> Capability {
        Capability {
            memory_mb: self.memory_mb.min(max.memory_mb),
            vcores: self.vcores.min(max.vcores),
        }
    }

    pub fn fits_within(&self, max: &Capability) -> bool {
        self.memory_mb <= max.memory_mb && self.vcores <= max.vcores
    }

    /// True if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.memory_mb == 0 || self.vcores == 0
    }

    /// Reject capabilities that cannot be submitted in a request.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(CoordinatorError::InvalidCapability(format!(
                "{} must have non-zero memory and vcores",
                self
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<memory:{}MB, vcores:{}>", self.memory_mb, self.vcores)
    }
}

/// Bounds reported by the arbiter at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLimits {
    /// Largest capability the arbiter will grant on a single node.
    pub max_capability: Capability,
}

impl ClusterLimits {
    pub fn new(max_capability: Capability) -> Self {
        Self { max_capability }
    }

    /// Cap a per-unit capability to what a single node can hold.
    pub fn cap(&self, requested: &Capability) -> Capability {
        requested.capped_to(&self.max_capability)
    }
}
