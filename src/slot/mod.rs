//! Slot negotiation data model.
//!
//! - [`Capability`]: a resource quantity (memory + virtual cores)
//! - [`SlotRequest`]: a pending ask submitted to the arbiter
//! - [`Slot`]: a granted container on some execution agent
//! - [`WorkUnitOutcome`]: the exit status of a work unit, reported by the arbiter
//!
//! Requests carry no identity the arbiter echoes back. Grants are matched to
//! requests only by aggregate count.

pub mod capability;
pub mod container;
pub mod status;

pub use capability::{Capability, ClusterLimits};
pub use container::{Slot, SlotId, SlotRequest, WorkUnitOutcome};
pub use status::{ContainerState, ContainerStatus, FinalStatus};
