//! Job completion tracking.
//!
//! [`JobState`] holds the shared counters; [`AllocationTracker`] consumes
//! arbiter events, launches work on granted slots, and decides when and how
//! the job ends.
//!
//! # Phases
//!
//! `AwaitingGrants -> Running -> Stopping -> Stopped`
//!
//! Completion (processed == target), an arbiter shutdown request, a fatal
//! error, or a local kill all lead to `Stopping`. The stop sequence is claimed
//! with a single compare-and-swap, so racing triggers run it once.

pub mod allocation;
pub mod state;

pub use allocation::{AllocationTracker, JobReport, StopReason, TrackerPhase};
pub use state::{JobSnapshot, JobState, ProcessedUpdate};
