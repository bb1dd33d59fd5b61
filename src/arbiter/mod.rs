//! Client side of the resource arbiter protocol.
//!
//! The coordinator registers once, buffers slot asks, and learns about grants,
//! completions and shutdown requests from periodic allocate heartbeats:
//!
//! - [`ArbiterProtocol`]: the transport seam (gRPC in production, fakes in tests)
//! - [`ArbiterClient`]: lifecycle gating, ask buffering, heartbeat loop and event dispatch
//! - [`ArbiterEventHandler`]: the callbacks the client delivers to
//!
//! # Event delivery
//!
//! Heartbeat replies are turned into [`ArbiterEvent`]s and pushed to a single
//! dispatch worker, decoupled from the heartbeat task. Replies are partial:
//! one ask for N slots may be satisfied across many `Allocated` events, and
//! nothing orders `Allocated` relative to `Completed`.

pub mod client;
pub mod grpc;
mod heartbeat;

pub use client::{ArbiterClient, ClientState};
pub use grpc::GrpcArbiter;

use crate::error::{CoordinatorError, Result};
use crate::slot::{ClusterLimits, FinalStatus, Slot, SlotRequest, WorkUnitOutcome};

/// Registration parameters sent once per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub host: String,
    /// -1 when the coordinator does not serve RPC
    pub port: i32,
    pub tracking_url: Option<String>,
}

/// One allocate heartbeat.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatRequest {
    /// Asks buffered since the previous heartbeat
    pub asks: Vec<SlotRequest>,
    /// Job progress in `[0, 1]`
    pub progress: f32,
}

/// What changed on the arbiter since the previous heartbeat.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatReply {
    pub allocated: Vec<Slot>,
    pub completed: Vec<WorkUnitOutcome>,
    pub shutdown_requested: bool,
}

#[tonic::async_trait]
pub trait ArbiterProtocol: Send + Sync {
    async fn register(&self, registration: &Registration) -> Result<ClusterLimits>;

    async fn allocate(&self, request: HeartbeatRequest) -> Result<HeartbeatReply>;

    async fn unregister(
        &self,
        status: FinalStatus,
        message: &str,
        tracking_url: Option<&str>,
    ) -> Result<()>;
}

/// Asynchronous notifications produced by the arbiter client.
#[derive(Debug)]
pub enum ArbiterEvent {
    Allocated(Vec<Slot>),
    Completed(Vec<WorkUnitOutcome>),
    ShutdownRequested,
    Error(CoordinatorError),
}

/// Receiver of arbiter notifications.
///
/// Implementations must tolerate any interleaving of calls, including
/// concurrent calls from outside the dispatch worker.
#[tonic::async_trait]
pub trait ArbiterEventHandler: Send + Sync {
    async fn on_allocated(&self, slots: Vec<Slot>);

    async fn on_completed(&self, outcomes: Vec<WorkUnitOutcome>);

    async fn on_shutdown_requested(&self);

    async fn on_error(&self, cause: CoordinatorError);
}
