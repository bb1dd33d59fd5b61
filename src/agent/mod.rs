//! Client side of the execution agent protocol.
//!
//! Agents own granted slots and run work units inside them. Every RPC here is
//! fire-and-forget from the caller's point of view: outcomes come back through
//! an [`AgentEventHandler`] on a dedicated dispatch worker.
//!
//! Agent outcomes are informational. Whether a work unit succeeded is decided
//! only by the arbiter's completion events, so start/status/stop failures are
//! logged and never mark the job failed.

pub mod client;
pub mod grpc;

pub use client::AgentClient;
pub use grpc::GrpcAgent;

use crate::error::{CoordinatorError, Result};
use crate::launch::LaunchContext;
use crate::slot::{ContainerStatus, Slot, SlotId};

#[tonic::async_trait]
pub trait AgentProtocol: Send + Sync {
    async fn start_container(&self, slot: &Slot, context: &LaunchContext) -> Result<()>;

    async fn container_status(&self, slot: &Slot) -> Result<ContainerStatus>;

    async fn stop_container(&self, slot: &Slot) -> Result<()>;
}

#[derive(Debug)]
pub enum AgentEvent {
    Started(SlotId),
    StatusReceived(SlotId, ContainerStatus),
    Stopped(SlotId),
    StartError(SlotId, CoordinatorError),
    StatusError(SlotId, CoordinatorError),
    StopError(SlotId, CoordinatorError),
}

pub trait AgentEventHandler: Send + Sync {
    fn on_started(&self, slot_id: &SlotId);

    fn on_status_received(&self, slot_id: &SlotId, status: &ContainerStatus);

    fn on_stopped(&self, slot_id: &SlotId);

    fn on_start_error(&self, slot_id: &SlotId, cause: &CoordinatorError);

    fn on_status_error(&self, slot_id: &SlotId, cause: &CoordinatorError);

    fn on_stop_error(&self, slot_id: &SlotId, cause: &CoordinatorError);
}

/// Logs agent outcomes. Mutates nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAgentHandler;

impl AgentEventHandler for LoggingAgentHandler {
    fn on_started(&self, slot_id: &SlotId) {
        tracing::info!(slot_id = %slot_id, "Container started");
    }

    fn on_status_received(&self, slot_id: &SlotId, status: &ContainerStatus) {
        tracing::info!(
            slot_id = %slot_id,
            state = %status.state,
            exit_code = ?status.exit_code,
            "Container status received"
        );
    }

    fn on_stopped(&self, slot_id: &SlotId) {
        tracing::info!(slot_id = %slot_id, "Container stopped");
    }

    fn on_start_error(&self, slot_id: &SlotId, cause: &CoordinatorError) {
        tracing::error!(slot_id = %slot_id, error = %cause, "Failed to start container");
    }

    fn on_status_error(&self, slot_id: &SlotId, cause: &CoordinatorError) {
        tracing::error!(slot_id = %slot_id, error = %cause, "Failed to query container status");
    }

    fn on_stop_error(&self, slot_id: &SlotId, cause: &CoordinatorError) {
        tracing::error!(slot_id = %slot_id, error = %cause, "Failed to stop container");
    }
}
