use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::arbiter::client::Shared;
use crate::arbiter::{ArbiterEvent, HeartbeatRequest};

/// Periodically sends allocate heartbeats and turns replies into events.
pub(crate) struct HeartbeatLoop {
    interval: Duration,
}

impl HeartbeatLoop {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
        }
    }

    /// Run until cancelled, the arbiter asks for shutdown, a heartbeat fails,
    /// or the event receiver is dropped.
    pub async fn run(
        &self,
        shared: Arc<Shared>,
        events: mpsc::UnboundedSender<ArbiterEvent>,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let request = HeartbeatRequest {
                asks: shared.take_pending().await,
                progress: shared.progress(),
            };
            let asks = request.asks.len();

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = shared.protocol.allocate(request) => result,
            };

            let reply = match result {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(error = %e, asks, "Allocate heartbeat failed");
                    let _ = events.send(ArbiterEvent::Error(e));
                    break;
                }
            };

            tracing::trace!(
                asks,
                allocated = reply.allocated.len(),
                completed = reply.completed.len(),
                shutdown_requested = reply.shutdown_requested,
                "Heartbeat reply"
            );

            if !reply.allocated.is_empty()
                && events.send(ArbiterEvent::Allocated(reply.allocated)).is_err()
            {
                break;
            }
            if !reply.completed.is_empty()
                && events.send(ArbiterEvent::Completed(reply.completed)).is_err()
            {
                break;
            }
            if reply.shutdown_requested {
                tracing::warn!("Arbiter requested shutdown");
                let _ = events.send(ArbiterEvent::ShutdownRequested);
                break;
            }
        }

        tracing::debug!("Heartbeat loop stopped");
    }
}
