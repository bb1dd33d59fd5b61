use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::agent::{AgentEvent, AgentEventHandler, AgentProtocol};
use crate::error::{CoordinatorError, Result};
use crate::launch::LaunchContext;
use crate::slot::{Slot, SlotId};

/// Async handle to execution agents.
pub struct AgentClient {
    protocol: Arc<dyn AgentProtocol>,
    cleanup_on_stop: bool,
    started: AtomicBool,
    /// Slots with a launch issued and no completion observed yet
    launched: Arc<Mutex<HashMap<SlotId, Slot>>>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<AgentEvent>>>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
}

impl AgentClient {
    pub fn new(protocol: Arc<dyn AgentProtocol>, cleanup_on_stop: bool) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            protocol,
            cleanup_on_stop,
            started: AtomicBool::new(false),
            launched: Arc::new(Mutex::new(HashMap::new())),
            event_tx: Mutex::new(Some(event_tx)),
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Spawn the dispatch worker that delivers outcomes to `handler`.
    pub async fn start(&self, handler: Arc<dyn AgentEventHandler>) -> Result<()> {
        let event_rx = self.event_rx.lock().await.take().ok_or_else(|| {
            CoordinatorError::InvalidState("agent client already started".to_string())
        })?;
        tokio::spawn(dispatch_events(event_rx, handler));
        self.started.store(true, Ordering::SeqCst);
        tracing::debug!("Agent client started");
        Ok(())
    }

    async fn sender(&self) -> Result<mpsc::UnboundedSender<AgentEvent>> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(CoordinatorError::InvalidState(
                "agent client not started".to_string(),
            ));
        }
        self.event_tx
            .lock()
            .await
            .clone()
            .ok_or_else(|| CoordinatorError::InvalidState("agent client stopped".to_string()))
    }

    async fn tracked(&self, slot_id: &SlotId) -> Result<Slot> {
        self.launched
            .lock()
            .await
            .get(slot_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::Agent {
                slot_id: slot_id.to_string(),
                message: "no launch issued for this slot".to_string(),
            })
    }

    /// Ask the slot's agent to run a work unit.
    ///
    /// Returns once the request is issued; `on_started` or `on_start_error`
    /// reports the outcome.
    pub async fn launch(&self, slot: Slot, context: Arc<LaunchContext>) -> Result<()> {
        let events = self.sender().await?;
        self.launched
            .lock()
            .await
            .insert(slot.id.clone(), slot.clone());

        tracing::info!(
            slot_id = %slot.id,
            node = %slot.node_address,
            capability = %slot.capability,
            "Launching work unit"
        );

        let protocol = self.protocol.clone();
        tokio::spawn(async move {
            let event = match protocol.start_container(&slot, &context).await {
                Ok(()) => AgentEvent::Started(slot.id),
                Err(e) => AgentEvent::StartError(slot.id, e),
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    /// Query the status of a launched slot.
    pub async fn query_status(&self, slot_id: &SlotId) -> Result<()> {
        let events = self.sender().await?;
        let slot = self.tracked(slot_id).await?;

        let protocol = self.protocol.clone();
        tokio::spawn(async move {
            let event = match protocol.container_status(&slot).await {
                Ok(status) => AgentEvent::StatusReceived(slot.id, status),
                Err(e) => AgentEvent::StatusError(slot.id, e),
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    /// Stop a launched slot's work unit.
    pub async fn stop_container(&self, slot_id: &SlotId) -> Result<()> {
        let events = self.sender().await?;
        let slot = self.tracked(slot_id).await?;

        let protocol = self.protocol.clone();
        let launched = self.launched.clone();
        tokio::spawn(async move {
            let event = match protocol.stop_container(&slot).await {
                Ok(()) => {
                    launched.lock().await.remove(&slot.id);
                    AgentEvent::Stopped(slot.id)
                }
                Err(e) => AgentEvent::StopError(slot.id, e),
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    /// Stop tracking a slot whose completion the arbiter has reported.
    pub async fn forget(&self, slot_id: &SlotId) -> Option<Slot> {
        self.launched.lock().await.remove(slot_id)
    }

    pub async fn running_slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.launched.lock().await.values().cloned().collect();
        slots.sort_by(|a, b| a.id.cmp(&b.id));
        slots
    }

    /// Close all agent sessions. Idempotent.
    ///
    /// With `cleanup_on_stop`, still-tracked containers are stopped first.
    /// Outcomes already queued are delivered before the dispatch worker exits.
    pub async fn stop(&self) {
        let Some(events) = self.event_tx.lock().await.take() else {
            return;
        };

        let leftover: Vec<Slot> = self.launched.lock().await.drain().map(|(_, s)| s).collect();
        if self.cleanup_on_stop && !leftover.is_empty() {
            tracing::info!(count = leftover.len(), "Stopping running containers");
            for slot in leftover {
                let event = match self.protocol.stop_container(&slot).await {
                    Ok(()) => AgentEvent::Stopped(slot.id),
                    Err(e) => AgentEvent::StopError(slot.id, e),
                };
                let _ = events.send(event);
            }
        }

        tracing::debug!("Agent client stopped");
    }
}

async fn dispatch_events(
    mut events: mpsc::UnboundedReceiver<AgentEvent>,
    handler: Arc<dyn AgentEventHandler>,
) {
    while let Some(event) = events.recv().await {
        match &event {
            AgentEvent::Started(id) => handler.on_started(id),
            AgentEvent::StatusReceived(id, status) => handler.on_status_received(id, status),
            AgentEvent::Stopped(id) => handler.on_stopped(id),
            AgentEvent::StartError(id, e) => handler.on_start_error(id, e),
            AgentEvent::StatusError(id, e) => handler.on_status_error(id, e),
            AgentEvent::StopError(id, e) => handler.on_stop_error(id, e),
        }
    }
    tracing::debug!("Agent event dispatch finished");
}
