use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::arbiter::heartbeat::HeartbeatLoop;
use crate::arbiter::{ArbiterEvent, ArbiterEventHandler, ArbiterProtocol, Registration};
use crate::error::{CoordinatorError, Result};
use crate::slot::{ClusterLimits, FinalStatus, SlotRequest};

/// Lifecycle of an [`ArbiterClient`]. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Created,
    Started,
    Registered,
    Unregistered,
    Stopped,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientState::Created => write!(f, "created"),
            ClientState::Started => write!(f, "started"),
            ClientState::Registered => write!(f, "registered"),
            ClientState::Unregistered => write!(f, "unregistered"),
            ClientState::Stopped => write!(f, "stopped"),
        }
    }
}

/// State shared between the client handle and its heartbeat task.
pub(crate) struct Shared {
    pub(crate) protocol: Arc<dyn ArbiterProtocol>,
    pending: Mutex<Vec<SlotRequest>>,
    /// f32 bits
    progress: AtomicU32,
}

impl Shared {
    pub(crate) async fn take_pending(&self) -> Vec<SlotRequest> {
        std::mem::take(&mut *self.pending.lock().await)
    }

    pub(crate) fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Relaxed))
    }
}

/// Async handle to the resource arbiter.
///
/// `start` must precede `register`; `register` and `unregister` may each be
/// called once. Violations are reported as [`CoordinatorError::InvalidState`]
/// rather than left to the arbiter to reject.
pub struct ArbiterClient {
    shared: Arc<Shared>,
    heartbeat_interval_ms: u64,
    state: Mutex<ClientState>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<ArbiterEvent>>>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<ArbiterEvent>>>,
    /// Cancels the heartbeat loop
    heartbeat_cancel: CancellationToken,
}

impl ArbiterClient {
    pub fn new(protocol: Arc<dyn ArbiterProtocol>, heartbeat_interval_ms: u64) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                protocol,
                pending: Mutex::new(Vec::new()),
                progress: AtomicU32::new(0f32.to_bits()),
            }),
            heartbeat_interval_ms,
            state: Mutex::new(ClientState::Created),
            event_tx: Mutex::new(Some(event_tx)),
            event_rx: Mutex::new(Some(event_rx)),
            heartbeat_cancel: CancellationToken::new(),
        }
    }

    pub async fn state(&self) -> ClientState {
        *self.state.lock().await
    }

    /// Spawn the dispatch worker that delivers events to `handler`.
    pub async fn start(&self, handler: Arc<dyn ArbiterEventHandler>) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state != ClientState::Created {
            return Err(CoordinatorError::InvalidState(format!(
                "cannot start arbiter client in state {}",
                *state
            )));
        }

        let event_rx = self.event_rx.lock().await.take().ok_or_else(|| {
            CoordinatorError::Internal("arbiter event receiver already taken".to_string())
        })?;
        tokio::spawn(dispatch_events(event_rx, handler));

        *state = ClientState::Started;
        tracing::debug!("Arbiter client started");
        Ok(())
    }

    /// Register with the arbiter and start heartbeating.
    ///
    /// Blocks until the arbiter responds. Returns the per-node maximum
    /// capability the arbiter will honor.
    pub async fn register(
        &self,
        host: &str,
        port: i32,
        tracking_url: Option<&str>,
    ) -> Result<ClusterLimits> {
        let mut state = self.state.lock().await;
        match *state {
            ClientState::Started => {}
            ClientState::Created => {
                return Err(CoordinatorError::InvalidState(
                    "register called before start".to_string(),
                ))
            }
            other => {
                return Err(CoordinatorError::InvalidState(format!(
                    "register called twice (client is {})",
                    other
                )))
            }
        }

        let registration = Registration {
            host: host.to_string(),
            port,
            tracking_url: tracking_url.map(str::to_string),
        };
        let limits = self.shared.protocol.register(&registration).await?;

        let events = self.event_tx.lock().await.clone().ok_or_else(|| {
            CoordinatorError::Internal("arbiter event channel closed".to_string())
        })?;
        let heartbeat = HeartbeatLoop::new(self.heartbeat_interval_ms);
        let shared = self.shared.clone();
        let cancel = self.heartbeat_cancel.clone();
        tokio::spawn(async move {
            heartbeat.run(shared, events, cancel).await;
        });

        *state = ClientState::Registered;
        tracing::info!(
            host,
            port,
            tracking_url = ?tracking_url,
            max_capability = %limits.max_capability,
            "Registered with arbiter"
        );
        Ok(limits)
    }

    /// Buffer an ask; the next heartbeat carries it to the arbiter.
    ///
    /// No acknowledgment: grants arrive later as `Allocated` events.
    pub async fn submit_request(&self, request: SlotRequest) -> Result<()> {
        let state = *self.state.lock().await;
        if !matches!(state, ClientState::Started | ClientState::Registered) {
            return Err(CoordinatorError::SlotRequest(format!(
                "arbiter client is {}",
                state
            )));
        }
        request.capability.validate()?;

        tracing::debug!(
            capability = %request.capability,
            priority = request.priority,
            "Slot request queued"
        );
        self.shared.pending.lock().await.push(request);
        Ok(())
    }

    /// Asks not yet carried by a heartbeat.
    pub async fn pending_requests(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    /// Report job progress on subsequent heartbeats. Clamped to `[0, 1]`.
    pub fn set_progress(&self, progress: f32) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        self.shared
            .progress
            .store(progress.to_bits(), Ordering::Relaxed);
    }

    pub fn progress(&self) -> f32 {
        self.shared.progress()
    }

    /// Deregister from the arbiter. Heartbeats stop before the RPC is sent.
    pub async fn unregister(
        &self,
        status: FinalStatus,
        message: &str,
        tracking_url: Option<&str>,
    ) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match *state {
                ClientState::Registered => {}
                ClientState::Unregistered | ClientState::Stopped => {
                    return Err(CoordinatorError::InvalidState(format!(
                        "unregister called more than once (client is {})",
                        *state
                    )))
                }
                other => {
                    return Err(CoordinatorError::InvalidState(format!(
                        "unregister called while {}",
                        other
                    )))
                }
            }
            *state = ClientState::Unregistered;
        }

        self.heartbeat_cancel.cancel();
        tracing::info!(status = %status, message, "Unregistering from arbiter");
        self.shared
            .protocol
            .unregister(status, message, tracking_url)
            .await
    }

    /// Stop heartbeating and close the event channel. Idempotent.
    ///
    /// Events already queued are still delivered; the dispatch worker exits
    /// once the queue drains.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if *state == ClientState::Stopped {
            return;
        }
        *state = ClientState::Stopped;
        self.heartbeat_cancel.cancel();
        self.event_tx.lock().await.take();
        tracing::debug!("Arbiter client stopped");
    }
}

async fn dispatch_events(
    mut events: mpsc::UnboundedReceiver<ArbiterEvent>,
    handler: Arc<dyn ArbiterEventHandler>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ArbiterEvent::Allocated(slots) => handler.on_allocated(slots).await,
            ArbiterEvent::Completed(outcomes) => handler.on_completed(outcomes).await,
            ArbiterEvent::ShutdownRequested => handler.on_shutdown_requested().await,
            ArbiterEvent::Error(cause) => handler.on_error(cause).await,
        }
    }
    tracing::debug!("Arbiter event dispatch finished");
}
