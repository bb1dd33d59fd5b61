use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::agent::AgentClient;
use crate::arbiter::{ArbiterClient, ArbiterEventHandler};
use crate::error::{CoordinatorError, Result};
use crate::launch::LaunchContext;
use crate::slot::{FinalStatus, Slot, SlotId, WorkUnitOutcome};
use crate::tracker::state::JobState;

/// Coordinator phase. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TrackerPhase {
    AwaitingGrants,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerPhase::AwaitingGrants => write!(f, "awaiting_grants"),
            TrackerPhase::Running => write!(f, "running"),
            TrackerPhase::Stopping => write!(f, "stopping"),
            TrackerPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why the stop sequence ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Every work unit reported completion
    Completed,
    /// The arbiter asked the coordinator to shut down
    ShutdownRequested,
    /// Local or transport failure
    Error,
    /// Local operator signal
    Killed,
}

/// Final outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub status: FinalStatus,
    pub reason: StopReason,
    pub message: String,
    /// Diagnostics of failed work units and fatal errors
    pub diagnostics: Vec<String>,
    pub target: u32,
    pub granted: u32,
    pub processed: u32,
    pub failed: u32,
    /// Whether the arbiter acknowledged deregistration
    pub unregistered: bool,
    pub finished_at: DateTime<Utc>,
}

/// The coordinator's slot/completion state machine.
///
/// Launches a work unit on every granted slot, folds completion batches into
/// [`JobState`], and runs the stop sequence exactly once, whichever of
/// completion, shutdown request, error or kill gets there first.
pub struct AllocationTracker {
    state: Arc<JobState>,
    arbiter: Arc<ArbiterClient>,
    agents: Arc<AgentClient>,
    launch: Arc<LaunchContext>,
    live_slots: Mutex<HashMap<SlotId, Slot>>,
    diagnostics: Mutex<Vec<String>>,
    phase_tx: watch::Sender<TrackerPhase>,
    report: Mutex<Option<JobReport>>,
    fatal: Mutex<Option<CoordinatorError>>,
}

impl AllocationTracker {
    pub fn new(
        target: u32,
        arbiter: Arc<ArbiterClient>,
        agents: Arc<AgentClient>,
        launch: Arc<LaunchContext>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(TrackerPhase::AwaitingGrants);

        Self {
            state: Arc::new(JobState::new(target)),
            arbiter,
            agents,
            launch,
            live_slots: Mutex::new(HashMap::new()),
            diagnostics: Mutex::new(Vec::new()),
            phase_tx,
            report: Mutex::new(None),
            fatal: Mutex::new(None),
        }
    }

    pub fn state(&self) -> Arc<JobState> {
        self.state.clone()
    }

    pub fn phase(&self) -> TrackerPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<TrackerPhase> {
        self.phase_tx.subscribe()
    }

    fn advance(&self, next: TrackerPhase) {
        self.phase_tx.send_if_modified(|phase| {
            if next > *phase {
                tracing::debug!(from = %phase, to = %next, "Tracker phase");
                *phase = next;
                true
            } else {
                false
            }
        });
    }

    /// Slot requests are out; waiting on grants and completions.
    pub fn mark_running(&self) {
        self.advance(TrackerPhase::Running);
    }

    /// Slots granted and not yet reported complete.
    pub async fn live_slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.live_slots.lock().await.values().cloned().collect();
        slots.sort_by(|a, b| a.id.cmp(&b.id));
        slots
    }

    pub async fn report(&self) -> Option<JobReport> {
        self.report.lock().await.clone()
    }

    /// Run the stop sequence now if there is nothing left to wait for
    /// (a job with zero work units).
    pub async fn check_complete(&self) -> bool {
        if self.state.is_complete() {
            self.stop(StopReason::Completed).await
        } else {
            false
        }
    }

    /// Local kill: unregister as KILLED.
    pub async fn kill(&self) -> bool {
        tracing::warn!("Kill requested, stopping job");
        self.state.mark_forced_stop();
        self.stop(StopReason::Killed).await
    }

    /// Wait for the stop sequence to finish.
    ///
    /// Returns the report, or the unregistration failure if the arbiter
    /// rejected deregistration.
    pub async fn wait_stopped(&self) -> Result<JobReport> {
        let mut phase_rx = self.phase_tx.subscribe();
        phase_rx
            .wait_for(|phase| *phase == TrackerPhase::Stopped)
            .await
            .map_err(|_| CoordinatorError::Internal("tracker phase channel closed".to_string()))?;

        if let Some(e) = self.fatal.lock().await.take() {
            return Err(e);
        }
        self.report.lock().await.clone().ok_or_else(|| {
            CoordinatorError::Internal("tracker stopped without a report".to_string())
        })
    }

    fn final_status(&self, reason: StopReason) -> FinalStatus {
        match reason {
            StopReason::Killed => FinalStatus::Killed,
            StopReason::ShutdownRequested | StopReason::Error => FinalStatus::Failed,
            StopReason::Completed if self.state.failure_observed() => FinalStatus::Failed,
            StopReason::Completed => FinalStatus::Succeeded,
        }
    }

    fn summary(&self, reason: StopReason, status: FinalStatus, diagnostics: &[String]) -> String {
        let snapshot = self.state.snapshot();
        let mut message = match reason {
            StopReason::Completed if status == FinalStatus::Succeeded => format!(
                "all {} work units succeeded",
                snapshot.target
            ),
            StopReason::Completed => format!(
                "{} of {} work units failed",
                snapshot.failed, snapshot.target
            ),
            StopReason::ShutdownRequested => format!(
                "shutdown requested by arbiter after {} of {} work units",
                snapshot.processed, snapshot.target
            ),
            StopReason::Error => format!(
                "coordinator error after {} of {} work units",
                snapshot.processed, snapshot.target
            ),
            StopReason::Killed => format!(
                "killed after {} of {} work units",
                snapshot.processed, snapshot.target
            ),
        };
        if !diagnostics.is_empty() {
            message.push_str(": ");
            message.push_str(&diagnostics.join("; "));
        }
        message
    }

    /// The stop sequence. Only the first caller runs it; the rest return false.
    ///
    /// Agents are stopped, then the coordinator unregisters (except when the
    /// arbiter itself asked for shutdown), then the arbiter transport stops.
    async fn stop(&self, reason: StopReason) -> bool {
        if !self.state.try_begin_stop() {
            tracing::debug!(reason = ?reason, "Stop sequence already running");
            return false;
        }
        self.advance(TrackerPhase::Stopping);
        tracing::info!(reason = ?reason, "Stopping job");

        self.agents.stop().await;

        let status = self.final_status(reason);
        let diagnostics = self.diagnostics.lock().await.clone();
        let message = self.summary(reason, status, &diagnostics);

        let unregistered = if reason == StopReason::ShutdownRequested {
            tracing::info!("Arbiter initiated shutdown, skipping unregister");
            false
        } else {
            match self.arbiter.unregister(status, &message, None).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(error = %e, status = %status, "Failed to unregister from arbiter");
                    *self.fatal.lock().await = Some(e);
                    false
                }
            }
        };

        self.arbiter.stop().await;

        let snapshot = self.state.snapshot();
        let report = JobReport {
            status,
            reason,
            message,
            diagnostics,
            target: snapshot.target,
            granted: snapshot.granted,
            processed: snapshot.processed,
            failed: snapshot.failed,
            unregistered,
            finished_at: Utc::now(),
        };
        tracing::info!(
            status = %report.status,
            processed = report.processed,
            target = report.target,
            failed = report.failed,
            "Job finished"
        );
        *self.report.lock().await = Some(report);

        self.advance(TrackerPhase::Stopped);
        true
    }
}

#[tonic::async_trait]
impl ArbiterEventHandler for AllocationTracker {
    async fn on_allocated(&self, slots: Vec<Slot>) {
        let granted = self.state.record_granted(slots.len() as u32);
        tracing::info!(
            count = slots.len(),
            granted,
            target = self.state.target(),
            "Slots allocated"
        );

        if self.state.stop_initiated() {
            tracing::warn!(count = slots.len(), "Ignoring slots allocated after stop");
            return;
        }
        if granted > self.state.target() {
            tracing::warn!(
                granted,
                target = self.state.target(),
                "Arbiter granted more slots than requested"
            );
        }

        for slot in slots {
            self.live_slots
                .lock()
                .await
                .insert(slot.id.clone(), slot.clone());
            let slot_id = slot.id.clone();
            if let Err(e) = self.agents.launch(slot, self.launch.clone()).await {
                tracing::warn!(slot_id = %slot_id, error = %e, "Launch not issued");
            }
        }
    }

    async fn on_completed(&self, outcomes: Vec<WorkUnitOutcome>) {
        tracing::info!(count = outcomes.len(), "Work units completed");

        for outcome in &outcomes {
            self.live_slots.lock().await.remove(&outcome.slot_id);
            self.agents.forget(&outcome.slot_id).await;

            if !outcome.is_success() {
                self.state.record_failure();
                tracing::warn!(
                    slot_id = %outcome.slot_id,
                    exit_code = outcome.exit_code,
                    diagnostics = %outcome.diagnostics,
                    "Work unit failed"
                );
                self.diagnostics.lock().await.push(format!(
                    "{} exited with {}: {}",
                    outcome.slot_id, outcome.exit_code, outcome.diagnostics
                ));
            }
        }

        let update = self.state.record_processed(outcomes.len() as u32);
        self.arbiter.set_progress(self.state.progress());
        tracing::info!(
            processed = update.processed,
            target = self.state.target(),
            "Processed count updated"
        );
        if update.surplus > 0 {
            tracing::warn!(surplus = update.surplus, "Ignoring completions beyond target");
        }

        if update.reached_target {
            self.stop(StopReason::Completed).await;
        }
    }

    async fn on_shutdown_requested(&self) {
        tracing::warn!(
            processed = self.state.processed(),
            target = self.state.target(),
            "Shutdown requested by arbiter"
        );
        self.state.mark_forced_stop();
        self.stop(StopReason::ShutdownRequested).await;
    }

    async fn on_error(&self, cause: CoordinatorError) {
        tracing::error!(error = %cause, "Fatal coordinator error");
        self.state.mark_failure();
        self.diagnostics.lock().await.push(cause.to_string());
        self.stop(StopReason::Error).await;
    }
}
