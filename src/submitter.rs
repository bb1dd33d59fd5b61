use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::arbiter::ArbiterClient;
use crate::error::{CoordinatorError, Result};
use crate::slot::{Capability, ClusterLimits, SlotRequest};

/// What was submitted to the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionSummary {
    pub submitted: u32,
    /// Per-unit capability after capping to cluster limits
    pub capability: Capability,
}

/// Issues one slot request per work unit, concurrently.
///
/// Submission tasks are bounded by a semaphore so a large target does not
/// spawn thousands of tasks at once. Every task runs to completion; the first
/// error (if any) is returned after all of them finish.
pub struct RequestSubmitter {
    arbiter: Arc<ArbiterClient>,
    capability: Capability,
    priority: i32,
    max_in_flight: usize,
}

impl RequestSubmitter {
    pub fn new(
        arbiter: Arc<ArbiterClient>,
        capability: Capability,
        priority: i32,
        max_in_flight: usize,
    ) -> Self {
        Self {
            arbiter,
            capability,
            priority,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub async fn submit_all(&self, target: u32, limits: &ClusterLimits) -> Result<SubmissionSummary> {
        let capability = limits.cap(&self.capability);
        if capability != self.capability {
            tracing::warn!(
                requested = %self.capability,
                granted = %capability,
                "Requested capability exceeds cluster limits, capping"
            );
        }
        capability.validate()?;

        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        for unit in 0..target {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| CoordinatorError::Internal(format!("submission semaphore closed: {}", e)))?;
            let arbiter = self.arbiter.clone();
            let request = SlotRequest::new(capability, self.priority);

            tasks.spawn(async move {
                let _permit = permit;
                tracing::debug!(unit, capability = %request.capability, "Submitting slot request");
                arbiter.submit_request(request).await
            });
        }

        let mut submitted = 0u32;
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| CoordinatorError::Internal(format!("submission task failed: {}", e)))
                .and_then(|result| result);
            match outcome {
                Ok(()) => submitted += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Slot request submission failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        tracing::info!(submitted, capability = %capability, "Slot requests submitted");
        Ok(SubmissionSummary {
            submitted,
            capability,
        })
    }
}
