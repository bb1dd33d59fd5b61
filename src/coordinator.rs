use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{AgentClient, AgentProtocol, GrpcAgent, LoggingAgentHandler};
use crate::arbiter::{ArbiterClient, ArbiterEventHandler, ArbiterProtocol, GrpcArbiter};
use crate::config::CoordinatorConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::error::Result;
use crate::launch::LaunchContext;
use crate::submitter::RequestSubmitter;
use crate::tracker::{AllocationTracker, JobReport};

/// Drives one job from registration to deregistration.
pub struct Coordinator {
    config: CoordinatorConfig,
    attempt_id: Uuid,
    arbiter: Arc<dyn ArbiterProtocol>,
    agents: Arc<dyn AgentProtocol>,
    launch: LaunchContext,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        arbiter: Arc<dyn ArbiterProtocol>,
        agents: Arc<dyn AgentProtocol>,
    ) -> Self {
        let launch = LaunchContext::from_config(&config.launch, Vec::new());
        Self {
            config,
            attempt_id: Uuid::new_v4(),
            arbiter,
            agents,
            launch,
        }
    }

    /// Connect to the arbiter over gRPC and load the launch context.
    pub async fn connect(config: CoordinatorConfig) -> Result<Self> {
        let arbiter = GrpcArbiter::connect(&config.arbiter).await?;
        let agents = GrpcAgent::new(&config.agent);
        let launch = LaunchContext::load(&config.launch).await?;

        Ok(Self::new(config, Arc::new(arbiter), Arc::new(agents)).with_launch_context(launch))
    }

    pub fn with_launch_context(mut self, launch: LaunchContext) -> Self {
        self.launch = launch;
        self
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    /// Run the job to completion.
    ///
    /// 1. Starts the agent and arbiter clients
    /// 2. Registers, learning the cluster limits
    /// 3. Optionally serves the tracking endpoint
    /// 4. Submits one slot request per work unit
    /// 5. Waits for the tracker to stop, or kills the job when `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails or the arbiter rejects
    /// deregistration. Work unit failures are reported in the [`JobReport`].
    pub async fn run(self, shutdown: CancellationToken) -> Result<JobReport> {
        let config = &self.config;
        tracing::info!(
            attempt_id = %self.attempt_id,
            target = config.target_count,
            capability = %config.unit_capability,
            "Starting coordinator"
        );

        let agents = Arc::new(AgentClient::new(
            self.agents.clone(),
            config.agent.cleanup_on_stop,
        ));
        agents.start(Arc::new(LoggingAgentHandler)).await?;

        let arbiter = Arc::new(ArbiterClient::new(
            self.arbiter.clone(),
            config.arbiter.heartbeat_interval_ms,
        ));
        let tracker = Arc::new(AllocationTracker::new(
            config.target_count,
            arbiter.clone(),
            agents.clone(),
            Arc::new(self.launch.clone()),
        ));
        arbiter.start(tracker.clone()).await?;

        let tracking_url = config.tracking_url();
        let limits = match arbiter
            .register(&config.hostname, config.rpc_port, tracking_url.as_deref())
            .await
        {
            Ok(limits) => limits,
            Err(e) => {
                tracing::error!(attempt_id = %self.attempt_id, error = %e, "Registration failed");
                agents.stop().await;
                arbiter.stop().await;
                return Err(e);
            }
        };

        if let Some(addr) = config.dashboard_addr {
            let state = DashboardState {
                attempt_id: self.attempt_id,
                tracker: tracker.clone(),
            };
            tokio::spawn(async move {
                run_dashboard(addr, state).await;
            });
        }

        tracker.mark_running();

        let submitter = RequestSubmitter::new(
            arbiter.clone(),
            config.unit_capability,
            config.priority,
            config.max_in_flight_requests,
        );
        if let Err(e) = submitter.submit_all(config.target_count, &limits).await {
            tracker.on_error(e).await;
        }

        tracker.check_complete().await;

        tokio::select! {
            result = tracker.wait_stopped() => result,
            _ = shutdown.cancelled() => {
                tracker.kill().await;
                tracker.wait_stopped().await
            }
        }
    }
}
