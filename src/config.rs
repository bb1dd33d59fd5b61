use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::launch::LocalResource;
use crate::slot::Capability;

/// Connection settings for the resource arbiter.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Arbiter endpoint, e.g. `http://127.0.0.1:8030`
    pub address: String,
    /// Interval between allocate heartbeats
    pub heartbeat_interval_ms: u64,
    /// Per-RPC timeout for register, allocate and unregister
    pub rpc_timeout_ms: u64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8030".to_string(),
            heartbeat_interval_ms: 1000,
            rpc_timeout_ms: 10_000,
        }
    }
}

/// Connection settings for execution agents.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Per-RPC timeout for start, status and stop calls
    pub rpc_timeout_ms: u64,
    /// Stop containers that are still running when the agent client stops.
    pub cleanup_on_stop: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 10_000,
            cleanup_on_stop: true,
        }
    }
}

/// What every work unit runs.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Executable to run inside each slot
    pub program: String,
    pub args: Vec<String>,
    /// Append the `debug` flag to the work unit command line.
    pub debug: bool,
    /// Entries appended to the `CLASSPATH` search path after `./*`
    pub search_path: Vec<String>,
    /// Value for `LANG`
    pub locale: String,
    /// Additional environment for the work unit
    pub environment: BTreeMap<String, String>,
    /// Files the agent localizes before launch, keyed by link name
    pub local_resources: BTreeMap<String, LocalResource>,
    /// Opaque credentials passed through to agents unchanged
    pub tokens_path: Option<PathBuf>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            args: vec!["-c100".to_string(), "localhost".to_string()],
            debug: false,
            search_path: Vec::new(),
            locale: "en_US.UTF-8".to_string(),
            environment: BTreeMap::new(),
            local_resources: BTreeMap::new(),
            tokens_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Host name reported to the arbiter at registration
    pub hostname: String,
    /// RPC port reported at registration; -1 when the coordinator serves no RPC
    pub rpc_port: i32,
    /// Number of work units to run
    pub target_count: u32,
    /// Capability asked for each work unit, before capping to cluster limits
    pub unit_capability: Capability,
    pub priority: i32,
    /// Upper bound on concurrently running request-submission tasks
    pub max_in_flight_requests: usize,
    /// Serve the tracking endpoint on this address when set
    pub dashboard_addr: Option<SocketAddr>,
    pub arbiter: ArbiterConfig,
    pub agent: AgentConfig,
    pub launch: LaunchConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            rpc_port: -1,
            target_count: 5,
            unit_capability: Capability::new(128, 1),
            priority: 0,
            max_in_flight_requests: 16,
            dashboard_addr: None,
            arbiter: ArbiterConfig::default(),
            agent: AgentConfig::default(),
            launch: LaunchConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(target_count: u32, arbiter_address: impl Into<String>) -> Self {
        Self {
            target_count,
            arbiter: ArbiterConfig {
                address: arbiter_address.into(),
                ..ArbiterConfig::default()
            },
            ..Default::default()
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.unit_capability = capability;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval_ms: u64) -> Self {
        self.arbiter.heartbeat_interval_ms = interval_ms;
        self
    }

    pub fn with_dashboard(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }

    /// Tracking URL registered with the arbiter.
    pub fn tracking_url(&self) -> Option<String> {
        self.dashboard_addr
            .map(|addr| format!("http://{}:{}/api/job", self.hostname, addr.port()))
    }
}
