use clap::Parser;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use appmaster_lite::config::{AgentConfig, ArbiterConfig, CoordinatorConfig, LaunchConfig};
use appmaster_lite::coordinator::Coordinator;
use appmaster_lite::launch::LocalResource;
use appmaster_lite::shutdown::install_shutdown_handler;
use appmaster_lite::slot::{Capability, FinalStatus};

#[derive(Parser, Debug)]
#[command(name = "appmaster-lite")]
#[command(version)]
#[command(about = "Cluster application coordinator: negotiates slots and runs work units on agents")]
struct Args {
    /// Arbiter address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8030")]
    arbiter: String,

    /// Number of work units to run
    #[arg(long, short = 'n', default_value = "5")]
    count: u32,

    /// Memory per work unit, in MB
    #[arg(long, default_value = "128")]
    memory: u64,

    /// Virtual cores per work unit
    #[arg(long, default_value = "1")]
    vcores: u32,

    /// Slot request priority
    #[arg(long, default_value = "0")]
    priority: i32,

    /// Interval between allocate heartbeats, in milliseconds
    #[arg(long, default_value = "1000")]
    heartbeat_ms: u64,

    /// Per-RPC timeout, in milliseconds
    #[arg(long, default_value = "10000")]
    rpc_timeout_ms: u64,

    /// Host name reported to the arbiter (defaults to this machine's name)
    #[arg(long)]
    hostname: Option<String>,

    /// Port for the tracking endpoint (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Program each work unit runs
    #[arg(long, default_value = "ping")]
    program: String,

    /// Arguments passed to the program
    #[arg(long = "arg", allow_hyphen_values = true, default_values_t = ["-c100".to_string(), "localhost".to_string()])]
    args: Vec<String>,

    /// Append the debug flag to the work unit command line
    #[arg(long)]
    debug: bool,

    /// Extra search path entries (comma-separated)
    #[arg(long, value_delimiter = ',')]
    search_path: Vec<String>,

    /// Locale for work units
    #[arg(long, default_value = "en_US.UTF-8")]
    locale: String,

    /// Extra environment for work units, as KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_key_value)]
    environment: Vec<(String, String)>,

    /// Files to localize before launch, as NAME=URL (repeatable)
    #[arg(long = "resource", value_parser = parse_key_value)]
    resources: Vec<(String, String)>,

    /// File holding credentials passed to agents unchanged
    #[arg(long)]
    tokens_file: Option<PathBuf>,

    /// Leave running containers alone on exit
    #[arg(long)]
    no_cleanup: bool,

    /// Maximum concurrent slot request submissions
    #[arg(long, default_value = "16")]
    max_in_flight: usize,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn build_config(args: Args) -> Result<CoordinatorConfig, Box<dyn std::error::Error>> {
    let dashboard_addr: Option<SocketAddr> = match args.dashboard_port {
        Some(p) => Some(format!("0.0.0.0:{}", p).parse()?),
        None => None,
    };

    let local_resources: BTreeMap<String, LocalResource> = args
        .resources
        .into_iter()
        .map(|(name, url)| (name, LocalResource::file(url)))
        .collect();

    Ok(CoordinatorConfig {
        hostname: args.hostname.unwrap_or_else(default_hostname),
        target_count: args.count,
        unit_capability: Capability::new(args.memory, args.vcores),
        priority: args.priority,
        max_in_flight_requests: args.max_in_flight,
        dashboard_addr,
        arbiter: ArbiterConfig {
            address: args.arbiter,
            heartbeat_interval_ms: args.heartbeat_ms,
            rpc_timeout_ms: args.rpc_timeout_ms,
        },
        agent: AgentConfig {
            rpc_timeout_ms: args.rpc_timeout_ms,
            cleanup_on_stop: !args.no_cleanup,
        },
        launch: LaunchConfig {
            program: args.program,
            args: args.args,
            debug: args.debug,
            search_path: args.search_path,
            locale: args.locale,
            environment: args.environment.into_iter().collect(),
            local_resources,
            tokens_path: args.tokens_file,
        },
        ..CoordinatorConfig::default()
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = build_config(args)?;
    let shutdown = install_shutdown_handler();

    let coordinator = Coordinator::connect(config).await?;
    let report = coordinator.run(shutdown).await?;

    println!("{}: {}", report.status, report.message);
    if report.status != FinalStatus::Succeeded {
        std::process::exit(1);
    }

    Ok(())
}
