//! End-to-end coordinator tests.
//!
//! Most tests run the coordinator against a fake arbiter and agent served
//! over gRPC on an ephemeral port; a few use the in-memory transports to
//! control timing.


use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use appmaster_lite::config::CoordinatorConfig;
use appmaster_lite::coordinator::Coordinator;
use appmaster_lite::error::CoordinatorError;
use appmaster_lite::proto;
use appmaster_lite::slot::{Capability, FinalStatus};
use appmaster_lite::tracker::{JobReport, StopReason};
use test_harness::{ClusterState, RecordingAgent, RecordingArbiter, TestCluster};

const JOB_TIMEOUT: Duration = Duration::from_secs(10);

async fn run_job(config: CoordinatorConfig) -> Result<JobReport, CoordinatorError> {
    let coordinator = Coordinator::connect(config).await?;
    tokio::time::timeout(JOB_TIMEOUT, coordinator.run(CancellationToken::new()))
        .await
        .expect("job did not finish in time")
}

#[tokio::test]
async fn test_job_runs_to_success_over_grpc() {
    let cluster = TestCluster::start(ClusterState::default()).await;

    let report = run_job(cluster.coordinator_config(4)).await.unwrap();
    assert_eq!(report.status, FinalStatus::Succeeded);
    assert_eq!(report.processed, 4);
    assert!(report.unregistered);

    let (registrations, unregistrations, started, asks) = cluster
        .state(|s| {
            (
                s.registrations.clone(),
                s.unregistrations.clone(),
                s.started.len(),
                s.asks_received,
            )
        })
        .await;
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].rpc_port, -1);
    assert!(registrations[0].tracking_url.is_empty());
    assert_eq!(asks, 4);
    assert_eq!(started, 4);
    assert_eq!(unregistrations.len(), 1);
    assert_eq!(
        unregistrations[0].final_status(),
        proto::FinalStatus::Succeeded
    );
}

#[tokio::test]
async fn test_failed_unit_fails_the_job_over_grpc() {
    let cluster = TestCluster::start(ClusterState {
        failing_units: HashSet::from([1]),
        ..ClusterState::default()
    })
    .await;

    let report = run_job(cluster.coordinator_config(3)).await.unwrap();
    assert_eq!(report.status, FinalStatus::Failed);
    assert_eq!(report.failed, 1);

    let unregistrations = cluster.state(|s| s.unregistrations.clone()).await;
    assert_eq!(unregistrations.len(), 1);
    assert_eq!(unregistrations[0].final_status(), proto::FinalStatus::Failed);
    assert!(unregistrations[0].diagnostics.contains("work unit crashed"));
}

#[tokio::test]
async fn test_grants_spread_over_heartbeats() {
    let cluster = TestCluster::start(ClusterState {
        grant_batch: 1,
        ..ClusterState::default()
    })
    .await;

    let report = run_job(cluster.coordinator_config(3)).await.unwrap();
    assert_eq!(report.status, FinalStatus::Succeeded);
    assert_eq!(report.granted, 3);
}

#[tokio::test]
async fn test_arbiter_shutdown_request_skips_unregister() {
    let cluster = TestCluster::start(ClusterState {
        shutdown_requested: true,
        ..ClusterState::default()
    })
    .await;

    let report = run_job(cluster.coordinator_config(3)).await.unwrap();
    assert_eq!(report.status, FinalStatus::Failed);
    assert_eq!(report.reason, StopReason::ShutdownRequested);
    assert!(!report.unregistered);

    let unregistrations = cluster.state(|s| s.unregistrations.clone()).await;
    assert!(unregistrations.is_empty());
}

#[tokio::test]
async fn test_launch_context_reaches_agents() {
    let cluster = TestCluster::start(ClusterState::default()).await;

    let mut config = cluster.coordinator_config(1);
    config.launch.search_path = vec!["lib/app.jar".to_string()];
    config
        .launch
        .environment
        .insert("JOB_NAME".to_string(), "nightly".to_string());
    run_job(config).await.unwrap();

    let started = cluster.state(|s| s.started.clone()).await;
    assert_eq!(started.len(), 1);

    let context = started[0].launch_context.clone().unwrap();
    assert_eq!(context.commands.len(), 1);
    assert!(context.commands[0].starts_with("ping -c100 localhost"));
    assert!(context.commands[0].ends_with("2><LOG_DIR>/stderr"));
    assert_eq!(context.environment["CLASSPATH"], "./*:lib/app.jar");
    assert_eq!(context.environment["LANG"], "en_US.UTF-8");
    assert_eq!(context.environment["JOB_NAME"], "nightly");
}

#[tokio::test]
async fn test_tracking_url_is_registered() {
    let cluster = TestCluster::start(ClusterState::default()).await;

    // Reserve a free port for the tracking endpoint
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let config = cluster.coordinator_config(1).with_dashboard(addr);

    run_job(config).await.unwrap();

    let registrations = cluster.state(|s| s.registrations.clone()).await;
    assert_eq!(
        registrations[0].tracking_url,
        format!("http://localhost:{}/api/job", port)
    );
}

#[tokio::test]
async fn test_empty_job_succeeds_without_asks() {
    let cluster = TestCluster::start(ClusterState::default()).await;

    let report = run_job(cluster.coordinator_config(0)).await.unwrap();
    assert_eq!(report.status, FinalStatus::Succeeded);

    let (asks, unregistrations) = cluster
        .state(|s| (s.asks_received, s.unregistrations.len()))
        .await;
    assert_eq!(asks, 0);
    assert_eq!(unregistrations, 1);
}

#[tokio::test]
async fn test_connect_fails_without_arbiter() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = CoordinatorConfig::new(1, format!("http://127.0.0.1:{}", port));
    config.arbiter.rpc_timeout_ms = 500;

    let result = Coordinator::connect(config).await;
    assert!(matches!(result, Err(CoordinatorError::TransportError(_))));
}

#[tokio::test]
async fn test_registration_failure_is_returned() {
    let arbiter = Arc::new(RecordingArbiter::default());
    arbiter.fail_register.store(true, Ordering::SeqCst);
    let agent = Arc::new(RecordingAgent::default());

    let coordinator = Coordinator::new(CoordinatorConfig::default(), arbiter.clone(), agent);
    let err = coordinator
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Registration(_)), "{:?}", err);
    assert!(arbiter.unregistrations().await.is_empty());
}

#[tokio::test]
async fn test_shutdown_signal_kills_the_job() {
    // The recording arbiter never grants, so the job only ends when killed
    let arbiter = Arc::new(RecordingArbiter::default());
    let agent = Arc::new(RecordingAgent::default());
    let config = CoordinatorConfig::new(3, "unused").with_heartbeat_interval(10);

    let shutdown = CancellationToken::new();
    let coordinator = Coordinator::new(config, arbiter.clone(), agent);
    let job = tokio::spawn(coordinator.run(shutdown.clone()));

    let recorded = arbiter.clone();
    test_harness::assert_eventually(
        || {
            let recorded = recorded.clone();
            async move { recorded.asks().await.len() == 3 }
        },
        Duration::from_secs(2),
        "asks should reach the arbiter",
    )
    .await;
    shutdown.cancel();

    let report = tokio::time::timeout(JOB_TIMEOUT, job)
        .await
        .expect("job did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(report.status, FinalStatus::Killed);
    assert_eq!(report.reason, StopReason::Killed);

    let unregistrations = arbiter.unregistrations().await;
    assert_eq!(unregistrations.len(), 1);
    assert_eq!(unregistrations[0].0, FinalStatus::Killed);
}

#[tokio::test]
async fn test_oversized_capability_is_capped_before_asking() {
    let arbiter = Arc::new(RecordingArbiter::new(Capability::new(256, 1)));
    let agent = Arc::new(RecordingAgent::default());
    let config = CoordinatorConfig::new(2, "unused")
        .with_capability(Capability::new(1024, 4))
        .with_heartbeat_interval(10);

    let shutdown = CancellationToken::new();
    let coordinator = Coordinator::new(config, arbiter.clone(), agent);
    let job = tokio::spawn(coordinator.run(shutdown.clone()));

    let recorded = arbiter.clone();
    test_harness::assert_eventually(
        || {
            let recorded = recorded.clone();
            async move { recorded.asks().await.len() == 2 }
        },
        Duration::from_secs(2),
        "asks should reach the arbiter",
    )
    .await;
    shutdown.cancel();
    job.await.unwrap().unwrap();

    for ask in arbiter.asks().await {
        assert_eq!(ask.capability, Capability::new(256, 1));
    }
}
