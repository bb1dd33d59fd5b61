use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::tracker::{AllocationTracker, JobReport, JobSnapshot, TrackerPhase};

#[derive(Clone)]
pub struct DashboardState {
    pub attempt_id: Uuid,
    pub tracker: Arc<AllocationTracker>,
}

#[derive(Serialize)]
struct JobStatusResponse {
    attempt_id: String,
    phase: TrackerPhase,
    progress: f32,
    #[serde(flatten)]
    counters: JobSnapshot,
    report: Option<JobReport>,
}

#[derive(Serialize)]
struct SlotResponse {
    id: String,
    node_address: String,
    memory_mb: u64,
    vcores: u32,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    phase: TrackerPhase,
}

/// Routes served on the tracking address.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/job", get(job_status_handler))
        .route("/api/slots", get(list_slots_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting tracking endpoint");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind tracking endpoint");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Tracking endpoint failed");
    }
}

async fn job_status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let job = state.tracker.state();

    Json(JobStatusResponse {
        attempt_id: state.attempt_id.to_string(),
        phase: state.tracker.phase(),
        progress: job.progress(),
        counters: job.snapshot(),
        report: state.tracker.report().await,
    })
}

async fn list_slots_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let slots: Vec<SlotResponse> = state
        .tracker
        .live_slots()
        .await
        .into_iter()
        .map(|slot| SlotResponse {
            id: slot.id.to_string(),
            node_address: slot.node_address,
            memory_mb: slot.capability.memory_mb,
            vcores: slot.capability.vcores,
        })
        .collect();

    Json(slots)
}

async fn health_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        phase: state.tracker.phase(),
    })
}
