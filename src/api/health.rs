//! Health check and statistics endpoints.

use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::health::ProbeStatus;
use crate::pool::PoolStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub pools: HashMap<String, ProbeStatus>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub pools: HashMap<String, PoolStats>,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let pools = state.lanes.health().check_all().await;
    let healthy = pools.values().all(|probe| probe.healthy);

    let (status, code) = if healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            pools,
        }),
    )
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let pools = state
        .lanes
        .initialized()
        .iter()
        .map(|pool| (pool.name().to_string(), pool.stats()))
        .collect();

    Json(StatsResponse { pools })
}
