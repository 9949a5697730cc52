// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness and metrics endpoints: `GET /api/v1/health` (no auth) and
//! `GET /api/v1/metrics` (bearer-auth'd), per §4.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::BrokerState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub sessions: SessionCounts,
}

#[derive(Debug, Serialize)]
pub struct SessionCounts {
    pub bridges: usize,
    pub consumers: usize,
}

/// `GET /api/v1/health` — ambient liveness probe, exempt from auth.
pub async fn health(State(state): State<Arc<BrokerState>>) -> impl IntoResponse {
    let (bridges, consumers) = state.registry.counts().await;
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        sessions: SessionCounts { bridges, consumers },
    })
}

/// `GET /api/v1/metrics` — per-gate counters for dashboards, not durable.
pub async fn metrics(State(state): State<Arc<BrokerState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
