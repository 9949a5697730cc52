// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the broker.

pub mod auth;
pub mod health;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::BrokerState;

/// Build the axum `Router` with every bridge/consumer/observability route.
pub fn build_router(state: Arc<BrokerState>) -> Router {
    Router::new()
        // Health and metrics (no auth / bearer-auth'd respectively)
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/metrics", get(health::metrics))
        // WebSocket (bridges and consumers share one upgrade path)
        .route("/ws", get(ws::ws_handler))
        // HTTP bridge endpoints
        .route("/bridge/connect", post(http::connect))
        .route("/bridge/hello", post(http::hello))
        .route("/bridge/events", post(http::events))
        .route("/bridge/control/result", post(http::control_result))
        .route("/bridge/control/request", post(http::control_request))
        .route("/bridge/control/poll", post(http::control_poll))
        .route("/bridge/heartbeat", post(http::heartbeat))
        .route("/bridge/disconnect", post(http::disconnect))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
