// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP bridge endpoints: a polling adapter for bridges that cannot open a
//! WebSocket, preserving the same session/filter semantics as §4.3-§4.4.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use auroraxd_protocol::messages::Frame;
use auroraxd_protocol::{Capability, Event};

use crate::control::{route_control_request, ControlRequest};
use crate::error::BrokerError;
use crate::filter::route_event;
use crate::http_bridge::{new_http_bridge_session, HttpBridgeHandle};
use crate::state::{BrokerState, ConsumerSubscription, SessionKind};
use crate::transport::auth::validate_secret;
use crate::transport::ws::handle_screenshot;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub session_id: String,
}

/// `POST /bridge/connect {secret}` — authenticate and mint a session id.
pub async fn connect(
    State(state): State<Arc<BrokerState>>,
    Json(req): Json<ConnectRequest>,
) -> Result<impl IntoResponse, BrokerError> {
    if req.secret != state.secret {
        return Err(BrokerError::Unauthorized("invalid secret".into()));
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let handle = Arc::new(HttpBridgeHandle::new());
    let session = new_http_bridge_session(session_id.clone(), handle.queue.clone());
    state.registry.insert(Arc::new(session)).await;
    state.http_bridges.write().await.insert(session_id.clone(), handle);

    Ok(Json(ConnectResponse { session_id }))
}

#[derive(Debug, Deserialize)]
pub struct HelloRequest {
    pub session_id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub protocol: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HelloResponse {
    pub ok: bool,
    pub client_id: String,
}

/// `POST /bridge/hello {sessionId, capabilities, platform, projectId?, route?, url?, protocol?}`.
pub async fn hello(
    State(state): State<Arc<BrokerState>>,
    Json(req): Json<HelloRequest>,
) -> Result<impl IntoResponse, BrokerError> {
    let session = session_for(&state, &req.session_id).await?;
    let SessionKind::Bridge(adv) = &session.kind else {
        return Err(BrokerError::BadRequest("session is not a bridge".into()));
    };
    let parsed: Vec<Capability> = req.capabilities.iter().filter_map(|c| Capability::parse(c)).collect();
    adv.record_hello(parsed).await;
    touch(&state, &req.session_id).await;

    Ok(Json(HelloResponse { ok: true, client_id: req.session_id }))
}

#[derive(Debug, Deserialize)]
pub struct EventsRequest {
    pub session_id: String,
    pub events: Vec<Event>,
}

/// `POST /bridge/events {sessionId, events:[…]}` — fan each event through
/// the same §4.4 engine the WS path uses, after applying defaults.
pub async fn events(
    State(state): State<Arc<BrokerState>>,
    Json(req): Json<EventsRequest>,
) -> Result<StatusCode, BrokerError> {
    let session = session_for(&state, &req.session_id).await?;
    let SessionKind::Bridge(adv) = &session.kind else {
        return Err(BrokerError::BadRequest("session is not a bridge".into()));
    };
    touch(&state, &req.session_id).await;

    for mut event in req.events {
        event.apply_defaults("unknown");

        // Screenshots carry their own rate-limit/capability/payload gate
        // (§4.4), which replies with a `rate_limit_notice` rather than
        // silently dropping — route them through the same gate the WS path
        // uses instead of straight through `route_event`.
        if event.event_type.eq_ignore_ascii_case("screenshot") {
            handle_screenshot(&state, &session, adv, event).await;
            continue;
        }

        let bridge_snapshot = adv.snapshot().await;
        let consumers = state.registry.consumers().await;
        let mut snapshot = Vec::with_capacity(consumers.len());
        for consumer in consumers {
            if let SessionKind::Consumer(sub) = &consumer.kind {
                snapshot.push((consumer.clone(), sub.read().await.clone()));
            }
        }
        let saturated = state.overload.touch().await;
        let delivered = route_event(&event, &bridge_snapshot, &snapshot, saturated);
        state.metrics.inc_routed();
        if delivered == 0 {
            state.metrics.inc_dropped_level();
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ControlResultRequest {
    pub session_id: String,
    pub id: String,
    pub ok: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<auroraxd_protocol::messages::ControlError>,
}

/// `POST /bridge/control/result {sessionId, id, ok, result?, error?}` —
/// behaves identically to the WS `control_result` frame.
pub async fn control_result(
    State(state): State<Arc<BrokerState>>,
    Json(req): Json<ControlResultRequest>,
) -> Result<StatusCode, BrokerError> {
    session_for(&state, &req.session_id).await?;
    touch(&state, &req.session_id).await;

    crate::control::route_control_result(
        &state,
        Frame::ControlResult { id: req.id, ok: req.ok, result: req.result, error: req.error },
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ControlRequestBody {
    pub session_id: String,
    pub action: String,
    #[serde(default)]
    pub args: Option<Value>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub expect_result: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// `POST /bridge/control/request {sessionId, action, args?, code?, expectResult?, timeoutMs?}`
/// — the HTTP-side counterpart allowing an HTTP bridge to address a consumer,
/// mirrored from the WS `control_request` handling in §4.5.
pub async fn control_request(
    State(state): State<Arc<BrokerState>>,
    Json(req): Json<ControlRequestBody>,
) -> Result<Json<Frame>, BrokerError> {
    let session = session_for(&state, &req.session_id).await?;
    touch(&state, &req.session_id).await;

    let id = format!("{}-{}", req.session_id, crate::state::epoch_ms());
    let reply = route_control_request(
        &state,
        &session,
        ControlRequest {
            id,
            action: req.action,
            args: req.args,
            code: req.code,
            expect_result: req.expect_result,
            timeout_ms: req.timeout_ms,
        },
    )
    .await;
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
pub struct PollRequest {
    pub session_id: String,
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub commands: Vec<Value>,
}

/// `POST /bridge/control/poll {sessionId, waitMs?}` — drains the ordered
/// control queue accumulated for this session, short-polling up to `waitMs`
/// if it is empty.
pub async fn control_poll(
    State(state): State<Arc<BrokerState>>,
    Json(req): Json<PollRequest>,
) -> Result<impl IntoResponse, BrokerError> {
    let handle = http_handle_for(&state, &req.session_id).await?;
    touch(&state, &req.session_id).await;

    let wait = std::time::Duration::from_millis(req.wait_ms.unwrap_or(0).min(10_000));
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let mut queue = handle.queue.lock().await;
        if !queue.is_empty() {
            let commands: Vec<Value> = queue.drain(..).collect();
            return Ok(Json(PollResponse { commands }));
        }
        drop(queue);
        if wait.is_zero() || tokio::time::Instant::now() >= deadline {
            return Ok(Json(PollResponse { commands: Vec::new() }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub session_id: String,
}

/// `POST /bridge/heartbeat {sessionId}` — refreshes `lastSeen`.
pub async fn heartbeat(
    State(state): State<Arc<BrokerState>>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<StatusCode, BrokerError> {
    touch(&state, &req.session_id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct DisconnectRequest {
    pub session_id: String,
}

/// `POST /bridge/disconnect {sessionId}` — tears the session down like a WS close.
pub async fn disconnect(
    State(state): State<Arc<BrokerState>>,
    Json(req): Json<DisconnectRequest>,
) -> Result<StatusCode, BrokerError> {
    state.http_bridges.write().await.remove(&req.session_id);
    state.registry.remove(&req.session_id).await;
    state.pending.drop_for_session(&req.session_id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn session_for(
    state: &Arc<BrokerState>,
    session_id: &str,
) -> Result<Arc<crate::state::Session>, BrokerError> {
    state
        .registry
        .get(session_id)
        .await
        .ok_or_else(|| BrokerError::SessionNotFound(session_id.to_owned()))
}

async fn http_handle_for(
    state: &Arc<BrokerState>,
    session_id: &str,
) -> Result<Arc<HttpBridgeHandle>, BrokerError> {
    state
        .http_bridges
        .read()
        .await
        .get(session_id)
        .cloned()
        .ok_or_else(|| BrokerError::SessionNotFound(session_id.to_owned()))
}

async fn touch(state: &Arc<BrokerState>, session_id: &str) {
    if let Some(handle) = state.http_bridges.read().await.get(session_id) {
        handle.touch().await;
    }
}
