// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket session handling: the `auth -> {hello|subscribe} -> steady state`
//! state machine from §4.3, and the event/control dispatch that follows it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use auroraxd_protocol::close_codes;
use auroraxd_protocol::messages::{rate_limit_notice, Frame, InboundFrame, OutboundFrame, RateLimitReason};
use auroraxd_protocol::{Capability, Level, LlmFilter, Role};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::control::{route_control_request, route_control_result, ControlRequest};
use crate::filter::route_event;
use crate::state::{
    BridgeAdvertised, BrokerState, ConsumerSubscription, Outbound, Session, SessionKind,
};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BrokerState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<BrokerState>) {
    let (mut sink, mut stream) = socket.split();

    let first = match tokio::time::timeout(state.config.auth_timeout(), stream.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        _ => {
            close_with(&mut sink, close_codes::POLICY_VIOLATION, "Authentication timeout").await;
            return;
        }
    };

    let (client_id, role) = match auroraxd_protocol::decode_inbound(&first) {
        Ok(InboundFrame::Control(Frame::Auth { secret, role, client_id })) => {
            if secret != state.secret {
                close_with(&mut sink, close_codes::POLICY_VIOLATION, "Invalid secret").await;
                return;
            }
            let client_id = client_id.unwrap_or_else(|| {
                format!("{}-{}", state.client_counter.fetch_add(1, Ordering::Relaxed), next_suffix())
            });
            (client_id, role)
        }
        _ => {
            close_with(&mut sink, close_codes::POLICY_VIOLATION, "Authentication required").await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let kind = match role {
        Role::Bridge => SessionKind::Bridge(BridgeAdvertised::default()),
        Role::Consumer => SessionKind::Consumer(RwLock::new(ConsumerSubscription::default())),
    };
    let cancel = CancellationToken::new();
    let session = Arc::new(Session {
        client_id: client_id.clone(),
        kind,
        outbound: Outbound::Ws(tx),
        cancel: cancel.clone(),
    });
    state.registry.insert(session.clone()).await;

    let ack = OutboundFrame::Control(Frame::AuthSuccess { role, client_id: client_id.clone() });
    if send_frame(&mut sink, &ack).await.is_err() {
        teardown(&state, &client_id).await;
        return;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            outgoing = rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        if send_frame(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound_text(&state, &session, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    teardown(&state, &client_id).await;
}

fn next_suffix() -> u64 {
    crate::state::epoch_ms()
}

async fn teardown(state: &Arc<BrokerState>, client_id: &str) {
    state.registry.remove(client_id).await;
    state.pending.drop_for_session(client_id).await;
}

async fn send_frame(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &OutboundFrame,
) -> Result<(), axum::Error> {
    let text = match auroraxd_protocol::encode_outbound(frame) {
        Ok(t) => t,
        Err(err) => {
            warn!(error = %err, "failed to encode outbound frame");
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await
}

async fn close_with(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame { code, reason: reason.to_owned().into() })))
        .await;
}

/// Decode and dispatch one inbound text frame for an already-authenticated
/// session. Malformed frames are logged once at `debug` and otherwise
/// ignored, per §7 ("no connection is torn down for one bad frame other
/// than during the authentication phase").
async fn handle_inbound_text(state: &Arc<BrokerState>, session: &Arc<Session>, text: &str) {
    let decoded = match auroraxd_protocol::decode_inbound(text) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(error = %err, client_id = %session.client_id, "ignoring malformed frame");
            return;
        }
    };

    match decoded {
        InboundFrame::Control(frame) => handle_control_frame(state, session, frame).await,
        InboundFrame::Event(event) => handle_event(state, session, event).await,
    }
}

async fn handle_control_frame(state: &Arc<BrokerState>, session: &Arc<Session>, frame: Frame) {
    match frame {
        Frame::Hello { capabilities, protocol, .. } => {
            if let SessionKind::Bridge(adv) = &session.kind {
                let parsed: Vec<Capability> = capabilities.iter().filter_map(|c| Capability::parse(c)).collect();
                adv.record_hello(parsed).await;
                session.outbound.send_frame(OutboundFrame::Control(Frame::HelloAck {
                    client_id: session.client_id.clone(),
                    protocol,
                }));
            }
        }
        Frame::Subscribe { levels, capabilities, llm_filter } => {
            if let SessionKind::Consumer(sub) = &session.kind {
                let parsed_levels: Vec<Level> = levels.iter().filter_map(|l| Level::parse(l)).collect();
                let parsed_caps: Vec<Capability> =
                    capabilities.iter().filter_map(|c| Capability::parse(c)).collect();
                let filter = llm_filter.as_deref().map(LlmFilter::parse).unwrap_or_default();
                let mut guard = sub.write().await;
                guard.levels = if parsed_levels.is_empty() { vec![Level::Errors] } else { parsed_levels };
                guard.capabilities = parsed_caps;
                guard.llm_filter = filter;
                let ack = Frame::SubscribeAck {
                    client_id: session.client_id.clone(),
                    levels: guard.levels.iter().map(level_name).collect(),
                    capabilities: guard.capabilities.iter().map(capability_name).collect(),
                    llm_filter: filter_name(guard.llm_filter),
                };
                drop(guard);
                session.outbound.send_frame(OutboundFrame::Control(ack));
            }
        }
        Frame::Ping {} => {
            session.outbound.send_frame(OutboundFrame::Control(Frame::Pong {}));
        }
        Frame::Pong {} => {}
        Frame::ControlRequest { id, action, args, code, expect_result, timeout_ms } => {
            let reply =
                route_control_request(state, session, ControlRequest { id, action, args, code, expect_result, timeout_ms })
                    .await;
            session.outbound.send_frame(OutboundFrame::Control(reply));
        }
        Frame::ControlResult { .. } => {
            route_control_result(state, frame).await;
        }
        _ => {
            debug!(client_id = %session.client_id, "ignoring unexpected server-directed frame");
        }
    }
}

async fn handle_event(state: &Arc<BrokerState>, session: &Arc<Session>, event: auroraxd_protocol::Event) {
    let SessionKind::Bridge(adv) = &session.kind else {
        debug!(client_id = %session.client_id, "ignoring event from non-bridge session");
        return;
    };

    if event.event_type.eq_ignore_ascii_case("screenshot") {
        handle_screenshot(state, session, adv, event).await;
        return;
    }

    let bridge_snapshot = adv.snapshot().await;
    let saturated = state.overload.touch().await;
    let consumers = state.registry.consumers().await;
    let mut snapshot = Vec::with_capacity(consumers.len());
    for consumer in consumers {
        if let SessionKind::Consumer(sub) = &consumer.kind {
            snapshot.push((consumer.clone(), sub.read().await.clone()));
        }
    }
    let delivered = route_event(&event, &bridge_snapshot, &snapshot, saturated);
    state.metrics.inc_routed();
    if delivered == 0 {
        state.metrics.inc_dropped_level();
    }
}

/// Screenshot gate shared by the WS and HTTP bridge paths alike (§4.4):
/// capability check, payload validation, the per-bridge 2s rate limit, and a
/// `no_consumers` notice when nothing is listening — each failure replies
/// with a `rate_limit_notice` on the originating session's outbound sink
/// (a live WS send, or the HTTP bridge's polled control queue).
pub(crate) async fn handle_screenshot(
    state: &Arc<BrokerState>,
    session: &Arc<Session>,
    adv: &BridgeAdvertised,
    mut event: auroraxd_protocol::Event,
) {
    event.apply_defaults("unknown");
    let bridge_snapshot = adv.snapshot().await;
    if bridge_snapshot.said_hello && !bridge_snapshot.capabilities.contains(&Capability::Screenshot) {
        session.outbound.send_frame(OutboundFrame::Control(rate_limit_notice(
            RateLimitReason::MissingCapability,
            None,
            "bridge did not advertise the screenshot capability",
        )));
        return;
    }
    if !event.has_valid_screenshot_payload() {
        session.outbound.send_frame(OutboundFrame::Control(rate_limit_notice(
            RateLimitReason::InvalidFormat,
            None,
            "screenshot event is missing mime or data",
        )));
        return;
    }

    let rate_limit = state.config.screenshot_rate_limit();
    {
        let last = adv.last_screenshot_at.read().await;
        if let Some(last) = *last {
            let elapsed = last.elapsed();
            if elapsed < rate_limit {
                let retry_after_ms = (rate_limit - elapsed).as_millis() as u64;
                state.metrics.inc_rate_limited();
                session.outbound.send_frame(OutboundFrame::Control(rate_limit_notice(
                    RateLimitReason::RateLimit,
                    Some(retry_after_ms),
                    "screenshot rate limit exceeded",
                )));
                return;
            }
        }
    }

    let consumers = state.registry.consumers().await;
    let mut snapshot = Vec::with_capacity(consumers.len());
    for consumer in consumers {
        if let SessionKind::Consumer(sub) = &consumer.kind {
            snapshot.push((consumer.clone(), sub.read().await.clone()));
        }
    }
    let saturated = state.overload.touch().await;
    let delivered = route_event(&event, &bridge_snapshot, &snapshot, saturated);
    if delivered == 0 {
        session.outbound.send_frame(OutboundFrame::Control(rate_limit_notice(
            RateLimitReason::NoConsumers,
            None,
            "no consumer currently wants the screenshot",
        )));
        return;
    }

    *adv.last_screenshot_at.write().await = Some(Instant::now());
    state.metrics.inc_routed();
}

fn level_name(level: Level) -> String {
    match level {
        Level::Errors => "errors",
        Level::Warn => "warn",
        Level::Info => "info",
        Level::Trace => "trace",
    }
    .to_owned()
}

fn capability_name(cap: Capability) -> String {
    match cap {
        Capability::Error => "error",
        Capability::Console => "console",
        Capability::Pageview => "pageview",
        Capability::Navigation => "navigation",
        Capability::Screenshot => "screenshot",
        Capability::Network => "network",
        Capability::Control => "control",
    }
    .to_owned()
}

fn filter_name(filter: LlmFilter) -> String {
    match filter {
        LlmFilter::Off => "off",
        LlmFilter::Minimal => "minimal",
        LlmFilter::Aggressive => "aggressive",
    }
    .to_owned()
}
