// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control correlator: ships a `control_request` to a valid counterpart and
//! steers the matching `control_result` back to its originator exactly once.

use std::sync::Arc;
use std::time::Instant;

use auroraxd_protocol::event::Event;
use auroraxd_protocol::messages::{control_failure, Frame, OutboundFrame};
use auroraxd_protocol::Capability;
use serde_json::{Map, Value};

use crate::filter::deliver;
use crate::state::{BrokerState, PendingControl, PendingTarget, Session, SessionKind};

/// A `control_request` arriving from either a consumer or a bridge.
pub struct ControlRequest {
    pub id: String,
    pub action: String,
    pub args: Option<Value>,
    pub code: Option<String>,
    pub expect_result: Option<bool>,
    pub timeout_ms: Option<u64>,
}

/// Route one inbound `control_request` to its valid counterparts, recording
/// a pending entry and returning the reply the originator should receive
/// immediately (`control_forwarded` on success, a synthesized `control_result`
/// on zero targets), per §4.5.
pub async fn route_control_request(
    state: &Arc<BrokerState>,
    origin: &Arc<Session>,
    req: ControlRequest,
) -> Frame {
    let origin_is_consumer = origin.is_consumer();
    let targets = if origin_is_consumer {
        let bridges = state.registry.bridges().await;
        let mut out = Vec::new();
        for bridge in bridges {
            if let SessionKind::Bridge(adv) = &bridge.kind {
                if adv.capabilities.read().await.contains(&Capability::Control) {
                    out.push(bridge);
                }
            }
        }
        out
    } else {
        let consumers = state.registry.consumers().await;
        let probe = Event {
            event_type: "control".into(),
            level: "info".into(),
            message: String::new(),
            timestamp: None,
            platform: None,
            project_id: None,
            stack: None,
            url: None,
            route: None,
            mime: None,
            data: None,
            args: None,
            breadcrumbs: None,
            navigation: None,
            network: None,
            extra: Map::new(),
        };
        let bridge_snapshot = match &origin.kind {
            SessionKind::Bridge(adv) => Some(adv.snapshot().await),
            SessionKind::Consumer(_) => None,
        };
        let mut out = Vec::new();
        for consumer in consumers {
            if let SessionKind::Consumer(sub) = &consumer.kind {
                let sub = sub.read().await.clone();
                let saturated = false;
                let passes = match &bridge_snapshot {
                    Some(snap) => deliver(&probe, snap, &sub, saturated),
                    None => sub.capabilities.is_empty() || sub.capabilities.contains(&Capability::Control),
                };
                if passes {
                    out.push(consumer);
                }
            }
        }
        out
    };

    if targets.is_empty() {
        let message = if origin_is_consumer {
            "No bridge with control capability is connected"
        } else {
            "No consumers connected for control"
        };
        return control_failure(req.id, message);
    }

    let delivered = targets.len() as u32;
    let request_frame = Frame::ControlRequest {
        id: req.id.clone(),
        action: req.action,
        args: req.args,
        code: req.code,
        expect_result: req.expect_result,
        timeout_ms: req.timeout_ms,
    };
    for target in &targets {
        target.outbound.send_frame(OutboundFrame::Control(request_frame.clone()));
    }

    let target_kind = if origin_is_consumer { PendingTarget::Bridge } else { PendingTarget::Consumer };
    state
        .pending
        .insert(
            req.id.clone(),
            PendingControl { reply_to: origin.client_id.clone(), target_kind, created_at: Instant::now() },
        )
        .await;
    state.metrics.control_in_flight_delta(1);

    Frame::ControlForwarded { id: req.id, delivered }
}

/// Route an inbound `control_result` back to its originator, if still pending
/// and still connected. Duplicates after the first are silently ignored.
pub async fn route_control_result(state: &Arc<BrokerState>, result: Frame) {
    let Frame::ControlResult { ref id, .. } = result else {
        return;
    };
    let Some(pending) = state.pending.take(id).await else {
        return;
    };
    state.metrics.control_in_flight_delta(-1);
    if let Some(session) = state.registry.get(&pending.reply_to).await {
        session.outbound.send_frame(OutboundFrame::Control(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BridgeAdvertised, ConsumerSubscription, Outbound, SessionKind};
    use std::sync::atomic::AtomicU64;
    use tokio::sync::{mpsc, RwLock};
    use tokio_util::sync::CancellationToken;

    fn make_state() -> Arc<BrokerState> {
        Arc::new(BrokerState::new(
            crate::config::test_config(),
            "secret".into(),
            CancellationToken::new(),
        ))
    }

    fn make_bridge(client_id: &str, caps: &[Capability]) -> (Arc<Session>, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session {
            client_id: client_id.into(),
            kind: SessionKind::Bridge(BridgeAdvertised {
                said_hello: std::sync::atomic::AtomicBool::new(true),
                capabilities: RwLock::new(caps.to_vec()),
                last_screenshot_at: RwLock::new(None),
            }),
            outbound: Outbound::Ws(tx),
            cancel: CancellationToken::new(),
        });
        (session, rx)
    }

    fn make_consumer(
        client_id: &str,
        caps: &[Capability],
    ) -> (Arc<Session>, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session {
            client_id: client_id.into(),
            kind: SessionKind::Consumer(RwLock::new(ConsumerSubscription {
                levels: vec![auroraxd_protocol::Level::Info],
                capabilities: caps.to_vec(),
                llm_filter: auroraxd_protocol::LlmFilter::Off,
            })),
            outbound: Outbound::Ws(tx),
            cancel: CancellationToken::new(),
        });
        (session, rx)
    }

    #[tokio::test]
    async fn scenario_3_control_round_trip() {
        let state = make_state();
        let (bridge, mut bridge_rx) = make_bridge("bridge-1", &[Capability::Control]);
        let (consumer, mut consumer_rx) = make_consumer("consumer-1", &[]);
        state.registry.insert(bridge.clone()).await;
        state.registry.insert(consumer.clone()).await;

        let req = ControlRequest {
            id: "req-1".into(),
            action: "ping".into(),
            args: None,
            code: None,
            expect_result: None,
            timeout_ms: None,
        };
        let reply = route_control_request(&state, &consumer, req).await;
        match reply {
            Frame::ControlForwarded { id, delivered } => {
                assert_eq!(id, "req-1");
                assert_eq!(delivered, 1);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let forwarded = bridge_rx.try_recv().expect("bridge should receive control_request");
        assert!(matches!(forwarded, OutboundFrame::Control(Frame::ControlRequest { .. })));

        let result = Frame::ControlResult { id: "req-1".into(), ok: true, result: Some(Value::from("pong")), error: None };
        route_control_result(&state, result).await;

        let back = consumer_rx.try_recv().expect("consumer should receive control_result");
        match back {
            OutboundFrame::Control(Frame::ControlResult { ok, result, .. }) => {
                assert!(ok);
                assert_eq!(result, Some(Value::from("pong")));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_targets_synthesizes_failure() {
        let state = make_state();
        let (consumer, _rx) = make_consumer("consumer-1", &[]);
        state.registry.insert(consumer.clone()).await;

        let req = ControlRequest {
            id: "req-2".into(),
            action: "ping".into(),
            args: None,
            code: None,
            expect_result: None,
            timeout_ms: None,
        };
        let reply = route_control_request(&state, &consumer, req).await;
        match reply {
            Frame::ControlResult { ok, error, .. } => {
                assert!(!ok);
                assert!(error.unwrap().message.contains("No bridge"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_drops_pending_entry_silently() {
        let state = make_state();
        let (bridge, _bridge_rx) = make_bridge("bridge-1", &[Capability::Control]);
        let (consumer, _consumer_rx) = make_consumer("consumer-1", &[]);
        state.registry.insert(bridge.clone()).await;
        state.registry.insert(consumer.clone()).await;

        let req = ControlRequest {
            id: "req-3".into(),
            action: "ping".into(),
            args: None,
            code: None,
            expect_result: None,
            timeout_ms: None,
        };
        route_control_request(&state, &consumer, req).await;

        state.registry.remove("consumer-1").await;
        state.pending.drop_for_session("consumer-1").await;

        let result = Frame::ControlResult { id: "req-3".into(), ok: true, result: None, error: None };
        route_control_result(&state, result).await;
    }
}
