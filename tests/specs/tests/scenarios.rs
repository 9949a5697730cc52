// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario tests that spawn the real `auroraxd` binary, per
//! the six concrete scenarios.

use std::time::Duration;

use auroraxd_protocol::messages::{Frame, InboundFrame};
use auroraxd_protocol::Role;
use auroraxd_specs::{ws, AuroraxdProcess};

const TIMEOUT: Duration = Duration::from_secs(10);

fn console_event(level: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"type": "console", "level": level, "message": message})
}

#[tokio::test]
async fn scenario_1_level_hierarchy() -> anyhow::Result<()> {
    let host = AuroraxdProcess::start()?;
    host.wait_healthy(TIMEOUT).await?;
    let secret = host.secret().await?;

    let mut bridge = ws::connect_authed(&host.ws_url(), &secret, Role::Bridge).await?;

    let mut consumer_a = ws::connect_authed(&host.ws_url(), &secret, Role::Consumer).await?;
    let mut consumer_b = ws::connect_authed(&host.ws_url(), &secret, Role::Consumer).await?;
    ws::send(
        &mut consumer_b,
        Frame::Subscribe { levels: vec!["warn".into(), "info".into()], capabilities: vec![], llm_filter: None }
            .into(),
    )
    .await?;
    let mut consumer_c = ws::connect_authed(&host.ws_url(), &secret, Role::Consumer).await?;
    ws::send(
        &mut consumer_c,
        Frame::Subscribe { levels: vec!["trace".into()], capabilities: vec![], llm_filter: None }.into(),
    )
    .await?;

    // Give subscribe acks a moment to land before the bridge emits.
    assert!(matches!(
        ws::recv_within(&mut consumer_b, TIMEOUT).await?,
        InboundFrame::Control(Frame::SubscribeAck { .. })
    ));
    assert!(matches!(
        ws::recv_within(&mut consumer_c, TIMEOUT).await?,
        InboundFrame::Control(Frame::SubscribeAck { .. })
    ));

    for level in ["error", "warn", "info", "debug"] {
        ws::send(&mut bridge, serde_json::from_value::<auroraxd_protocol::Event>(console_event(level, level))?.into())
            .await?;
    }

    let count_events = |conn: &mut ws::WsConn| async move {
        let mut n = 0;
        loop {
            match tokio::time::timeout(Duration::from_millis(500), ws::recv(conn)).await {
                Ok(Ok(InboundFrame::Event(_))) => n += 1,
                _ => return n,
            }
        }
    };

    assert_eq!(count_events(&mut consumer_a).await, 1);
    assert_eq!(count_events(&mut consumer_b).await, 3);
    assert_eq!(count_events(&mut consumer_c).await, 4);

    Ok(())
}

#[tokio::test]
async fn scenario_2_capability_gating() -> anyhow::Result<()> {
    let host = AuroraxdProcess::start()?;
    host.wait_healthy(TIMEOUT).await?;
    let secret = host.secret().await?;

    let mut bridge = ws::connect_authed(&host.ws_url(), &secret, Role::Bridge).await?;
    ws::send(
        &mut bridge,
        Frame::Hello {
            capabilities: vec!["screenshot".into()],
            platform: "test".into(),
            project_id: None,
            route: None,
            url: None,
            protocol: auroraxd_protocol::constants::PROTOCOL_VERSION,
        }
        .into(),
    )
    .await?;

    let mut consumer = ws::connect_authed(&host.ws_url(), &secret, Role::Consumer).await?;
    ws::send(
        &mut consumer,
        Frame::Subscribe {
            levels: vec!["info".into()],
            capabilities: vec!["screenshot".into()],
            llm_filter: None,
        }
        .into(),
    )
    .await?;
    assert!(matches!(
        ws::recv_within(&mut consumer, TIMEOUT).await?,
        InboundFrame::Control(Frame::SubscribeAck { .. })
    ));

    let screenshot = serde_json::json!({
        "type": "screenshot", "level": "info", "mime": "image/png", "data": "aGVsbG8="
    });
    ws::send(&mut bridge, serde_json::from_value::<auroraxd_protocol::Event>(screenshot)?.into()).await?;

    match ws::recv_within(&mut consumer, TIMEOUT).await? {
        InboundFrame::Event(e) => {
            assert_eq!(e.event_type, "screenshot");
            assert_eq!(e.mime.as_deref(), Some("image/png"));
            assert_eq!(e.data.as_deref(), Some("aGVsbG8="));
        }
        other => anyhow::bail!("expected screenshot event, got {other:?}"),
    }

    ws::send(&mut bridge, serde_json::from_value::<auroraxd_protocol::Event>(console_event("info", "nav"))?.into())
        .await?;
    ws::send(
        &mut bridge,
        serde_json::from_value::<auroraxd_protocol::Event>(serde_json::json!({"type": "pageview", "level": "info"}))?
            .into(),
    )
    .await?;
    // The pageview never arrives; the plain console event does, proving the
    // stream is alive and the gate — not a dead connection — blocked it.
    match ws::recv_within(&mut consumer, TIMEOUT).await? {
        InboundFrame::Event(e) => assert_eq!(e.event_type, "console"),
        other => anyhow::bail!("expected console event, got {other:?}"),
    }
    assert!(tokio::time::timeout(Duration::from_millis(300), ws::recv(&mut consumer)).await.is_err());

    Ok(())
}

#[tokio::test]
async fn scenario_3_control_round_trip() -> anyhow::Result<()> {
    let host = AuroraxdProcess::start()?;
    host.wait_healthy(TIMEOUT).await?;
    let secret = host.secret().await?;

    let mut bridge = ws::connect_authed(&host.ws_url(), &secret, Role::Bridge).await?;
    ws::send(
        &mut bridge,
        Frame::Hello {
            capabilities: vec!["control".into()],
            platform: "test".into(),
            project_id: None,
            route: None,
            url: None,
            protocol: auroraxd_protocol::constants::PROTOCOL_VERSION,
        }
        .into(),
    )
    .await?;

    let mut consumer = ws::connect_authed(&host.ws_url(), &secret, Role::Consumer).await?;

    ws::send(
        &mut consumer,
        Frame::ControlRequest {
            id: "req-1".into(),
            action: "ping".into(),
            args: None,
            code: None,
            expect_result: None,
            timeout_ms: None,
        }
        .into(),
    )
    .await?;

    match ws::recv_within(&mut consumer, TIMEOUT).await? {
        InboundFrame::Control(Frame::ControlForwarded { id, delivered }) => {
            assert_eq!(id, "req-1");
            assert_eq!(delivered, 1);
        }
        other => anyhow::bail!("expected control_forwarded, got {other:?}"),
    }

    match ws::recv_within(&mut bridge, TIMEOUT).await? {
        InboundFrame::Control(Frame::ControlRequest { id, action, .. }) => {
            assert_eq!(id, "req-1");
            assert_eq!(action, "ping");
            ws::send(
                &mut bridge,
                Frame::ControlResult {
                    id: "req-1".into(),
                    ok: true,
                    result: Some(serde_json::Value::from("pong")),
                    error: None,
                }
                .into(),
            )
            .await?;
        }
        other => anyhow::bail!("expected control_request at bridge, got {other:?}"),
    }

    match ws::recv_within(&mut consumer, TIMEOUT).await? {
        InboundFrame::Control(Frame::ControlResult { id, ok, result, .. }) => {
            assert_eq!(id, "req-1");
            assert!(ok);
            assert_eq!(result, Some(serde_json::Value::from("pong")));
        }
        other => anyhow::bail!("expected control_result, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn scenario_6_singleton_lock() -> anyhow::Result<()> {
    let host_a = AuroraxdProcess::start()?;
    host_a.wait_healthy(TIMEOUT).await?;
    let workspace = host_a.workspace().to_path_buf();

    // B targets A's own workspace and must lose: A holds a live, fresh lock.
    let (mut second, _port) = auroraxd_specs::spawn_against(&workspace, None)?;
    let status = tokio::task::spawn_blocking(move || second.wait()).await??;
    assert!(!status.success(), "second host against a live lock should exit non-zero");
    host_a.wait_healthy(Duration::from_secs(1)).await?;

    // Corrupt the lock to name a pid that cannot be alive, simulating a
    // crashed host; a fresh host should reclaim it without waiting on A.
    let lock_path = workspace.join(auroraxd_protocol::LOCK_FILE_PATH);
    let dead_lock = auroraxd_protocol::WorkspaceLock {
        pid: 999_999_999,
        started_at: chrono::Utc::now() - chrono::Duration::seconds(60),
        workspace_path: workspace.clone(),
    };
    std::fs::write(&lock_path, serde_json::to_vec(&dead_lock)?)?;

    let (mut host_c, port_c) = auroraxd_specs::spawn_against(&workspace, Some(100))?;
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port_c}/api/v1/health");
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            let _ = host_c.kill();
            anyhow::bail!("host C never became healthy despite a stale lock");
        }
        if let Some(status) = host_c.try_wait()? {
            anyhow::bail!("host C exited early with {status}");
        }
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let _ = host_c.kill();
    let _ = host_c.wait();
    Ok(())
}
