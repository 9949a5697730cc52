// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary scenario tests.
//!
//! Spawns the real `auroraxd` binary as a subprocess, isolated to a scratch
//! workspace directory, and exercises it over its HTTP and WebSocket
//! surfaces exactly as an external bridge/consumer would.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use auroraxd_protocol::{DiscoveryMetadata, LOCK_FILE_PATH};

/// Resolve the path to the compiled `auroraxd` binary.
pub fn auroraxd_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("auroraxd")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `auroraxd` process, killed on drop. Owns a scratch workspace
/// directory so its lock/discovery files never collide with a real session.
pub struct AuroraxdProcess {
    child: Child,
    port: u16,
    workspace: tempfile::TempDir,
}

/// Builder for configuring how an [`AuroraxdProcess`] is spawned.
#[derive(Default)]
pub struct AuroraxdBuilder {
    secret: Option<String>,
    session_staleness_ms: Option<u64>,
}

impl AuroraxdBuilder {
    /// Pin the shared secret instead of letting the host mint one.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Override the lock/HTTP-session staleness threshold.
    pub fn session_staleness_ms(mut self, ms: u64) -> Self {
        self.session_staleness_ms = Some(ms);
        self
    }

    /// Spawn into a fresh scratch workspace.
    pub fn spawn(self) -> anyhow::Result<AuroraxdProcess> {
        let workspace = tempfile::tempdir()?;
        self.spawn_in(workspace)
    }

    /// Spawn into a caller-supplied workspace (needed to re-launch against
    /// the same lock/discovery files, e.g. the singleton-lock scenario).
    pub fn spawn_in(self, workspace: tempfile::TempDir) -> anyhow::Result<AuroraxdProcess> {
        let binary = auroraxd_binary();
        anyhow::ensure!(binary.exists(), "auroraxd binary not found at {}", binary.display());

        let port = free_port()?;
        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--workspace".into(),
            workspace.path().to_string_lossy().into_owned(),
            "--log-level".into(),
            "warn".into(),
        ];
        if let Some(secret) = &self.secret {
            args.extend(["--secret".into(), secret.clone()]);
        }
        if let Some(ms) = self.session_staleness_ms {
            args.extend(["--session-staleness-ms".into(), ms.to_string()]);
        }

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        Ok(AuroraxdProcess { child, port, workspace })
    }
}

impl AuroraxdProcess {
    pub fn build() -> AuroraxdBuilder {
        AuroraxdBuilder::default()
    }

    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.workspace.path().join(LOCK_FILE_PATH)
    }

    /// Read the discovery file, retrying briefly since it is published
    /// asynchronously right after bind.
    pub async fn discovery(&self) -> anyhow::Result<DiscoveryMetadata> {
        let path = self.workspace.path().join(auroraxd_protocol::DISCOVERY_FILE_PATH);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(bytes) = std::fs::read(&path) {
                if let Ok(meta) = serde_json::from_slice::<DiscoveryMetadata>(&bytes) {
                    return Ok(meta);
                }
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("discovery file never appeared at {}", path.display());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn secret(&self) -> anyhow::Result<String> {
        Ok(self.discovery().await?.secret)
    }

    /// Poll `/api/v1/health` until it answers.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/health", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("auroraxd did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait for the process to exit within `timeout`, returning its status.
    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("auroraxd did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Take ownership of the scratch workspace, detaching it from `self`'s
    /// `Drop` so a subsequent process can reuse the same lock/discovery
    /// files (singleton-lock scenario).
    pub fn into_workspace(self) -> tempfile::TempDir {
        self.workspace
    }
}

impl Drop for AuroraxdProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Spawn a raw `auroraxd` child against an existing workspace path, without
/// taking ownership of it. Used to launch a second host against a workspace
/// another [`AuroraxdProcess`] already occupies.
pub fn spawn_against(workspace: &Path, session_staleness_ms: Option<u64>) -> anyhow::Result<(Child, u16)> {
    let binary = auroraxd_binary();
    let port = free_port()?;
    let mut args: Vec<String> = vec![
        "--host".into(),
        "127.0.0.1".into(),
        "--port".into(),
        port.to_string(),
        "--workspace".into(),
        workspace.to_string_lossy().into_owned(),
        "--log-level".into(),
        "warn".into(),
    ];
    if let Some(ms) = session_staleness_ms {
        args.extend(["--session-staleness-ms".into(), ms.to_string()]);
    }
    let child = Command::new(&binary).args(&args).stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;
    Ok((child, port))
}

/// Minimal WebSocket test client: connects, authenticates with `role`, and
/// exposes raw send/receive of decoded frames.
pub mod ws {
    use auroraxd_protocol::messages::{Frame, InboundFrame, OutboundFrame};
    use auroraxd_protocol::{Role, encode_outbound, decode_inbound};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    pub type WsConn = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    pub async fn connect_authed(url: &str, secret: &str, role: Role) -> anyhow::Result<WsConn> {
        let (mut conn, _) = tokio_tungstenite::connect_async(url).await?;
        send(&mut conn, OutboundFrame::Control(Frame::Auth { secret: secret.into(), role, client_id: None })).await?;
        loop {
            match recv(&mut conn).await? {
                InboundFrame::Control(Frame::AuthSuccess { .. }) => return Ok(conn),
                InboundFrame::Control(Frame::Ping {}) => {
                    send(&mut conn, OutboundFrame::Control(Frame::Pong {})).await?;
                }
                other => anyhow::bail!("expected auth_success, got {other:?}"),
            }
        }
    }

    pub async fn send(conn: &mut WsConn, frame: OutboundFrame) -> anyhow::Result<()> {
        let text = encode_outbound(&frame)?;
        conn.send(Message::Text(text.into())).await?;
        Ok(())
    }

    pub async fn recv(conn: &mut WsConn) -> anyhow::Result<InboundFrame> {
        loop {
            match conn.next().await {
                Some(Ok(Message::Text(text))) => return Ok(decode_inbound(&text)?),
                Some(Ok(_)) => continue,
                Some(Err(err)) => anyhow::bail!("ws read error: {err}"),
                None => anyhow::bail!("ws stream ended"),
            }
        }
    }

    pub async fn recv_within(conn: &mut WsConn, timeout: std::time::Duration) -> anyhow::Result<InboundFrame> {
        tokio::time::timeout(timeout, recv(conn)).await?
    }
}
