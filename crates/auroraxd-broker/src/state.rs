// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared broker state: session registry, pending control map, and the
//! per-bridge rate-limit/overload clocks the filter engine consults.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use auroraxd_protocol::messages::OutboundFrame;
use auroraxd_protocol::{Capability, Level, LlmFilter};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::metrics::Metrics;

pub type ClientId = String;

/// A consumer's active subscription (§3: `subscription: {levels, capabilities, llm_filter}`).
#[derive(Debug, Clone)]
pub struct ConsumerSubscription {
    pub levels: Vec<Level>,
    pub capabilities: Vec<Capability>,
    pub llm_filter: LlmFilter,
}

impl Default for ConsumerSubscription {
    fn default() -> Self {
        Self { levels: vec![Level::Errors], capabilities: Vec::new(), llm_filter: LlmFilter::Off }
    }
}

impl ConsumerSubscription {
    /// Highest subscribed level index, defaulting to `errors` when empty (§4.4.1).
    pub fn highest_index(&self) -> usize {
        self.levels.iter().map(|l| l.index()).max().unwrap_or(Level::Errors.index())
    }

    pub fn allows_capability(&self, cap: Capability) -> bool {
        self.capabilities.is_empty() || self.capabilities.contains(&cap)
    }
}

/// Per-bridge advertised capabilities and rate-limit clock.
///
/// `said_hello`/`capabilities` are updated in place when a `hello` frame
/// arrives, so every outstanding `Arc<Session>` sees the update — there is
/// no registry-entry replacement involved.
pub struct BridgeAdvertised {
    pub said_hello: std::sync::atomic::AtomicBool,
    pub capabilities: RwLock<Vec<Capability>>,
    pub last_screenshot_at: RwLock<Option<Instant>>,
}

impl Default for BridgeAdvertised {
    fn default() -> Self {
        Self {
            said_hello: std::sync::atomic::AtomicBool::new(false),
            capabilities: RwLock::new(Vec::new()),
            last_screenshot_at: RwLock::new(None),
        }
    }
}

impl BridgeAdvertised {
    pub async fn record_hello(&self, capabilities: Vec<Capability>) {
        *self.capabilities.write().await = capabilities;
        self.said_hello.store(true, Ordering::Relaxed);
    }

    /// A point-in-time copy suitable for the CPU-bound, non-suspending
    /// `deliver` predicate (§5).
    pub async fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            said_hello: self.said_hello.load(Ordering::Relaxed),
            capabilities: self.capabilities.read().await.clone(),
        }
    }
}

/// Point-in-time bridge capability snapshot consumed by [`crate::filter::deliver`].
#[derive(Debug, Clone, Default)]
pub struct BridgeSnapshot {
    pub said_hello: bool,
    pub capabilities: Vec<Capability>,
}

/// An outbound delivery sink: either a live WebSocket sender, or an HTTP
/// bridge's polled control queue.
pub enum Outbound {
    Ws(mpsc::UnboundedSender<OutboundFrame>),
    HttpQueue(Arc<Mutex<VecDeque<Value>>>),
}

impl Outbound {
    pub fn send_frame(&self, frame: OutboundFrame) {
        match self {
            Outbound::Ws(tx) => {
                let _ = tx.send(frame);
            }
            Outbound::HttpQueue(queue) => {
                if let Ok(value) = serde_json::to_value(&frame) {
                    if let Ok(mut q) = queue.try_lock() {
                        q.push_back(value);
                    }
                }
            }
        }
    }
}

pub enum SessionKind {
    Bridge(BridgeAdvertised),
    Consumer(RwLock<ConsumerSubscription>),
}

/// A single authenticated connection, WS or HTTP.
pub struct Session {
    pub client_id: ClientId,
    pub kind: SessionKind,
    pub outbound: Outbound,
    pub cancel: CancellationToken,
}

impl Session {
    pub fn is_bridge(&self) -> bool {
        matches!(self.kind, SessionKind::Bridge(_))
    }

    pub fn is_consumer(&self) -> bool {
        matches!(self.kind, SessionKind::Consumer(_))
    }
}

/// Tracks authenticated bridges and consumers. Registration/teardown happens
/// under the write lock so disconnect cannot interleave mid-update (§4.3, §5).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ClientId, Arc<Session>>>,
}

impl SessionRegistry {
    pub async fn insert(&self, session: Arc<Session>) {
        self.sessions.write().await.insert(session.client_id.clone(), session);
    }

    pub async fn remove(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(client_id)
    }

    pub async fn get(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(client_id).cloned()
    }

    pub async fn bridges(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().filter(|s| s.is_bridge()).cloned().collect()
    }

    pub async fn consumers(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().filter(|s| s.is_consumer()).cloned().collect()
    }

    pub async fn counts(&self) -> (usize, usize) {
        let sessions = self.sessions.read().await;
        let bridges = sessions.values().filter(|s| s.is_bridge()).count();
        let consumers = sessions.values().filter(|s| s.is_consumer()).count();
        (bridges, consumers)
    }
}

/// Where a pending `control_request` should route its `control_result` (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTarget {
    Bridge,
    Consumer,
}

pub struct PendingControl {
    pub reply_to: ClientId,
    pub target_kind: PendingTarget,
    pub created_at: Instant,
}

/// `pending[id] -> (replyTo, origin)`. Removed on first matching
/// `control_result` or when `replyTo` disconnects (§3, §4.5).
#[derive(Default)]
pub struct PendingControlMap {
    inner: RwLock<HashMap<String, PendingControl>>,
}

impl PendingControlMap {
    pub async fn insert(&self, id: String, entry: PendingControl) {
        self.inner.write().await.insert(id, entry);
    }

    pub async fn take(&self, id: &str) -> Option<PendingControl> {
        self.inner.write().await.remove(id)
    }

    /// Drop every pending entry whose `reply_to` is the given session (§4.3 teardown).
    pub async fn drop_for_session(&self, client_id: &str) {
        self.inner.write().await.retain(|_, entry| entry.reply_to != client_id);
    }
}

/// Rolling window overload guard shared by the whole router (§4.4.4).
pub struct OverloadGuard {
    window: Mutex<VecDeque<Instant>>,
    window_len: std::time::Duration,
    limit: u32,
}

impl OverloadGuard {
    pub fn new(window_len: std::time::Duration, limit: u32) -> Self {
        Self { window: Mutex::new(VecDeque::new()), window_len, limit }
    }

    /// Record one touched event and report whether the window is currently saturated.
    pub async fn touch(&self) -> bool {
        let now = Instant::now();
        let mut window = self.window.lock().await;
        window.push_back(now);
        while let Some(front) = window.front() {
            if now.duration_since(*front) > self.window_len {
                window.pop_front();
            } else {
                break;
            }
        }
        window.len() as u32 >= self.limit
    }
}

/// Next synthesized request id, matching the `clientId + '-' + millis` scheme (§4.5).
pub fn next_request_id(client_id: &str, counter: &AtomicU64) -> String {
    let n = counter.fetch_add(1, Ordering::Relaxed);
    format!("{client_id}-{}", epoch_ms() + n)
}

pub fn epoch_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Top-level shared state, analogous to the teacher's `MuxState`.
pub struct BrokerState {
    pub config: BrokerConfig,
    pub secret: String,
    pub registry: SessionRegistry,
    pub pending: PendingControlMap,
    pub overload: OverloadGuard,
    pub metrics: Metrics,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
    pub client_counter: AtomicU64,
    /// HTTP-polled bridge sessions, keyed by `sessionId`. Kept separate from
    /// `registry` (which is keyed by `clientId`) since a `connect`'d session
    /// may not yet have a `clientId` until its `hello` arrives.
    pub http_bridges: RwLock<HashMap<ClientId, Arc<crate::http_bridge::HttpBridgeHandle>>>,
}

impl BrokerState {
    pub fn new(config: BrokerConfig, secret: String, shutdown: CancellationToken) -> Self {
        let overload = OverloadGuard::new(config.overload_window(), config.overload_limit);
        Self {
            config,
            secret,
            registry: SessionRegistry::default(),
            pending: PendingControlMap::default(),
            overload,
            metrics: Metrics::default(),
            shutdown,
            started_at: Instant::now(),
            client_counter: AtomicU64::new(0),
            http_bridges: RwLock::new(HashMap::new()),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
