// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP bridge session manager: adapts polling bridges (those that cannot
//! open a WebSocket) into the same session model as a WS connection, per
//! §4.6. Grounded on the teacher's `spawn_health_checker`/
//! `PodRegistry::run_health_checks` eviction-after-threshold pattern.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::state::{BrokerState, Outbound, Session, SessionKind};

/// Bookkeeping for one HTTP-polled bridge, keyed by its session id.
pub struct HttpBridgeHandle {
    pub queue: Arc<Mutex<VecDeque<Value>>>,
    pub last_seen: RwLock<Instant>,
}

impl HttpBridgeHandle {
    pub fn new() -> Self {
        Self { queue: Arc::new(Mutex::new(VecDeque::new())), last_seen: RwLock::new(Instant::now()) }
    }

    pub async fn touch(&self) {
        *self.last_seen.write().await = Instant::now();
    }

    pub async fn is_stale(&self, threshold: Duration) -> bool {
        self.last_seen.read().await.elapsed() > threshold
    }
}

/// Build a `Session` for a freshly connected HTTP bridge, backed by a queue
/// instead of a live socket sender.
pub fn new_http_bridge_session(client_id: String, queue: Arc<Mutex<VecDeque<Value>>>) -> Session {
    Session {
        client_id,
        kind: SessionKind::Bridge(crate::state::BridgeAdvertised::default()),
        outbound: Outbound::HttpQueue(queue),
        cancel: CancellationToken::new(),
    }
}

/// Periodic sweep evicting HTTP bridge sessions whose `last_seen` exceeds
/// the staleness threshold, running the same teardown as a WS disconnect.
pub async fn spawn_staleness_sweep(state: Arc<BrokerState>, threshold: Duration) {
    let mut interval = tokio::time::interval(threshold);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = interval.tick() => {
                let stale_ids: Vec<String> = {
                    let map = state.http_bridges.read().await;
                    let mut ids = Vec::new();
                    for (id, handle) in map.iter() {
                        if handle.is_stale(threshold).await {
                            ids.push(id.clone());
                        }
                    }
                    ids
                };
                for id in stale_ids {
                    info!(client_id = %id, "evicting stale HTTP bridge session");
                    state.http_bridges.write().await.remove(&id);
                    state.registry.remove(&id).await;
                    state.pending.drop_for_session(&id).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_reports_stale_after_threshold() {
        let handle = HttpBridgeHandle::new();
        assert!(!handle.is_stale(Duration::from_millis(50)).await);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(handle.is_stale(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn touch_resets_staleness() {
        let handle = HttpBridgeHandle::new();
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.touch().await;
        assert!(!handle.is_stale(Duration::from_millis(50)).await);
    }
}
