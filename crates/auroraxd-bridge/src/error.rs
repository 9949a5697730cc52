// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Errors surfaced by the bridge client's public API. Transport failures
/// during the run loop itself are not surfaced here — per §4.7 the client
/// reconnects on its own and never terminates the state machine.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no aria-bridge discovery file found above {0}")]
    NotDiscovered(std::path::PathBuf),

    #[error("discovery file at {path} is stale ({age_secs}s old)")]
    StaleDiscovery { path: std::path::PathBuf, age_secs: i64 },

    #[error("failed to read or parse discovery file at {path}: {source}")]
    Discovery { path: std::path::PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse discovery file at {path}: {source}")]
    DiscoveryFormat { path: std::path::PathBuf, #[source] source: serde_json::Error },

    #[error("bridge client already stopped")]
    Stopped,
}
