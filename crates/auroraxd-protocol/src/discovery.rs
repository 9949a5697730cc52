// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk shapes shared by the host's lock manager and every bridge client's
//! [`crate`]-level discovery walk.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relative path (under the workspace root) of the lock file.
pub const LOCK_FILE_PATH: &str = ".aria/aria-bridge.lock";

/// Relative path (under the workspace root) of the discovery metadata file.
pub const DISCOVERY_FILE_PATH: &str = ".aria/aria-bridge.json";

/// `.aria/aria-bridge.lock` contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceLock {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub workspace_path: PathBuf,
}

/// `.aria/aria-bridge.json` contents, rewritten on every heartbeat tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMetadata {
    pub url: String,
    pub port: u16,
    pub secret: String,
    pub workspace_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
    pub heartbeat_at: DateTime<Utc>,
}

impl DiscoveryMetadata {
    /// Age of the last heartbeat write, used by both the host's own staleness
    /// check during acquire and a bridge client's discovery staleness check.
    pub fn heartbeat_age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.heartbeat_at)
    }

    pub fn is_stale(&self, threshold: chrono::Duration) -> bool {
        self.heartbeat_age() > threshold
    }
}
