// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Locates a running host: either via explicit `ARIA_BRIDGE_URL`/
//! `ARIA_BRIDGE_SECRET` overrides, or by walking upward from the current
//! directory for `.aria/aria-bridge.json`, per §6.

use std::path::{Path, PathBuf};
use std::time::Duration;

use auroraxd_protocol::DiscoveryMetadata;

use crate::error::BridgeError;

/// What a successful discovery resolves to: enough to dial and authenticate.
#[derive(Debug, Clone)]
pub struct DiscoveredBridge {
    pub url: String,
    pub secret: String,
}

/// `true` when the client should attempt to connect at all, per the
/// `ARIA_BRIDGE=1` force-enable override or a `NODE_ENV`-equivalent dev signal.
pub fn auto_enable() -> bool {
    if std::env::var("ARIA_BRIDGE").as_deref() == Ok("1") {
        return true;
    }
    match std::env::var("NODE_ENV") {
        Ok(v) => v != "production",
        Err(_) => std::env::var("__DEV__").is_ok(),
    }
}

/// Resolve a bridge to connect to, preferring explicit env overrides over the
/// on-disk discovery walk.
pub fn discover(start_dir: &Path, staleness: Duration) -> Result<DiscoveredBridge, BridgeError> {
    if let (Ok(url), Ok(secret)) = (std::env::var("ARIA_BRIDGE_URL"), std::env::var("ARIA_BRIDGE_SECRET")) {
        return Ok(DiscoveredBridge { url, secret });
    }

    let path = find_discovery_file(start_dir)
        .ok_or_else(|| BridgeError::NotDiscovered(start_dir.to_path_buf()))?;

    let bytes = std::fs::read(&path).map_err(|source| BridgeError::Discovery { path: path.clone(), source })?;

    match serde_json::from_slice::<DiscoveryMetadata>(&bytes) {
        Ok(meta) => {
            let age = meta.heartbeat_age();
            if meta.is_stale(chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::seconds(15))) {
                return Err(BridgeError::StaleDiscovery { path, age_secs: age.num_seconds() });
            }
            Ok(DiscoveredBridge { url: meta.url, secret: meta.secret })
        }
        // Malformed JSON still has an mtime we can use as a staleness proxy,
        // so a half-written file from a crashed host doesn't hang discovery.
        Err(source) => {
            if is_stale_by_mtime(&path, staleness) {
                return Err(BridgeError::StaleDiscovery { path, age_secs: staleness.as_secs() as i64 });
            }
            Err(BridgeError::DiscoveryFormat { path, source })
        }
    }
}

fn find_discovery_file(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    loop {
        let candidate = dir.join(auroraxd_protocol::DISCOVERY_FILE_PATH);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn is_stale_by_mtime(path: &Path, staleness: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map_or(true, |elapsed| elapsed > staleness)
}
