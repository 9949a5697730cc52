// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lock and discovery metadata: ensures a single host per
//! workspace and publishes the file clients in that workspace discover.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use auroraxd_protocol::{DiscoveryMetadata, WorkspaceLock};
use chrono::Utc;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use rand::RngCore;
use tracing::warn;

use crate::error::LockError;

/// Write `contents` to `path` atomically via a sibling `.tmp` file + rename.
///
/// The scratch name appends `.tmp` to the full file name rather than
/// replacing the extension (`with_extension("tmp")` would collapse both
/// `aria-bridge.lock` and `aria-bridge.json` onto the same `aria-bridge.tmp`
/// scratch file, letting a heartbeat republish race a lock write).
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(contents)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Whether `pid` currently names a live process, probed with a signal-0 `kill`.
///
/// `ESRCH` means the process is gone; any other outcome (including a
/// permission error, which still proves the pid is held by *someone*)
/// is treated as alive, matching §4.1's "alive = pid signalable".
fn pid_is_alive(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Err(nix::errno::Errno::ESRCH) => false,
        _ => true,
    }
}

fn mint_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Result of probing an existing lock/discovery pair during acquire.
struct ExistingLock {
    alive: bool,
    stale: bool,
    pid: u32,
}

fn probe_existing(
    lock_path: &Path,
    discovery_path: &Path,
    staleness: Duration,
) -> Option<ExistingLock> {
    let lock_bytes = fs::read(lock_path).ok()?;
    let lock: WorkspaceLock = serde_json::from_slice(&lock_bytes).ok()?;
    let alive = pid_is_alive(lock.pid);

    let stale = match fs::read(discovery_path).ok().and_then(|b| serde_json::from_slice::<DiscoveryMetadata>(&b).ok()) {
        Some(meta) => meta.is_stale(chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::seconds(15))),
        None => {
            let age = Utc::now().signed_duration_since(lock.started_at);
            age > chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::seconds(15))
        }
    };

    Some(ExistingLock { alive, stale, pid: lock.pid })
}

/// Acquire the workspace lock, removing a stale lock/discovery pair first if needed.
///
/// Returns an error naming the conflicting pid and lock path if a live,
/// non-stale host already holds it.
pub fn acquire(
    lock_path: &Path,
    discovery_path: &Path,
    staleness: Duration,
) -> Result<(), LockError> {
    if let Some(existing) = probe_existing(lock_path, discovery_path, staleness) {
        if existing.alive && !existing.stale {
            return Err(LockError::AlreadyRunning {
                pid: existing.pid,
                lock_path: lock_path.to_path_buf(),
            });
        }
        tracing::info!(pid = existing.pid, "stale lock detected, reclaiming");
        let _ = fs::remove_file(lock_path);
        let _ = fs::remove_file(discovery_path);
    }

    let lock = WorkspaceLock {
        pid: std::process::id(),
        started_at: Utc::now(),
        workspace_path: workspace_of(lock_path),
    };
    write_atomic(lock_path, &serde_json::to_vec(&lock)?)?;
    Ok(())
}

fn workspace_of(lock_path: &Path) -> PathBuf {
    lock_path
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Probe ports starting at `preferred`, binding then immediately releasing,
/// until a free one is found or `max_attempts` is exhausted.
pub fn pick_port(host: &str, preferred: u16, max_attempts: u32) -> Result<u16, LockError> {
    for attempt in 0..max_attempts {
        let candidate = if preferred == 0 { 0 } else { preferred.wrapping_add(attempt as u16) };
        if let Ok(listener) = std::net::TcpListener::bind((host, candidate)) {
            return Ok(listener.local_addr().map_err(LockError::Io)?.port());
        }
    }
    Err(LockError::NoFreePort { attempts: max_attempts })
}

/// Choose the shared secret per §4.1's priority order: explicit override,
/// then a still-valid existing discovery file's secret, then a fresh one.
pub fn choose_secret(fixed: Option<&str>, discovery_path: &Path, staleness: Duration) -> String {
    if let Some(secret) = fixed {
        return secret.to_owned();
    }
    if let Some(meta) = fs::read(discovery_path)
        .ok()
        .and_then(|b| serde_json::from_slice::<DiscoveryMetadata>(&b).ok())
    {
        if !meta.is_stale(chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::seconds(15))) {
            return meta.secret;
        }
    }
    mint_secret()
}

/// Publish (or republish, for heartbeats) the discovery file atomically.
pub fn publish(discovery_path: &Path, meta: &DiscoveryMetadata) -> Result<(), LockError> {
    write_atomic(discovery_path, &serde_json::to_vec(meta)?)?;
    Ok(())
}

/// Rewrite only `heartbeatAt`, logging and continuing on failure per §4.1's
/// "errors during heartbeat are logged, non-fatal" rule.
pub fn heartbeat(discovery_path: &Path, meta: &mut DiscoveryMetadata) {
    meta.heartbeat_at = Utc::now();
    if let Err(err) = publish(discovery_path, meta) {
        warn!(error = %err, "failed to rewrite discovery heartbeat");
    }
}

/// RAII guard removing both files on drop, used to back graceful shutdown.
pub struct LockGuard {
    lock_path: PathBuf,
    discovery_path: PathBuf,
}

impl LockGuard {
    pub fn new(lock_path: PathBuf, discovery_path: PathBuf) -> Self {
        Self { lock_path, discovery_path }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
        let _ = fs::remove_file(&self.discovery_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn acquire_succeeds_on_fresh_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".aria/aria-bridge.lock");
        let discovery_path = dir.path().join(".aria/aria-bridge.json");
        acquire(&lock_path, &discovery_path, StdDuration::from_secs(15)).unwrap();
        assert!(lock_path.exists());
    }

    #[test]
    fn acquire_fails_when_live_pid_holds_fresh_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".aria/aria-bridge.lock");
        let discovery_path = dir.path().join(".aria/aria-bridge.json");

        let lock = WorkspaceLock {
            pid: std::process::id(),
            started_at: Utc::now(),
            workspace_path: dir.path().to_path_buf(),
        };
        write_atomic(&lock_path, &serde_json::to_vec(&lock).unwrap()).unwrap();

        let err = acquire(&lock_path, &discovery_path, StdDuration::from_secs(15)).unwrap_err();
        assert!(matches!(err, LockError::AlreadyRunning { .. }));
    }

    #[test]
    fn acquire_reclaims_dead_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".aria/aria-bridge.lock");
        let discovery_path = dir.path().join(".aria/aria-bridge.json");

        let lock = WorkspaceLock {
            pid: 999_999_999,
            started_at: Utc::now(),
            workspace_path: dir.path().to_path_buf(),
        };
        write_atomic(&lock_path, &serde_json::to_vec(&lock).unwrap()).unwrap();

        acquire(&lock_path, &discovery_path, StdDuration::from_secs(15)).unwrap();
        let reacquired: WorkspaceLock =
            serde_json::from_slice(&fs::read(&lock_path).unwrap()).unwrap();
        assert_eq!(reacquired.pid, std::process::id());
    }

    #[test]
    fn acquire_reclaims_stale_heartbeat_even_with_live_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".aria/aria-bridge.lock");
        let discovery_path = dir.path().join(".aria/aria-bridge.json");

        let lock = WorkspaceLock {
            pid: std::process::id(),
            started_at: Utc::now() - chrono::Duration::seconds(60),
            workspace_path: dir.path().to_path_buf(),
        };
        write_atomic(&lock_path, &serde_json::to_vec(&lock).unwrap()).unwrap();

        let meta = DiscoveryMetadata {
            url: "ws://127.0.0.1:1".into(),
            port: 1,
            secret: "abc".into(),
            workspace_path: dir.path().to_path_buf(),
            started_at: lock.started_at,
            pid: lock.pid,
            heartbeat_at: Utc::now() - chrono::Duration::seconds(30),
        };
        write_atomic(&discovery_path, &serde_json::to_vec(&meta).unwrap()).unwrap();

        acquire(&lock_path, &discovery_path, StdDuration::from_secs(15)).unwrap();
    }

    #[test]
    fn choose_secret_prefers_fixed_override() {
        let dir = tempfile::tempdir().unwrap();
        let discovery_path = dir.path().join(".aria/aria-bridge.json");
        assert_eq!(choose_secret(Some("fixed"), &discovery_path, StdDuration::from_secs(15)), "fixed");
    }

    #[test]
    fn choose_secret_mints_fresh_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        let discovery_path = dir.path().join(".aria/aria-bridge.json");
        let secret = choose_secret(None, &discovery_path, StdDuration::from_secs(15));
        assert_eq!(secret.len(), 64);
    }
}
