// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the `auroraxd` host process.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "auroraxd", about = "Per-workspace development observability bus")]
pub struct BrokerConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "AURORAXD_HOST")]
    pub host: String,

    /// Port to listen on. 0 lets the OS choose; the bound port is written to discovery.
    #[arg(long, default_value_t = 0, env = "AURORAXD_PORT")]
    pub port: u16,

    /// Workspace root the lock/discovery files and relative paths are anchored to.
    #[arg(long, default_value = ".", env = "AURORAXD_WORKSPACE")]
    pub workspace: PathBuf,

    /// Fixed shared secret. If unset, reused from a valid prior discovery file
    /// or freshly minted.
    #[arg(long, env = "AURORAXD_SECRET")]
    pub secret: Option<String>,

    /// Alias accepted for the fixed shared secret, mirroring the client-side name.
    #[arg(long, env = "AURORAXD_HOST_SECRET")]
    pub host_secret: Option<String>,

    /// Auth handshake timeout in milliseconds.
    #[arg(long, default_value_t = 5_000, env = "AURORAXD_AUTH_TIMEOUT_MS")]
    pub auth_timeout_ms: u64,

    /// HTTP bridge session staleness threshold in milliseconds.
    #[arg(long, default_value_t = 15_000, env = "AURORAXD_SESSION_STALENESS_MS")]
    pub session_staleness_ms: u64,

    /// Discovery/lock heartbeat interval in milliseconds.
    #[arg(long, default_value_t = 5_000, env = "AURORAXD_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Screenshot rate-limit floor per bridge, in milliseconds.
    #[arg(long, default_value_t = 2_000, env = "AURORAXD_SCREENSHOT_RATE_LIMIT_MS")]
    pub screenshot_rate_limit_ms: u64,

    /// Overload guard rolling window length in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "AURORAXD_OVERLOAD_WINDOW_MS")]
    pub overload_window_ms: u64,

    /// Overload guard event threshold within the rolling window.
    #[arg(long, default_value_t = 500, env = "AURORAXD_OVERLOAD_LIMIT")]
    pub overload_limit: u32,

    /// Log format: `text` or `json`.
    #[arg(long, default_value = "text", env = "AURORAXD_LOG_FORMAT")]
    pub log_format: String,

    /// Log level filter (passed to `tracing_subscriber::EnvFilter` as a default).
    #[arg(long, default_value = "info", env = "AURORAXD_LOG_LEVEL")]
    pub log_level: String,

    /// Graceful shutdown watchdog in milliseconds before the process force-exits.
    #[arg(long, default_value_t = 5_000, env = "AURORAXD_SHUTDOWN_TIMEOUT_MS")]
    pub shutdown_timeout_ms: u64,
}

impl BrokerConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn session_staleness(&self) -> Duration {
        Duration::from_millis(self.session_staleness_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn screenshot_rate_limit(&self) -> Duration {
        Duration::from_millis(self.screenshot_rate_limit_ms)
    }

    pub fn overload_window(&self) -> Duration {
        Duration::from_millis(self.overload_window_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Explicit secret override, checking both accepted env/flag names.
    pub fn fixed_secret(&self) -> Option<&str> {
        self.secret.as_deref().or(self.host_secret.as_deref())
    }

    pub fn lock_path(&self) -> PathBuf {
        self.workspace.join(auroraxd_protocol::LOCK_FILE_PATH)
    }

    pub fn discovery_path(&self) -> PathBuf {
        self.workspace.join(auroraxd_protocol::DISCOVERY_FILE_PATH)
    }
}

#[cfg(test)]
pub fn test_config() -> BrokerConfig {
    BrokerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        workspace: PathBuf::from("."),
        secret: None,
        host_secret: None,
        auth_timeout_ms: 5_000,
        session_staleness_ms: 15_000,
        heartbeat_ms: 5_000,
        screenshot_rate_limit_ms: 2_000,
        overload_window_ms: 10_000,
        overload_limit: 500,
        log_format: "text".into(),
        log_level: "info".into(),
        shutdown_timeout_ms: 5_000,
    }
}
