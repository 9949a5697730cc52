// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical protocol constants shared by every bridge client SDK.
//!
//! These values are language-neutral: any SDK re-implementing the bridge
//! client state machine must reproduce them bit-for-bit.

use std::time::Duration;

/// Current wire protocol version advertised in `hello`.
pub const PROTOCOL_VERSION: u32 = 2;

/// Interval between outbound `ping` frames while `Ready`.
pub const HEARTBEAT_INTERVAL_MS: u64 = 15_000;

/// How long to wait for a `pong` before declaring the heartbeat lost.
///
/// Must strictly exceed [`HEARTBEAT_INTERVAL_MS`].
pub const HEARTBEAT_TIMEOUT_MS: u64 = 30_000;

/// Initial delay before the first reconnect attempt.
pub const RECONNECT_INITIAL_DELAY_MS: u64 = 1_000;

/// Reconnect delay ceiling (post-jitter attempts are still capped at this).
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Outbound buffer capacity before drop-oldest kicks in.
pub const BUFFER_LIMIT: usize = 200;

/// Auth handshake timeout enforced by the host.
pub const AUTH_TIMEOUT_MS: u64 = 5_000;

/// Minimum spacing between forwarded `screenshot` events per bridge.
pub const SCREENSHOT_RATE_LIMIT_MS: u64 = 2_000;

/// Overload-guard rolling window length.
pub const OVERLOAD_WINDOW_MS: u64 = 10_000;

/// Overload-guard event threshold within the rolling window.
pub const OVERLOAD_WINDOW_LIMIT: u32 = 500;

/// HTTP bridge session staleness threshold (also the lock staleness threshold).
pub const STALENESS_MS: u64 = 15_000;

/// Discovery/lock heartbeat tick interval.
pub const DISCOVERY_HEARTBEAT_MS: u64 = 5_000;

/// Maximum length of an outbound `message` string before truncation.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Literal suffix appended after truncating an overlong `message`.
pub const TRUNCATION_MARKER: &str = "\u{2026}[truncated]";

pub fn heartbeat_interval() -> Duration {
    Duration::from_millis(HEARTBEAT_INTERVAL_MS)
}

pub fn heartbeat_timeout() -> Duration {
    Duration::from_millis(HEARTBEAT_TIMEOUT_MS)
}

pub fn reconnect_initial_delay() -> Duration {
    Duration::from_millis(RECONNECT_INITIAL_DELAY_MS)
}

pub fn reconnect_max_delay() -> Duration {
    Duration::from_millis(RECONNECT_MAX_DELAY_MS)
}

pub fn auth_timeout() -> Duration {
    Duration::from_millis(AUTH_TIMEOUT_MS)
}

pub fn screenshot_rate_limit() -> Duration {
    Duration::from_millis(SCREENSHOT_RATE_LIMIT_MS)
}

pub fn overload_window() -> Duration {
    Duration::from_millis(OVERLOAD_WINDOW_MS)
}

pub fn staleness_threshold() -> Duration {
    Duration::from_millis(STALENESS_MS)
}

pub fn discovery_heartbeat_interval() -> Duration {
    Duration::from_millis(DISCOVERY_HEARTBEAT_MS)
}
