// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Level/capability/filter vocabulary shared by the host and every bridge client.

use serde::{Deserialize, Serialize};

/// Subscription role negotiated during `auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Bridge,
    Consumer,
}

/// Log severity, ordered loosest-to-tightest for the level gate.
///
/// `LEVEL_ORDER = [Errors, Warn, Info, Trace]`; a consumer subscribed at
/// index `i` receives any event whose mapped level has index `<= i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Errors,
    Warn,
    Info,
    Trace,
}

impl Level {
    pub const ORDER: [Level; 4] = [Level::Errors, Level::Warn, Level::Info, Level::Trace];

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|l| *l == self).unwrap_or(0)
    }

    /// Parse a subscription level, case-insensitively. Unknown strings are `None`.
    pub fn parse(raw: &str) -> Option<Level> {
        match raw.to_ascii_lowercase().as_str() {
            "errors" | "error" => Some(Level::Errors),
            "warn" | "warning" => Some(Level::Warn),
            "info" => Some(Level::Info),
            "trace" => Some(Level::Trace),
            _ => None,
        }
    }

    /// Map a raw event's `level` field onto a subscription tier.
    ///
    /// `error -> Errors`, `warn -> Warn`, `debug -> Trace`, everything
    /// else (`info`, `log`, unknown) -> `Info`.
    pub fn from_event_level(raw: &str) -> Level {
        match raw.to_ascii_lowercase().as_str() {
            "error" => Level::Errors,
            "warn" | "warning" => Level::Warn,
            "debug" => Level::Trace,
            _ => Level::Info,
        }
    }
}

/// A coarse event category used for capability-gated routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Error,
    Console,
    Pageview,
    Navigation,
    Screenshot,
    Network,
    Control,
}

impl Capability {
    /// Parse a capability name, case-insensitively. Unknown strings are `None`.
    pub fn parse(raw: &str) -> Option<Capability> {
        match raw.to_ascii_lowercase().as_str() {
            "error" => Some(Capability::Error),
            "console" => Some(Capability::Console),
            "pageview" => Some(Capability::Pageview),
            "navigation" => Some(Capability::Navigation),
            "screenshot" => Some(Capability::Screenshot),
            "network" => Some(Capability::Network),
            "control" => Some(Capability::Control),
            _ => None,
        }
    }

    /// Event types subject to the capability gate (§4.4.2); all others pass unrestricted.
    pub fn is_gated_event_type(type_name: &str) -> bool {
        matches!(
            type_name.to_ascii_lowercase().as_str(),
            "pageview" | "screenshot" | "control" | "network" | "navigation"
        )
    }
}

/// LLM noise-reduction tier a consumer opts into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmFilter {
    #[default]
    Off,
    Minimal,
    Aggressive,
}

impl LlmFilter {
    /// Parse an `llm_filter` string. Unknown values collapse to `Off`, matching §4.4.
    pub fn parse(raw: &str) -> LlmFilter {
        match raw.to_ascii_lowercase().as_str() {
            "minimal" => LlmFilter::Minimal,
            "aggressive" => LlmFilter::Aggressive,
            _ => LlmFilter::Off,
        }
    }

    /// Whether this filter drops the given raw event level absent an overload
    /// override. Keyed on the raw `e.level` string (§4.4.3: `minimal` drops
    /// `debug`/`log`, `aggressive` additionally drops `info`), not the
    /// collapsed subscription tier — `from_event_level` maps both `log` and
    /// unrelated unknown levels onto `Info`, which would otherwise make
    /// `minimal` miss `log` and make `aggressive` over-drop unknown levels.
    pub fn drops(self, raw_level: &str) -> bool {
        let raw_level = raw_level.to_ascii_lowercase();
        match self {
            LlmFilter::Off => false,
            LlmFilter::Minimal => matches!(raw_level.as_str(), "debug" | "log"),
            LlmFilter::Aggressive => matches!(raw_level.as_str(), "debug" | "log" | "info"),
        }
    }
}
