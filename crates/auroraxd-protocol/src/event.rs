// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bridge event envelope: the one `any`-typed payload in the whole protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single bridge-emitted event.
///
/// `event_type` carries the event's category (`console`, `error`, `pageview`,
/// `navigation`, `screenshot`, `network`, or the synthetic `control` used by
/// the control correlator for capability lookups) and doubles as the wire
/// `type` discriminant for frames that are not one of the named control
/// messages. Fields outside the known set land in `extra` so the router can
/// forward them unmodified; the router itself only ever reads `event_type`,
/// `level`, and the handful of typed fields below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub message: String,

    /// ISO-8601 timestamp. Filled in by the router for HTTP-ingested events
    /// and screenshots when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(rename = "projectId", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breadcrumbs: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Value>,

    /// Forward-compatibility escape hatch: anything not named above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_level() -> String {
    "info".to_owned()
}

impl Event {
    /// Fill in the defaults the HTTP ingestion path and screenshot forwarding
    /// rely on (§4.6: "missing fields are defaulted").
    pub fn apply_defaults(&mut self, platform_default: &str) {
        if self.timestamp.is_none() {
            self.timestamp = Some(chrono::Utc::now().to_rfc3339());
        }
        if self.platform.is_none() {
            self.platform = Some(platform_default.to_owned());
        }
        if self.level.is_empty() {
            self.level = default_level();
        }
    }

    /// `true` when this event carries a well-formed screenshot payload.
    pub fn has_valid_screenshot_payload(&self) -> bool {
        self.mime.as_ref().is_some_and(|m| !m.is_empty())
            && self.data.as_ref().is_some_and(|d| !d.is_empty())
    }
}
