// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire frames exchanged over the WebSocket transport.
//!
//! Every frame is one JSON text message dispatched on its `type` field. The
//! control/handshake frames below are the closed set named in §6; anything
//! else is treated as a bridge [`Event`](crate::event::Event) whose own
//! `type` is the event category. [`Frame`] models the closed set;
//! [`InboundFrame`]/[`OutboundFrame`] add the event fallback via `untagged`,
//! the same duck-typed-dispatch-made-explicit pattern the teacher's
//! `ServerMessage`/`ClientMessage` enums use for their own closed sets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::Event;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Auth {
        secret: String,
        role: crate::types::Role,
        #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
    AuthSuccess {
        role: crate::types::Role,
        #[serde(rename = "clientId")]
        client_id: String,
    },
    Hello {
        capabilities: Vec<String>,
        platform: String,
        #[serde(rename = "projectId", default, skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        route: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        protocol: u32,
    },
    HelloAck {
        #[serde(rename = "clientId")]
        client_id: String,
        protocol: u32,
    },
    Subscribe {
        levels: Vec<String>,
        #[serde(default)]
        capabilities: Vec<String>,
        #[serde(rename = "llm_filter", default, skip_serializing_if = "Option::is_none")]
        llm_filter: Option<String>,
    },
    SubscribeAck {
        #[serde(rename = "clientId")]
        client_id: String,
        levels: Vec<String>,
        capabilities: Vec<String>,
        llm_filter: String,
    },
    Ping {},
    Pong {},
    ControlRequest {
        id: String,
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(rename = "expectResult", default, skip_serializing_if = "Option::is_none")]
        expect_result: Option<bool>,
        #[serde(rename = "timeoutMs", default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    ControlResult {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ControlError>,
    },
    ControlForwarded {
        id: String,
        delivered: u32,
    },
    RateLimitNotice {
        reason: RateLimitReason,
        #[serde(rename = "retryAfterMs", default, skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitReason {
    MissingCapability,
    RateLimit,
    NoConsumers,
    InvalidFormat,
}

/// Anything arriving on a connection: a named control frame, or a bare event.
///
/// `#[serde(untagged)]` tries `Frame` first; a `type` value outside the
/// closed set fails that variant and falls through to `Event`, which is the
/// Rust expression of "duck-typed dispatch on `msg.type`" from the design
/// notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    Control(Frame),
    Event(Event),
}

/// Anything the host sends back down a connection. Same shape as
/// [`InboundFrame`]; kept as a distinct type so call sites read as
/// direction-aware even though the wire representation is identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Control(Frame),
    Event(Event),
}

impl From<Frame> for OutboundFrame {
    fn from(frame: Frame) -> Self {
        OutboundFrame::Control(frame)
    }
}

impl From<Event> for OutboundFrame {
    fn from(event: Event) -> Self {
        OutboundFrame::Event(event)
    }
}

/// Build a `control_result` carrying a synthesized failure, per §4.5's
/// "zero targets" and §7's "control: no targets" paths.
pub fn control_failure(id: impl Into<String>, message: impl Into<String>) -> Frame {
    Frame::ControlResult {
        id: id.into(),
        ok: false,
        result: None,
        error: Some(ControlError { message: message.into(), stack: None }),
    }
}

/// Build a `rate_limit_notice` for the screenshot gate in §4.4.
pub fn rate_limit_notice(
    reason: RateLimitReason,
    retry_after_ms: Option<u64>,
    message: impl Into<String>,
) -> Frame {
    Frame::RateLimitNotice { reason, retry_after_ms, message: message.into() }
}
