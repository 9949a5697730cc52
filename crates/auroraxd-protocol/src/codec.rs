// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text-frame <-> [`InboundFrame`]/[`OutboundFrame`] codec.

use crate::error::DecodeError;
use crate::messages::{InboundFrame, OutboundFrame};

/// Decode one inbound WebSocket text frame.
///
/// Rejects frames that are not a JSON object or that lack a non-empty
/// string `type`, matching the "reject events that are not an object or
/// lack a non-empty string type" rule from §4.7's redaction/truncation
/// section, applied uniformly to every inbound frame rather than only
/// bridge-client sends.
pub fn decode_inbound(text: &str) -> Result<InboundFrame, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;
    match obj.get("type").and_then(|v| v.as_str()) {
        Some(t) if !t.is_empty() => {}
        _ => return Err(DecodeError::MissingType),
    }
    Ok(serde_json::from_value(value)?)
}

/// Serialize an outbound frame to a WebSocket text payload.
pub fn encode_outbound(frame: &OutboundFrame) -> Result<String, DecodeError> {
    Ok(serde_json::to_string(frame)?)
}
