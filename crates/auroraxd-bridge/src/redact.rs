// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redaction and truncation applied on the send path, per §4.7.

use serde_json::Value;

use auroraxd_protocol::constants::{MAX_MESSAGE_LEN, TRUNCATION_MARKER};

/// Truncate `message` to [`MAX_MESSAGE_LEN`] characters, appending
/// [`TRUNCATION_MARKER`] when it was cut.
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_LEN {
        return message.to_owned();
    }
    let head: String = message.chars().take(MAX_MESSAGE_LEN).collect();
    format!("{head}{TRUNCATION_MARKER}")
}

/// Redact one level deep: any object key whose lowercased name contains
/// `token`, `secret`, or `password` has its value replaced with the literal
/// string `"[redacted]"`. Arrays are preserved; nested objects are not
/// descended into.
pub fn redact_shallow(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    let redacted = if is_sensitive_key(&key) { Value::String("[redacted]".into()) } else { val };
                    (key, redacted)
                })
                .collect(),
        ),
        other => other,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    ["token", "secret", "password"].iter().any(|needle| lower.contains(needle))
}
