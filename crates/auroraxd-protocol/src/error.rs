// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Decode-time failures shared by the host and bridge client read loops.
///
/// Per §7, a malformed frame outside the authentication phase is logged once
/// and otherwise ignored — this type exists so call sites can log it
/// uniformly, not to drive a teardown decision.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame is missing a non-empty string `type`")]
    MissingType,
}
