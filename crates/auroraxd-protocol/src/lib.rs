// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wire protocol codec for the workspace observability bus: the
//! message types, constants, and on-disk shapes that the host and every
//! bridge client SDK must agree on bit-for-bit.

pub mod close_codes;
pub mod codec;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod event;
pub mod messages;
pub mod types;

pub use codec::{decode_inbound, encode_outbound};
pub use discovery::{DiscoveryMetadata, WorkspaceLock, DISCOVERY_FILE_PATH, LOCK_FILE_PATH};
pub use error::DecodeError;
pub use event::Event;
pub use messages::{
    control_failure, rate_limit_notice, ControlError, Frame, InboundFrame, OutboundFrame,
    RateLimitReason,
};
pub use types::{Capability, Level, LlmFilter, Role};
