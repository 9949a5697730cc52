// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference bridge client SDK: connects to a running host over the
//! WebSocket transport, authenticates, and keeps a reconnecting session
//! alive per §4.7.

pub mod client;
pub mod discovery;
pub mod error;
pub mod redact;
pub mod state_machine;

pub use client::{BridgeClient, BridgeClientBuilder, ControlInvocation, ControlOutcome};
pub use discovery::{auto_enable, discover, DiscoveredBridge};
pub use error::BridgeError;
pub use state_machine::ClientState;
