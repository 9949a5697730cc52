// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bridge client's connection state machine, per §4.7:
//! `Idle -> Connecting -> Authed -> Ready <-> HeartbeatLost -> Closed`.

/// Point-in-time connection state, observable via [`crate::client::BridgeClient::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not yet connected; no socket open.
    Idle,
    /// Socket open, `auth` sent, awaiting `auth_success`.
    Connecting,
    /// `auth_success` received; `hello` not yet acknowledged.
    Authed,
    /// Steady state: events flow, heartbeat armed.
    Ready,
    /// A heartbeat timeout fired; the socket is being torn down and a
    /// reconnect will follow.
    HeartbeatLost,
    /// User-initiated stop. Terminal: no further reconnects.
    Closed,
}

impl ClientState {
    pub fn is_connected(self) -> bool {
        matches!(self, ClientState::Authed | ClientState::Ready)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ClientState::Closed)
    }
}
