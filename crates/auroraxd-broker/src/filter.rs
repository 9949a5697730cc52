// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The filter and routing engine: §4.4's `deliver(e, b, c)` predicate plus
//! the `Router` that fans an event out to every consumer it passes for.
//!
//! `deliver` is pure and CPU-bound only; it never `.await`s, matching §5's
//! "routing a single event is bounded-CPU and must not suspend" rule. The
//! `Router` evaluates the predicate while holding a read lock on the
//! consumer snapshot, then dispatches sends after releasing it.

use std::sync::Arc;

use auroraxd_protocol::event::Event;
use auroraxd_protocol::messages::OutboundFrame;
use auroraxd_protocol::{Capability, Level, LlmFilter};

use crate::state::{BridgeSnapshot, ConsumerSubscription};

/// Evaluate the four-part gate for one (event, bridge, consumer) triple.
///
/// `overload_saturated` is sampled once per routed event and passed in,
/// since the overload guard's own update is the only `.await` point in the
/// whole routing path and must happen outside this pure predicate.
pub fn deliver(
    event: &Event,
    bridge: &BridgeSnapshot,
    consumer: &ConsumerSubscription,
    overload_saturated: bool,
) -> bool {
    let mapped = Level::from_event_level(&event.level);
    if mapped.index() > consumer.highest_index() {
        return false;
    }

    if Capability::is_gated_event_type(&event.event_type) {
        if let Some(cap) = Capability::parse(&event.event_type) {
            if !consumer.allows_capability(cap) {
                return false;
            }
            if bridge.said_hello && !bridge.capabilities.contains(&cap) {
                return false;
            }
        }
    }

    if overload_saturated && consumer.llm_filter != LlmFilter::Off && mapped != Level::Errors {
        return false;
    }

    if !overload_saturated && consumer.llm_filter.drops(&event.level) {
        return false;
    }

    true
}

/// Fan one event out to every passed-in consumer snapshot, returning the
/// number actually delivered (used by the control correlator's `delivered`
/// count and by metrics).
pub fn route_event(
    event: &Event,
    bridge: &BridgeSnapshot,
    consumers: &[(Arc<crate::state::Session>, ConsumerSubscription)],
    overload_saturated: bool,
) -> u32 {
    let mut delivered = 0u32;
    for (session, subscription) in consumers {
        if deliver(event, bridge, subscription, overload_saturated) {
            session.outbound.send_frame(OutboundFrame::Event(event.clone()));
            delivered += 1;
        }
    }
    delivered
}
