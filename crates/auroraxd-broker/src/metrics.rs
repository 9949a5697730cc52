// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory counters for the `/api/v1/metrics` endpoint. Not durable: reset
//! on restart, per §3's "the broker is ephemeral; there is no durable log."

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct Metrics {
    pub events_routed: AtomicU64,
    pub events_dropped_level: AtomicU64,
    pub events_dropped_capability: AtomicU64,
    pub events_dropped_llm_filter: AtomicU64,
    pub events_dropped_overload: AtomicU64,
    pub screenshots_rate_limited: AtomicU64,
    pub control_requests_in_flight: AtomicU64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_routed: self.events_routed.load(Ordering::Relaxed),
            events_dropped_level: self.events_dropped_level.load(Ordering::Relaxed),
            events_dropped_capability: self.events_dropped_capability.load(Ordering::Relaxed),
            events_dropped_llm_filter: self.events_dropped_llm_filter.load(Ordering::Relaxed),
            events_dropped_overload: self.events_dropped_overload.load(Ordering::Relaxed),
            screenshots_rate_limited: self.screenshots_rate_limited.load(Ordering::Relaxed),
            control_requests_in_flight: self.control_requests_in_flight.load(Ordering::Relaxed),
        }
    }

    pub fn inc_routed(&self) {
        self.events_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped_level(&self) {
        self.events_dropped_level.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped_capability(&self) {
        self.events_dropped_capability.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped_llm_filter(&self) {
        self.events_dropped_llm_filter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped_overload(&self) {
        self.events_dropped_overload.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.screenshots_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn control_in_flight_delta(&self, delta: i64) {
        if delta >= 0 {
            self.control_requests_in_flight.fetch_add(delta as u64, Ordering::Relaxed);
        } else {
            self.control_requests_in_flight.fetch_sub((-delta) as u64, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub events_routed: u64,
    pub events_dropped_level: u64,
    pub events_dropped_capability: u64,
    pub events_dropped_llm_filter: u64,
    pub events_dropped_overload: u64,
    pub screenshots_rate_limited: u64,
    pub control_requests_in_flight: u64,
}
