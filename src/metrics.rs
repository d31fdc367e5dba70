// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for cachewire.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for installing an exporter.
//!
//! # Metric Naming Convention
//! - `cachewire_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `policy`: cacheable, evict, hash_get, hash_put, hash_evict, publish
//! - `outcome`: hit, miss, bypass, cached_null
//! - `status`: success, failure, skipped

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// CACHE - read-through, eviction, grouped hash
// ═══════════════════════════════════════════════════════════════════════════

/// Record how a cache policy resolved one call
pub fn record_cache_request(policy: &'static str, outcome: &'static str) {
    counter!(
        "cachewire_cache_requests_total",
        "policy" => policy,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record keys removed by an eviction (`single`, `all_entries`, `field`)
pub fn record_evicted(mode: &'static str, count: u64) {
    counter!(
        "cachewire_evicted_keys_total",
        "mode" => mode
    )
    .increment(count);
}

/// Record a swallowed store failure
pub fn record_store_error(operation: &'static str) {
    counter!(
        "cachewire_store_errors_total",
        "operation" => operation
    )
    .increment(1);
}

/// Record time spent inside an intercepted call, operation included
pub fn record_latency(policy: &'static str, duration: Duration) {
    histogram!(
        "cachewire_operation_seconds",
        "policy" => policy
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// PUB/SUB
// ═══════════════════════════════════════════════════════════════════════════

/// Record the final status of one publish (after retries)
pub fn record_publish(status: &'static str) {
    counter!(
        "cachewire_publish_total",
        "status" => status
    )
    .increment(1);
}

/// Record the final status of one handler delivery (after retries)
pub fn record_handler_invocation(status: &'static str) {
    counter!(
        "cachewire_handler_invocations_total",
        "status" => status
    )
    .increment(1);
}

/// Record a message dropped before reaching any handler
pub fn record_message_dropped(reason: &'static str) {
    counter!(
        "cachewire_messages_dropped_total",
        "reason" => reason
    )
    .increment(1);
}

/// Set number of topics with a running listener
pub fn set_subscribed_topics(count: usize) {
    gauge!("cachewire_subscribed_topics").set(count as f64);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    policy: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(policy: &'static str) -> Self {
        Self {
            policy,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.policy, self.start.elapsed());
    }
}
