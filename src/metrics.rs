//! Ambient metrics (§4.9 "per-message latency histogram, decision counter
//! labelled `{tenant, decision, message_type}`, queue-depth gauge"; §8
//! invariant 4 `messages_sent + messages_failed == Σ results returned by
//! Send`). Grounded on the teacher's `Arc<RwLock<HashMap<String,u64>>>`
//! metrics map (`lib.rs:233,423`), adapted to one atomic per counter/gauge
//! rather than a single locked map since the counters here are read far
//! more often than the teacher's single `messages_processed` tally.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use dashmap::DashMap;

/// Shared between [`crate::processor::MessageProcessor`] (decision counter)
/// and [`crate::bus::AgentBus`] (sent/failed counters, queue-depth gauge).
#[derive(Debug, Default)]
pub struct BusMetrics {
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
    queue_depth: AtomicI64,
    decisions: DashMap<(String, String, String), AtomicU64>,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.10 Send step 2 / §8 invariant 4: exactly one of these fires per
    /// `Send` call's returned result.
    pub fn record_send_result(&self, succeeded: bool) {
        if succeeded {
            self.messages_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.messages_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// §4.9 decision counter, labelled `{tenant, decision, message_type}`.
    pub fn record_decision(&self, tenant: &str, decision: &str, message_type: &str) {
        let key = (tenant.to_string(), decision.to_string(), message_type.to_string());
        self.decisions
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// §4.9 / §5 backpressure: queue-depth gauge, sampled on send and recv.
    pub fn incr_queue_depth(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr_queue_depth(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_failed(&self) -> u64 {
        self.messages_failed.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> i64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn decision_count(&self, tenant: &str, decision: &str, message_type: &str) -> u64 {
        self.decisions
            .get(&(tenant.to_string(), decision.to_string(), message_type.to_string()))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_result_splits_sent_and_failed() {
        let metrics = BusMetrics::new();
        metrics.record_send_result(true);
        metrics.record_send_result(true);
        metrics.record_send_result(false);
        assert_eq!(metrics.messages_sent(), 2);
        assert_eq!(metrics.messages_failed(), 1);
    }

    #[test]
    fn decision_counter_is_labelled() {
        let metrics = BusMetrics::new();
        metrics.record_decision("t1", "ALLOW", "COMMAND");
        metrics.record_decision("t1", "ALLOW", "COMMAND");
        metrics.record_decision("t1", "DENY", "COMMAND");
        assert_eq!(metrics.decision_count("t1", "ALLOW", "COMMAND"), 2);
        assert_eq!(metrics.decision_count("t1", "DENY", "COMMAND"), 1);
        assert_eq!(metrics.decision_count("t2", "ALLOW", "COMMAND"), 0);
    }

    #[test]
    fn queue_depth_gauge_tracks_in_flight_messages() {
        let metrics = BusMetrics::new();
        metrics.incr_queue_depth();
        metrics.incr_queue_depth();
        metrics.decr_queue_depth();
        assert_eq!(metrics.queue_depth(), 1);
    }
}
