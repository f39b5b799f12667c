//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::connection::ConnectionState;

/// Running counters shared by the dispatcher and the connection task.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    sent_live: AtomicU64,
    sent_fallback: AtomicU64,
    fallback_failures: AtomicU64,
    queued: AtomicU64,
    drained: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
}

impl Metrics {
    pub(crate) fn record_live(&self) {
        self.sent_live.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.sent_fallback.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback_failure(&self) {
        self.fallback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drained(&self, count: usize) {
        self.drained.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_requeued(&self, count: usize) {
        self.requeued.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, count: usize) {
        self.dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, state: ConnectionState, queue_len: usize) -> DeliveryStats {
        DeliveryStats {
            state,
            queue_len,
            sent_live: self.sent_live.load(Ordering::Relaxed),
            sent_fallback: self.sent_fallback.load(Ordering::Relaxed),
            fallback_failures: self.fallback_failures.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of delivery health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub state: ConnectionState,
    /// Events currently waiting in the outbound queue.
    pub queue_len: usize,
    /// Events handed to the real-time writer (including drained ones).
    pub sent_live: u64,
    /// Events accepted by the fallback endpoint.
    pub sent_fallback: u64,
    pub fallback_failures: u64,
    /// Events that entered the outbound queue.
    pub queued: u64,
    /// Events moved from the queue to the real-time channel.
    pub drained: u64,
    /// Live events put back in the queue after the channel went away.
    pub requeued: u64,
    /// Events evicted because the queue was full.
    pub dropped: u64,
}
