//! Fan-out delivery metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for broadcaster delivery and overflow behavior.
#[derive(Debug, Default)]
pub struct FanoutMetrics {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl FanoutMetrics {
    /// Records a message enqueued to a subscriber.
    pub fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a message dropped due to queue overflow.
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of enqueued messages.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Returns the number of dropped messages.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the drop rate as a percentage of all handled messages.
    #[must_use]
    pub fn drop_rate(&self) -> f64 {
        let delivered = self.delivered();
        let dropped = self.dropped();
        let total = delivered + dropped;
        if total == 0 {
            0.0
        } else {
            (dropped as f64 / total as f64) * 100.0
        }
    }
}
