use std::sync::atomic::{AtomicU64, Ordering};

/// Publish pipeline counters
///
/// Updated by the producer side (enqueued, rejected-full) and by the
/// background sender (attempts, delivered, dropped).
#[derive(Debug, Default)]
pub struct PublishStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    attempts: AtomicU64,
    rejected_full: AtomicU64,
}

impl PublishStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_full(&self) {
        self.rejected_full.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> PublishStatsSnapshot {
        PublishStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStatsSnapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub attempts: u64,
    pub rejected_full: u64,
}

impl PublishStatsSnapshot {
    /// Messages the sender has finished with, either way
    #[must_use]
    pub fn settled(&self) -> u64 {
        self.delivered + self.dropped
    }

    #[must_use]
    pub fn delivery_rate(&self) -> f64 {
        let settled = self.settled();
        if settled == 0 {
            return 1.0;
        }
        self.delivered as f64 / settled as f64
    }
}
