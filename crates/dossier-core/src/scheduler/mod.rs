//! Durable two-lane task scheduling.
//!
//! Tasks live in a SQLite table and survive restarts. Workers lease a row on
//! dequeue and only delete it on ack, so a crash mid-stage redelivers the
//! task once the lease expires (at-least-once delivery; stage handlers are
//! idempotent to absorb the duplicates).

mod queue;
mod worker;

pub use queue::{NackOutcome, QueueError, TaskQueue};
pub use worker::{spawn_workers, StageHandler, WorkerOptions};

use std::time::Duration;

use rand::Rng;

use crate::pipeline::Stage;

/// Queue lane. Lower value wins on dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Document analysis stages.
    Analysis = 0,
    /// Delivery and housekeeping work.
    Default = 1,
}

impl Lane {
    pub(crate) fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Exponential backoff with ±50% jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(10 * 60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next delivery, given how many attempts have already
    /// failed. Jitter keeps a burst of failures from retrying in lockstep.
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempts.saturating_sub(1).min(16));
        let raw = self.base.saturating_mul(factor).min(self.cap);
        let jitter: f64 = rand::rng().random_range(0.5..1.5);
        raw.mul_f64(jitter)
    }
}

/// Per-stage retry ceilings. A task is delivered at most `max_retries + 1`
/// times before it dead-letters.
#[derive(Debug, Clone, Copy)]
pub struct RetryLimits {
    /// Entry task; generous because it may wait out provider outages.
    pub entry: u32,
    /// AI-backed analysis stages.
    pub ai: u32,
    /// Webhook delivery and cleanup.
    pub delivery: u32,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            entry: 120,
            ai: 10,
            delivery: 60,
        }
    }
}

impl RetryLimits {
    pub fn max_retries(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Analyse => self.entry,
            Stage::Webhook | Stage::Cleanup => self.delivery,
            _ => self.ai,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            base: Duration::from_secs(4),
            cap: Duration::from_secs(60),
        };
        for _ in 0..32 {
            let first = policy.delay(1);
            assert!(first >= Duration::from_secs(2) && first < Duration::from_secs(6));
            let third = policy.delay(3);
            assert!(third >= Duration::from_secs(8) && third < Duration::from_secs(24));
            let huge = policy.delay(30);
            assert!(huge <= Duration::from_secs(90));
        }
    }

    #[test]
    fn ai_stages_share_one_ceiling() {
        let limits = RetryLimits::default();
        assert_eq!(limits.max_retries(Stage::SmartSummary), limits.ai);
        assert_eq!(limits.max_retries(Stage::Finalize), limits.ai);
        assert_eq!(limits.max_retries(Stage::Webhook), limits.delivery);
        assert_eq!(limits.max_retries(Stage::Analyse), limits.entry);
    }

    #[test]
    fn analysis_lane_sorts_first() {
        assert!(Lane::Analysis.as_i64() < Lane::Default.as_i64());
    }
}
