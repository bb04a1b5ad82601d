//! Paces task submission to a target TPS with optional linear warm-up.
//!
//! Grounded on `worker.rs`'s absolute-deadline staggering (`sleep_until`
//! against a monotonically-advancing `next_fire`, letting a slow worker
//! naturally catch up rather than drift) generalized into a standalone,
//! reusable scheduler with an atomic CAS loop instead of a single
//! `Instant` local variable, since `RateController` is shared across many
//! callers.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, Instant};

#[derive(Debug, Error, PartialEq)]
pub enum RateControllerError {
    #[error("target_tps must be positive, got {0}")]
    NonPositiveTargetTps(f64),
}

/// Token-bucket-style pacer. `next_execution` is tracked as nanoseconds
/// since an internal epoch `Instant` so it fits in an `AtomicI64`.
pub struct RateController {
    epoch: Instant,
    target_tps: f64,
    interval_nanos: i64,
    start_nanos: i64,
    ramp_up_duration_nanos: i64,
    next_execution_nanos: AtomicI64,
    permits_issued: AtomicU64,
}

impl RateController {
    pub fn new(target_tps: f64, ramp_up_duration: Duration) -> Result<Self, RateControllerError> {
        if target_tps <= 0.0 {
            return Err(RateControllerError::NonPositiveTargetTps(target_tps));
        }
        let epoch = Instant::now();
        let interval_nanos = (1_000_000_000.0 / target_tps).round() as i64;
        Ok(Self {
            epoch,
            target_tps,
            interval_nanos,
            start_nanos: 0,
            ramp_up_duration_nanos: ramp_up_duration.as_nanos() as i64,
            next_execution_nanos: AtomicI64::new(0),
            permits_issued: AtomicU64::new(0),
        })
    }

    fn now_nanos(&self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }

    /// Interval to use right now, accounting for linear warm-up.
    fn current_interval_nanos(&self, now_nanos: i64) -> i64 {
        if self.ramp_up_duration_nanos <= 0
            || now_nanos >= self.start_nanos + self.ramp_up_duration_nanos
        {
            return self.interval_nanos;
        }
        let progress = ((now_nanos - self.start_nanos) as f64 / self.ramp_up_duration_nanos as f64)
            .clamp(0.0, 1.0);
        let current_tps = (1.0 + (self.target_tps - 1.0) * progress).max(1.0).round();
        (1_000_000_000.0 / current_tps).round() as i64
    }

    /// Blocking: always returns `true` once the scheduled instant arrives.
    pub async fn acquire_permit(&self) -> bool {
        let now = self.now_nanos();
        let interval = self.current_interval_nanos(now);
        let scheduled = self.next_execution_nanos.fetch_add(interval, Ordering::SeqCst);

        if scheduled > now {
            let deadline = self.epoch + Duration::from_nanos(scheduled as u64);
            time::sleep_until(deadline).await;
        }
        self.permits_issued.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Non-blocking: returns `false` (rolling back the reservation via CAS)
    /// if the scheduled slot is still in the future.
    pub fn try_acquire_permit(&self) -> bool {
        loop {
            let now = self.now_nanos();
            let scheduled = self.next_execution_nanos.load(Ordering::SeqCst);
            if scheduled > now {
                return false;
            }
            let interval = self.current_interval_nanos(now);
            let new_next = scheduled + interval;
            if self
                .next_execution_nanos
                .compare_exchange(scheduled, new_next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.permits_issued.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            // Another caller won the race; reread and retry.
        }
    }

    pub fn reset(&self) {
        let now = self.now_nanos();
        self.next_execution_nanos.store(now, Ordering::SeqCst);
        self.permits_issued.store(0, Ordering::Relaxed);
    }

    pub fn permits_issued(&self) -> u64 {
        self.permits_issued.load(Ordering::Relaxed)
    }

    pub fn target_tps(&self) -> f64 {
        self.target_tps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_target_tps() {
        assert!(RateController::new(0.0, Duration::ZERO).is_err());
        assert!(RateController::new(-5.0, Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn try_acquire_fails_fast_then_succeeds_after_interval() {
        let controller = RateController::new(1_000.0, Duration::ZERO).unwrap();
        // First permit is immediately available: next_execution starts at 0.
        assert!(controller.try_acquire_permit());
        // Interval is 1ms; immediately retrying should fail.
        assert!(!controller.try_acquire_permit());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(controller.try_acquire_permit());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_try_acquire_issues_at_most_one_permit_per_interval() {
        let controller = std::sync::Arc::new(RateController::new(100.0, Duration::ZERO).unwrap());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let controller = controller.clone();
            handles.push(tokio::spawn(async move { controller.try_acquire_permit() }));
        }
        let mut granted = 0;
        for h in handles {
            if h.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn reset_clears_permit_count() {
        let controller = RateController::new(1_000.0, Duration::ZERO).unwrap();
        controller.try_acquire_permit();
        assert_eq!(controller.permits_issued(), 1);
        controller.reset();
        assert_eq!(controller.permits_issued(), 0);
    }

    #[tokio::test]
    async fn acquire_permit_blocks_until_scheduled() {
        let controller = RateController::new(500.0, Duration::ZERO).unwrap();
        let start = Instant::now();
        assert!(controller.acquire_permit().await);
        assert!(controller.acquire_permit().await);
        // Second permit should not be free; roughly interval (2ms) later.
        assert!(start.elapsed() >= Duration::from_millis(1));
    }
}
