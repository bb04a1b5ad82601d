//! Thin wrapper over a `RampKind` plus a mode and an optional TPS ceiling.
//!
//! Mirrors `load_models.rs::LoadModel::calculate_current_rps`'s dispatch
//! shape, but dispatching over `RampKind` instead of an RPS-model enum, and
//! adding the throttle decision the load models left to the caller.

use thiserror::Error;

use crate::ramp::{RampKind, RampStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerMode {
    ConcurrencyBased,
    RateLimited,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConcurrencyControllerError {
    #[error("max_tps_limit must be positive, got {0}")]
    NonPositiveTpsLimit(f64),
}

/// Immutable after construction — no interior mutability.
pub struct ConcurrencyController {
    strategy: RampKind,
    mode: ControllerMode,
    max_tps_limit: Option<f64>,
}

impl ConcurrencyController {
    pub fn new(
        strategy: RampKind,
        mode: ControllerMode,
        max_tps_limit: Option<f64>,
    ) -> Result<Self, ConcurrencyControllerError> {
        if let Some(limit) = max_tps_limit {
            if limit <= 0.0 {
                return Err(ConcurrencyControllerError::NonPositiveTpsLimit(limit));
            }
        }
        Ok(Self {
            strategy,
            mode,
            max_tps_limit,
        })
    }

    pub fn target_concurrency(&self, elapsed_secs: f64) -> i32 {
        self.strategy.target_concurrency(elapsed_secs)
    }

    pub fn should_throttle(&self, current_tps: f64) -> bool {
        self.mode == ControllerMode::RateLimited
            && self
                .max_tps_limit
                .is_some_and(|limit| current_tps >= limit)
    }

    pub fn ramp_up_progress(&self, elapsed_secs: f64) -> f64 {
        let start = self.strategy.starting_concurrency() as f64;
        let max = self.strategy.max_concurrency() as f64;
        if (max - start).abs() < f64::EPSILON {
            return 100.0;
        }
        let current = self.strategy.target_concurrency(elapsed_secs) as f64;
        (((current - start) / (max - start)) * 100.0).clamp(0.0, 100.0)
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn strategy(&self) -> &RampKind {
        &self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ramp::LinearRamp;

    fn linear_controller(mode: ControllerMode, limit: Option<f64>) -> ConcurrencyController {
        let ramp = LinearRamp::new(10, 110, 100.0, 0.0).unwrap();
        ConcurrencyController::new(RampKind::Linear(ramp), mode, limit).unwrap()
    }

    #[test]
    fn rejects_non_positive_tps_limit() {
        let ramp = LinearRamp::new(10, 110, 100.0, 0.0).unwrap();
        let err = ConcurrencyController::new(
            RampKind::Linear(ramp),
            ControllerMode::RateLimited,
            Some(0.0),
        )
        .unwrap_err();
        assert_eq!(err, ConcurrencyControllerError::NonPositiveTpsLimit(0.0));
    }

    #[test]
    fn throttles_only_in_rate_limited_mode_over_ceiling() {
        let controller = linear_controller(ControllerMode::RateLimited, Some(100.0));
        assert!(!controller.should_throttle(99.0));
        assert!(controller.should_throttle(100.0));
        assert!(controller.should_throttle(150.0));

        let concurrency_mode = linear_controller(ControllerMode::ConcurrencyBased, Some(100.0));
        assert!(!concurrency_mode.should_throttle(1000.0));

        let no_ceiling = linear_controller(ControllerMode::RateLimited, None);
        assert!(!no_ceiling.should_throttle(1_000_000.0));
    }

    #[test]
    fn ramp_up_progress_spans_zero_to_hundred() {
        let controller = linear_controller(ControllerMode::ConcurrencyBased, None);
        assert_eq!(controller.ramp_up_progress(0.0), 0.0);
        assert_eq!(controller.ramp_up_progress(100.0), 100.0);
        assert!((controller.ramp_up_progress(50.0) - 50.0).abs() < 1.0);
    }
}
