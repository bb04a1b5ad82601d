//! Ramp strategies: pure functions of elapsed time that produce a target
//! concurrency level.
//!
//! Grounded on `load_models.rs`'s piecewise phase arithmetic
//! (`calculate_ramp_rps`), generalized from "target RPS" to "target virtual
//! user count" and restructured as a sum type per the crate's preference for
//! enums over open trait-object hierarchies at small, closed variant sets.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RampError {
    #[error("starting_concurrency must be positive, got {0}")]
    NonPositiveStartingConcurrency(i64),
    #[error("max_concurrency ({max}) must be >= starting_concurrency ({start})")]
    MaxBelowStart { max: i64, start: i64 },
    #[error("ramp_step must be positive, got {0}")]
    NonPositiveRampStep(i64),
    #[error("ramp_interval_secs must be positive, got {0}")]
    NonPositiveRampInterval(i64),
    #[error("ramp_duration_secs must be positive, got {0}")]
    NonPositiveRampDuration(i64),
    #[error("sustain_duration_secs must be non-negative, got {0}")]
    NegativeSustainDuration(i64),
}

/// Maps elapsed time since test start to a target concurrency level.
pub trait RampStrategy {
    fn target_concurrency(&self, elapsed_secs: f64) -> i32;
    fn starting_concurrency(&self) -> i32;
    fn max_concurrency(&self) -> i32;
    fn describe(&self) -> String;
}

/// Step ramp: concurrency increases by `ramp_step` every `ramp_interval_secs`
/// until `max_concurrency`, then sustains.
#[derive(Debug, Clone, Copy)]
pub struct StepRamp {
    starting_concurrency: i32,
    ramp_step: i32,
    ramp_interval_secs: f64,
    max_concurrency: i32,
    sustain_duration_secs: f64,
}

impl StepRamp {
    pub fn new(
        starting_concurrency: i32,
        ramp_step: i32,
        ramp_interval_secs: f64,
        max_concurrency: i32,
        sustain_duration_secs: f64,
    ) -> Result<Self, RampError> {
        if starting_concurrency <= 0 {
            return Err(RampError::NonPositiveStartingConcurrency(
                starting_concurrency as i64,
            ));
        }
        if max_concurrency < starting_concurrency {
            return Err(RampError::MaxBelowStart {
                max: max_concurrency as i64,
                start: starting_concurrency as i64,
            });
        }
        if ramp_step <= 0 {
            return Err(RampError::NonPositiveRampStep(ramp_step as i64));
        }
        if ramp_interval_secs <= 0.0 {
            return Err(RampError::NonPositiveRampInterval(ramp_interval_secs as i64));
        }
        if sustain_duration_secs < 0.0 {
            return Err(RampError::NegativeSustainDuration(sustain_duration_secs as i64));
        }
        Ok(Self {
            starting_concurrency,
            ramp_step,
            ramp_interval_secs,
            max_concurrency,
            sustain_duration_secs,
        })
    }
}

impl RampStrategy for StepRamp {
    fn target_concurrency(&self, elapsed_secs: f64) -> i32 {
        if elapsed_secs < 0.0 {
            return self.starting_concurrency;
        }
        let steps = (elapsed_secs / self.ramp_interval_secs).floor() as i64;
        let target = self.starting_concurrency as i64 + steps * self.ramp_step as i64;
        target.min(self.max_concurrency as i64).max(self.starting_concurrency as i64) as i32
    }

    fn starting_concurrency(&self) -> i32 {
        self.starting_concurrency
    }

    fn max_concurrency(&self) -> i32 {
        self.max_concurrency
    }

    fn describe(&self) -> String {
        format!(
            "step(start={}, step={}, interval={}s, max={}, sustain={}s)",
            self.starting_concurrency,
            self.ramp_step,
            self.ramp_interval_secs,
            self.max_concurrency,
            self.sustain_duration_secs
        )
    }
}

/// Linear ramp: concurrency increases smoothly from `starting_concurrency`
/// to `max_concurrency` over `ramp_duration_secs`, then sustains.
#[derive(Debug, Clone, Copy)]
pub struct LinearRamp {
    starting_concurrency: i32,
    max_concurrency: i32,
    ramp_duration_secs: f64,
    sustain_duration_secs: f64,
}

impl LinearRamp {
    pub fn new(
        starting_concurrency: i32,
        max_concurrency: i32,
        ramp_duration_secs: f64,
        sustain_duration_secs: f64,
    ) -> Result<Self, RampError> {
        if starting_concurrency <= 0 {
            return Err(RampError::NonPositiveStartingConcurrency(
                starting_concurrency as i64,
            ));
        }
        if max_concurrency < starting_concurrency {
            return Err(RampError::MaxBelowStart {
                max: max_concurrency as i64,
                start: starting_concurrency as i64,
            });
        }
        if ramp_duration_secs <= 0.0 {
            return Err(RampError::NonPositiveRampDuration(ramp_duration_secs as i64));
        }
        if sustain_duration_secs < 0.0 {
            return Err(RampError::NegativeSustainDuration(sustain_duration_secs as i64));
        }
        Ok(Self {
            starting_concurrency,
            max_concurrency,
            ramp_duration_secs,
            sustain_duration_secs,
        })
    }
}

impl RampStrategy for LinearRamp {
    fn target_concurrency(&self, elapsed_secs: f64) -> i32 {
        if elapsed_secs <= 0.0 {
            self.starting_concurrency
        } else if elapsed_secs < self.ramp_duration_secs {
            let span = (self.max_concurrency - self.starting_concurrency) as f64;
            self.starting_concurrency
                + (span * elapsed_secs / self.ramp_duration_secs).round() as i32
        } else {
            self.max_concurrency
        }
    }

    fn starting_concurrency(&self) -> i32 {
        self.starting_concurrency
    }

    fn max_concurrency(&self) -> i32 {
        self.max_concurrency
    }

    fn describe(&self) -> String {
        format!(
            "linear(start={}, max={}, ramp={}s, sustain={}s)",
            self.starting_concurrency,
            self.max_concurrency,
            self.ramp_duration_secs,
            self.sustain_duration_secs
        )
    }
}

/// Sum type over the two ramp strategies, avoiding an open trait-object
/// hierarchy for a fixed, closed set of variants.
#[derive(Debug, Clone, Copy)]
pub enum RampKind {
    Step(StepRamp),
    Linear(LinearRamp),
}

impl RampStrategy for RampKind {
    fn target_concurrency(&self, elapsed_secs: f64) -> i32 {
        match self {
            RampKind::Step(s) => s.target_concurrency(elapsed_secs),
            RampKind::Linear(l) => l.target_concurrency(elapsed_secs),
        }
    }

    fn starting_concurrency(&self) -> i32 {
        match self {
            RampKind::Step(s) => s.starting_concurrency(),
            RampKind::Linear(l) => l.starting_concurrency(),
        }
    }

    fn max_concurrency(&self) -> i32 {
        match self {
            RampKind::Step(s) => s.max_concurrency(),
            RampKind::Linear(l) => l.max_concurrency(),
        }
    }

    fn describe(&self) -> String {
        match self {
            RampKind::Step(s) => s.describe(),
            RampKind::Linear(l) => l.describe(),
        }
    }
}

impl From<StepRamp> for RampKind {
    fn from(s: StepRamp) -> Self {
        RampKind::Step(s)
    }
}

impl From<LinearRamp> for RampKind {
    fn from(l: LinearRamp) -> Self {
        RampKind::Linear(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_ramp_rejects_invalid_construction() {
        assert!(StepRamp::new(0, 1, 1.0, 10, 0.0).is_err());
        assert!(StepRamp::new(5, 1, 1.0, 4, 0.0).is_err());
        assert!(StepRamp::new(5, 0, 1.0, 10, 0.0).is_err());
        assert!(StepRamp::new(5, 1, 0.0, 10, 0.0).is_err());
        assert!(StepRamp::new(5, 1, 1.0, 10, -1.0).is_err());
    }

    #[test]
    fn step_ramp_climbs_and_clamps_to_max() {
        let ramp = StepRamp::new(10, 5, 10.0, 30, 60.0).unwrap();
        assert_eq!(ramp.target_concurrency(0.0), 10);
        assert_eq!(ramp.target_concurrency(9.9), 10);
        assert_eq!(ramp.target_concurrency(10.0), 15);
        assert_eq!(ramp.target_concurrency(25.0), 22);
        assert_eq!(ramp.target_concurrency(1000.0), 30);
    }

    #[test]
    fn linear_ramp_rejects_invalid_construction() {
        assert!(LinearRamp::new(0, 10, 10.0, 0.0).is_err());
        assert!(LinearRamp::new(10, 5, 10.0, 0.0).is_err());
        assert!(LinearRamp::new(10, 20, 0.0, 0.0).is_err());
        assert!(LinearRamp::new(10, 20, 10.0, -1.0).is_err());
    }

    #[test]
    fn linear_ramp_interpolates_and_plateaus() {
        let ramp = LinearRamp::new(10, 110, 100.0, 60.0).unwrap();
        assert_eq!(ramp.target_concurrency(0.0), 10);
        assert_eq!(ramp.target_concurrency(50.0), 60);
        assert_eq!(ramp.target_concurrency(100.0), 110);
        assert_eq!(ramp.target_concurrency(500.0), 110);
    }

    #[test]
    fn both_ramps_are_monotonically_non_decreasing() {
        let step = RampKind::Step(StepRamp::new(10, 3, 5.0, 50, 20.0).unwrap());
        let linear = RampKind::Linear(LinearRamp::new(10, 50, 40.0, 20.0).unwrap());
        for ramp in [step, linear] {
            let mut prev = ramp.target_concurrency(0.0);
            let mut t = 0.0;
            while t <= 120.0 {
                let cur = ramp.target_concurrency(t);
                assert!(cur >= prev, "{} dipped from {} to {} at t={}", ramp.describe(), prev, cur, t);
                prev = cur;
                t += 1.0;
            }
        }
    }

    #[test]
    fn negative_elapsed_clamps_to_starting_concurrency() {
        let step = StepRamp::new(10, 5, 10.0, 30, 0.0).unwrap();
        assert_eq!(step.target_concurrency(-5.0), 10);
        let linear = LinearRamp::new(10, 30, 10.0, 0.0).unwrap();
        assert_eq!(linear.target_concurrency(-5.0), 10);
    }
}
