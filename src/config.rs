//! Configuration envelope consumed by runner constructors.
//!
//! A `thiserror`-derived error enum and one eager `validate()` pass run
//! once at construction. This crate never reads environment variables or
//! files itself — `RunConfig` is `serde::Deserialize` so a surrounding
//! layer (explicitly out of scope here) can build one from YAML/JSON/env,
//! and hands it to the core already populated.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("{var} must be in range [{min}, {max}], got {actual}")]
    OutOfRange {
        var: String,
        min: f64,
        max: f64,
        actual: f64,
    },

    #[error("max_concurrency ({max}) must be >= starting_concurrency ({start})")]
    MaxBelowStart { max: i64, start: i64 },

    #[error("{field} is required when mode is {mode}")]
    MissingForMode { field: String, mode: String },

    #[error("missing required parameter '{0}' for this task plugin")]
    MissingParameter(String),

    #[error("parameter '{name}' is out of bounds: {message}")]
    InvalidParameter { name: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    ConcurrencyBased,
    RateLimited,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::ConcurrencyBased
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RampStrategyType {
    Step,
    Linear,
}

/// Deserializable envelope for everything a runner constructor needs.
/// The core never parses this from a file or environment variable itself.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub mode: RunMode,
    pub starting_concurrency: i64,
    pub max_concurrency: i64,
    pub ramp_strategy_type: RampStrategyType,
    pub ramp_step: Option<i64>,
    pub ramp_interval_seconds: Option<f64>,
    pub ramp_duration_seconds: Option<f64>,
    #[serde(default)]
    pub sustain_duration_seconds: f64,
    pub test_duration_seconds: f64,
    pub max_tps_limit: Option<f64>,
    pub task_type: String,
    #[serde(default)]
    pub task_parameter: HashMap<String, Value>,
}

impl RunConfig {
    /// Runs every check eagerly; returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "starting_concurrency",
            self.starting_concurrency as f64,
            1.0,
            10_000.0,
        )?;
        check_range(
            "max_concurrency",
            self.max_concurrency as f64,
            1.0,
            50_000.0,
        )?;
        if self.max_concurrency < self.starting_concurrency {
            return Err(ConfigError::MaxBelowStart {
                max: self.max_concurrency,
                start: self.starting_concurrency,
            });
        }

        if self.sustain_duration_seconds < 0.0 {
            return Err(ConfigError::OutOfRange {
                var: "sustain_duration_seconds".into(),
                min: 0.0,
                max: f64::INFINITY,
                actual: self.sustain_duration_seconds,
            });
        }

        check_range(
            "test_duration_seconds",
            self.test_duration_seconds,
            1.0,
            86_400.0,
        )?;

        match self.ramp_strategy_type {
            RampStrategyType::Step => {
                require_present("ramp_step", self.ramp_step.is_some())?;
                require_present("ramp_interval_seconds", self.ramp_interval_seconds.is_some())?;
            }
            RampStrategyType::Linear => {
                require_present("ramp_duration_seconds", self.ramp_duration_seconds.is_some())?;
            }
        }

        if self.mode == RunMode::RateLimited {
            match self.max_tps_limit {
                Some(limit) => check_range("max_tps_limit", limit, 1.0, 100_000.0)?,
                None => {
                    return Err(ConfigError::MissingForMode {
                        field: "max_tps_limit".into(),
                        mode: "RATE_LIMITED".into(),
                    })
                }
            }
        } else if let Some(limit) = self.max_tps_limit {
            check_range("max_tps_limit", limit, 1.0, 100_000.0)?;
        }

        Ok(())
    }

    #[cfg(test)]
    pub fn for_testing() -> Self {
        RunConfig {
            mode: RunMode::ConcurrencyBased,
            starting_concurrency: 10,
            max_concurrency: 100,
            ramp_strategy_type: RampStrategyType::Linear,
            ramp_step: None,
            ramp_interval_seconds: None,
            ramp_duration_seconds: Some(30.0),
            sustain_duration_seconds: 0.0,
            test_duration_seconds: 60.0,
            max_tps_limit: None,
            task_type: "sleep".into(),
            task_parameter: HashMap::new(),
        }
    }
}

fn check_range(var: &str, actual: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if actual < min || actual > max {
        return Err(ConfigError::OutOfRange {
            var: var.to_string(),
            min,
            max,
            actual,
        });
    }
    Ok(())
}

fn require_present(field: &str, present: bool) -> Result<(), ConfigError> {
    if !present {
        return Err(ConfigError::MissingForMode {
            field: field.to_string(),
            mode: "this ramp_strategy_type".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_test_config_is_valid() {
        assert!(RunConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn rejects_starting_concurrency_out_of_range() {
        let mut cfg = RunConfig::for_testing();
        cfg.starting_concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_max_below_starting() {
        let mut cfg = RunConfig::for_testing();
        cfg.max_concurrency = 5;
        cfg.starting_concurrency = 10;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MaxBelowStart { .. })
        ));
    }

    #[test]
    fn rate_limited_mode_requires_tps_limit() {
        let mut cfg = RunConfig::for_testing();
        cfg.mode = RunMode::RateLimited;
        cfg.max_tps_limit = None;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingForMode { .. })
        ));

        cfg.max_tps_limit = Some(500.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn step_ramp_requires_step_and_interval() {
        let mut cfg = RunConfig::for_testing();
        cfg.ramp_strategy_type = RampStrategyType::Step;
        cfg.ramp_step = None;
        cfg.ramp_interval_seconds = None;
        assert!(cfg.validate().is_err());

        cfg.ramp_step = Some(5);
        cfg.ramp_interval_seconds = Some(10.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_negative_sustain_duration() {
        let mut cfg = RunConfig::for_testing();
        cfg.sustain_duration_seconds = -1.0;
        assert!(cfg.validate().is_err());
    }
}
