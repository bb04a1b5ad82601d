//! Task plugin contract: the richer capability a concrete workload
//! implements beyond bare `Task`, covering declaration, validation, and
//! one-time initialization of expensive resources.
//!
//! Modeled directly on the plugin contract described for task types, in the
//! same `async_trait` + `thiserror` idiom used throughout the rest of the
//! crate.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ConfigError;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    Integer,
    Float,
    Boolean,
}

/// Declares one configurable input a task plugin accepts.
#[derive(Debug, Clone)]
pub struct ParameterDef {
    pub name: String,
    pub kind: ParameterKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub allowed_values: Option<Vec<Value>>,
}

impl ParameterDef {
    pub fn required(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            description: description.into(),
            min: None,
            max: None,
            allowed_values: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        kind: ParameterKind,
        default: Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: Some(default),
            description: description.into(),
            min: None,
            max: None,
            allowed_values: None,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// A named, versioned, declarative unit of work that plugs into a runner.
/// The same plugin instance may be shared across workers and must be safe
/// to call concurrently once initialized; expensive resources are set up
/// once in `initialize`, not per `Task`.
#[async_trait]
pub trait TaskPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> &str;
    fn version(&self) -> &str;
    fn parameters(&self) -> Vec<ParameterDef>;

    /// Checks required parameters are present and within any declared
    /// bounds. Does not mutate plugin state.
    fn validate_parameters(&self, params: &HashMap<String, Value>) -> Result<(), ConfigError> {
        for def in self.parameters() {
            match params.get(&def.name) {
                Some(value) => {
                    if let (Some(min), Some(max), Some(n)) = (def.min, def.max, value.as_f64()) {
                        if n < min || n > max {
                            return Err(ConfigError::InvalidParameter {
                                name: def.name.clone(),
                                message: format!("{n} not in [{min}, {max}]"),
                            });
                        }
                    }
                    if let Some(allowed) = &def.allowed_values {
                        if !allowed.contains(value) {
                            return Err(ConfigError::InvalidParameter {
                                name: def.name.clone(),
                                message: format!("{value} is not one of {allowed:?}"),
                            });
                        }
                    }
                }
                None if def.required => {
                    return Err(ConfigError::MissingParameter(def.name.clone()));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Initializes expensive, long-lived resources from validated
    /// parameters. Called exactly once before any `Task::execute`.
    async fn initialize(&mut self, params: &HashMap<String, Value>) -> Result<(), ConfigError>;

    /// Produces a `Task` instance bound to this plugin's initialized state.
    fn create_task(&self, task_id: i64) -> Box<dyn Task>;
}
