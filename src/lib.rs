//! Core load-generation engine: a concurrency controller, a virtual-user
//! runtime and bounded task executor, a rate controller, and a metrics
//! collector. Concrete workloads (HTTP, gRPC, database clients) plug in
//! through the `Task`/`TaskPlugin` contracts; this crate never speaks a
//! wire protocol itself.

pub mod concurrency_controller;
pub mod config;
pub mod demo_tasks;
pub mod executor;
pub mod metrics;
pub mod plugin;
pub mod ramp;
pub mod rate_controller;
pub mod runner;
pub mod suite;
pub mod task;
pub mod virtual_user;

pub use concurrency_controller::{ConcurrencyController, ConcurrencyControllerError, ControllerMode};
pub use config::{ConfigError, RampStrategyType, RunConfig, RunMode};
pub use executor::BoundedTaskExecutor;
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use plugin::{ParameterDef, ParameterKind, TaskPlugin};
pub use ramp::{LinearRamp, RampError, RampKind, RampStrategy, StepRamp};
pub use rate_controller::{RateController, RateControllerError};
pub use runner::{ConcurrencyBasedRunner, RateBasedRunner, TestResult, TestRunner};
pub use suite::{CorrelationContext, SuiteOrchestrator};
pub use task::{Task, TaskFactory, TaskResult};
pub use virtual_user::VirtualUserManager;
