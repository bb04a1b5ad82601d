//! Unit-of-work contract executed by virtual users.
//!
//! This module defines the boundary between the engine core and concrete
//! workloads (HTTP calls, gRPC calls, sleeps, CPU loops, user-defined tasks).
//! The core never knows what a `Task` actually does; it only executes it and
//! records the outcome.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// A single unit of work. Safe to invoke repeatedly across different
/// workers; long-lived resources (connection pools, gRPC channels) belong to
/// the `TaskFactory` or plugin configuration, not to a `Task` value itself.
#[async_trait]
pub trait Task: Send + Sync {
    /// Run this task to completion and report the outcome.
    ///
    /// Implementations should not panic for expected failures (timeouts,
    /// non-2xx responses, etc.) — return a failed `TaskResult` instead. A
    /// panic is still caught at the `VirtualUser` boundary and converted to
    /// a failed result, but doing so costs an unwind.
    async fn execute(&self) -> TaskResult;
}

/// Produces a fresh `Task` for each execution. Pure with respect to the
/// core; a plugin may hold mutable state (connection pools, auth tokens)
/// behind interior mutability or `Arc`.
pub trait TaskFactory: Send + Sync {
    fn create(&self, task_id: i64) -> Box<dyn Task>;
}

/// Outcome of one task execution. Immutable once built.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: i64,
    pub latency_nanos: u64,
    pub success: bool,
    pub error_message: Option<String>,
    pub payload_bytes: Option<u64>,
    pub metadata: Option<HashMap<String, Value>>,
}

impl TaskResult {
    /// Build a successful result.
    pub fn success(task_id: i64, latency: Duration) -> Self {
        Self {
            task_id,
            latency_nanos: latency.as_nanos() as u64,
            success: true,
            error_message: None,
            payload_bytes: None,
            metadata: None,
        }
    }

    /// Build a failed result. `error_message` is truncated by callers that
    /// key off it (see `metrics::MAX_ERR_MSG_LEN`); this constructor keeps
    /// the message as given so tests can assert on the untruncated value.
    pub fn failure(task_id: i64, latency: Duration, error_message: impl Into<String>) -> Self {
        Self {
            task_id,
            latency_nanos: latency.as_nanos() as u64,
            success: false,
            error_message: Some(error_message.into()),
            payload_bytes: None,
            metadata: None,
        }
    }

    pub fn with_payload_bytes(mut self, bytes: u64) -> Self {
        self.payload_bytes = Some(bytes);
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_result_has_no_error() {
        let r = TaskResult::success(1, Duration::from_millis(10));
        assert!(r.success);
        assert!(r.error_message.is_none());
        assert_eq!(r.latency_nanos, 10_000_000);
    }

    #[test]
    fn failure_result_carries_message() {
        let r = TaskResult::failure(2, Duration::from_millis(5), "timeout");
        assert!(!r.success);
        assert_eq!(r.error_message.as_deref(), Some("timeout"));
    }
}
