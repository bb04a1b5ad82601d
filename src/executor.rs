//! Fixed-capacity concurrent task runner with submission accounting.
//!
//! Accounting shape: start an operation, record its outcome, observe
//! metrics, generalized from "run one HTTP scenario" to "run any boxed
//! `Task`", backed by `tokio::task::spawn` (cheap, supports tens of
//! thousands of logical workers) gated by a `tokio::sync::Semaphore`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::task::{Task, TaskResult};

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Bounded, accounted executor for `Task` values.
pub struct BoundedTaskExecutor {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    active_tasks: Arc<AtomicU64>,
    submitted_tasks: Arc<AtomicU64>,
    completed_tasks: Arc<AtomicU64>,
    grace_period: Duration,
}

impl BoundedTaskExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self::with_grace_period(max_concurrency, DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(max_concurrency: usize, grace_period: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            active_tasks: Arc::new(AtomicU64::new(0)),
            submitted_tasks: Arc::new(AtomicU64::new(0)),
            completed_tasks: Arc::new(AtomicU64::new(0)),
            grace_period,
        }
    }

    /// Blocks (asynchronously) until a permit is available, then runs the
    /// task on its own lightweight task, returning a handle to its result.
    pub async fn submit(&self, task: Box<dyn Task>) -> JoinHandle<TaskResult> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("executor semaphore never closed while submit() can be called");
        self.spawn_with_permit(task, permit)
    }

    /// Returns `None` immediately if no permit is available.
    pub fn try_submit(&self, task: Box<dyn Task>) -> Option<JoinHandle<TaskResult>> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.spawn_with_permit(task, permit))
    }

    fn spawn_with_permit(
        &self,
        task: Box<dyn Task>,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) -> JoinHandle<TaskResult> {
        self.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        self.active_tasks.fetch_add(1, Ordering::Relaxed);

        let active_tasks = self.active_tasks.clone();
        let completed_tasks = self.completed_tasks.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            // Run the task on its own inner task so a panic inside
            // `execute()` surfaces as a `JoinError` here instead of
            // unwinding this spawn and losing accounting.
            let result = match tokio::spawn(async move { task.execute().await }).await {
                Ok(result) => result,
                Err(join_err) => {
                    let message = if join_err.is_panic() {
                        panic_message(join_err.into_panic())
                    } else {
                        "task was cancelled".to_string()
                    };
                    warn!(error = %message, "task did not complete normally, converting to failed result");
                    TaskResult::failure(-1, started.elapsed(), message)
                }
            };
            active_tasks.fetch_sub(1, Ordering::Relaxed);
            completed_tasks.fetch_add(1, Ordering::Relaxed);
            result
        })
    }

    pub fn active_tasks(&self) -> u64 {
        self.active_tasks.load(Ordering::Relaxed)
    }

    pub fn submitted_tasks(&self) -> u64 {
        self.submitted_tasks.load(Ordering::Relaxed)
    }

    pub fn completed_tasks(&self) -> u64 {
        self.completed_tasks.load(Ordering::Relaxed)
    }

    pub fn pending_tasks(&self) -> u64 {
        self.submitted_tasks()
            .saturating_sub(self.completed_tasks())
            .saturating_sub(self.active_tasks())
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Waits until `active_tasks() == 0` or `timeout` elapses, whichever
    /// comes first. Returns `true` if it quiesced within the timeout.
    pub async fn await_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.active_tasks() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Cooperative shutdown: wait up to `grace_period` for in-flight tasks
    /// to finish, logging if some did not.
    pub async fn close(&self) {
        if !self.await_completion(self.grace_period).await {
            warn!(
                active = self.active_tasks(),
                grace_period_secs = self.grace_period.as_secs(),
                "executor grace period elapsed with tasks still active"
            );
        } else {
            debug!("executor drained cleanly");
        }
    }
}

pub(crate) fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct SleepTask {
        delay: Duration,
        succeed: bool,
    }

    #[async_trait::async_trait]
    impl Task for SleepTask {
        async fn execute(&self) -> TaskResult {
            tokio::time::sleep(self.delay).await;
            if self.succeed {
                TaskResult::success(1, self.delay)
            } else {
                TaskResult::failure(1, self.delay, "boom")
            }
        }
    }

    struct PanicTask;

    #[async_trait::async_trait]
    impl Task for PanicTask {
        async fn execute(&self) -> TaskResult {
            panic!("deliberate panic for test");
        }
    }

    #[tokio::test]
    async fn submit_runs_task_and_updates_counters() {
        let executor = BoundedTaskExecutor::new(4);
        let handle = executor
            .submit(Box::new(SleepTask {
                delay: Duration::from_millis(1),
                succeed: true,
            }))
            .await;
        let result = handle.await.unwrap();
        assert!(result.success);
        assert_eq!(executor.submitted_tasks(), 1);
        executor.await_completion(Duration::from_secs(1)).await;
        assert_eq!(executor.active_tasks(), 0);
        assert_eq!(executor.completed_tasks(), 1);
    }

    #[tokio::test]
    async fn try_submit_returns_none_when_saturated() {
        let executor = Arc::new(BoundedTaskExecutor::new(1));
        let blocker_running = Arc::new(AtomicBool::new(false));
        let flag = blocker_running.clone();
        let handle = executor
            .submit(Box::new(BlockingTask { flag }))
            .await;

        // The one permit is held by the blocking task; a second submission
        // should be refused immediately.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(executor.try_submit(Box::new(SleepTask {
            delay: Duration::from_millis(1),
            succeed: true
        })).is_none());

        blocker_running.store(false, Ordering::SeqCst);
        handle.await.unwrap();
    }

    struct BlockingTask {
        flag: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl Task for BlockingTask {
        async fn execute(&self) -> TaskResult {
            self.flag.store(true, Ordering::SeqCst);
            while self.flag.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            TaskResult::success(1, Duration::from_millis(1))
        }
    }

    #[tokio::test]
    async fn panicking_task_becomes_failed_result_not_a_crash() {
        let executor = BoundedTaskExecutor::new(1);
        let handle = executor.submit(Box::new(PanicTask)).await;
        let result = handle.await.unwrap();
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("panic"));
    }

    #[tokio::test]
    async fn pending_never_negative() {
        let executor = BoundedTaskExecutor::new(4);
        assert_eq!(executor.pending_tasks(), 0);
    }
}
