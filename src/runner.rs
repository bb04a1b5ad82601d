//! Orchestrates one test run: time budget, adjustment loop, shutdown.
//!
//! Grounded on `main.rs`'s top-level control loop (duration check,
//! per-iteration target computation) and `worker.rs`'s pacing arithmetic,
//! restructured per the crate's preference for a single shared trait with
//! two independent implementations rather than dynamic dispatch over a
//! type-erased runner reference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::concurrency_controller::ConcurrencyController;
use crate::executor::BoundedTaskExecutor;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::rate_controller::RateController;
use crate::task::TaskFactory;
use crate::virtual_user::VirtualUserManager;

const CONTROL_PERIOD: Duration = Duration::from_millis(100);
const THROTTLE_BACKOFF: Duration = Duration::from_millis(10);
const RATE_RUNNER_TRY_SUBMIT_BACKOFF: Duration = Duration::from_millis(1);
const RATE_RUNNER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one completed run.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub snapshot: MetricsSnapshot,
    pub actual_duration: Duration,
}

/// Common surface both runner flavors expose. Implementations share no
/// state with each other.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, duration: Duration) -> TestResult;
    fn stop(&self);
    fn snapshot(&self) -> MetricsSnapshot;
}

/// Primary runner: converges virtual user count to a ramp-driven target
/// every `CONTROL_PERIOD`.
pub struct ConcurrencyBasedRunner {
    controller: ConcurrencyController,
    manager: VirtualUserManager,
    collector: Arc<MetricsCollector>,
    executor: Arc<BoundedTaskExecutor>,
    stop_requested: Arc<AtomicBool>,
}

impl ConcurrencyBasedRunner {
    pub fn new(
        controller: ConcurrencyController,
        factory: Arc<dyn TaskFactory>,
        collector: Arc<MetricsCollector>,
        executor: Arc<BoundedTaskExecutor>,
    ) -> Self {
        let manager = VirtualUserManager::new(factory, collector.clone());
        Self {
            controller,
            manager,
            collector,
            executor,
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl TestRunner for ConcurrencyBasedRunner {
    async fn run(&self, duration: Duration) -> TestResult {
        let start = Instant::now();

        info!(duration_secs = duration.as_secs_f64(), "concurrency-based run starting");

        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration || self.stop_requested.load(Ordering::Relaxed) {
                break;
            }

            let elapsed_secs = elapsed.as_secs_f64();
            let ramp_target = self.controller.target_concurrency(elapsed_secs).max(0) as usize;
            let throttled = self
                .controller
                .should_throttle(self.collector.snapshot().tps);
            // While throttled, freeze concurrency growth at the live count
            // rather than keep converging on the ramp's unthrottled target;
            // scale-down (the ramp winding back down) still applies.
            let target = if throttled {
                ramp_target.min(self.manager.current_count().await)
            } else {
                ramp_target
            };
            self.manager.adjust_concurrency(target).await;

            if throttled {
                tokio::time::sleep(THROTTLE_BACKOFF).await;
            }

            let tick_elapsed = start.elapsed() - elapsed;
            if tick_elapsed < CONTROL_PERIOD {
                tokio::time::sleep(CONTROL_PERIOD - tick_elapsed).await;
            }
        }

        self.stop_requested.store(true, Ordering::SeqCst);
        self.manager.shutdown_all().await;
        self.executor.close().await;

        let actual_duration = start.elapsed();
        let snapshot = self.collector.snapshot();
        info!(
            actual_duration_secs = actual_duration.as_secs_f64(),
            total_tasks = snapshot.total_tasks,
            "concurrency-based run complete"
        );

        TestResult {
            snapshot,
            actual_duration,
        }
    }

    fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.collector.snapshot()
    }
}

/// Rate-based runner, kept alongside the concurrency-based runner for
/// workloads that need to pin an exact TPS rather than a concurrency
/// ramp.
pub struct RateBasedRunner {
    rate_controller: RateController,
    factory: Arc<dyn TaskFactory>,
    collector: Arc<MetricsCollector>,
    executor: Arc<BoundedTaskExecutor>,
    stop_requested: Arc<AtomicBool>,
    next_task_id: std::sync::atomic::AtomicI64,
}

impl RateBasedRunner {
    pub fn new(
        rate_controller: RateController,
        factory: Arc<dyn TaskFactory>,
        collector: Arc<MetricsCollector>,
        executor: Arc<BoundedTaskExecutor>,
    ) -> Self {
        Self {
            rate_controller,
            factory,
            collector,
            executor,
            stop_requested: Arc::new(AtomicBool::new(false)),
            next_task_id: std::sync::atomic::AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl TestRunner for RateBasedRunner {
    async fn run(&self, duration: Duration) -> TestResult {
        let start = Instant::now();

        info!(
            duration_secs = duration.as_secs_f64(),
            target_tps = self.rate_controller.target_tps(),
            "rate-based run starting"
        );

        while start.elapsed() < duration && !self.stop_requested.load(Ordering::Relaxed) {
            self.rate_controller.acquire_permit().await;

            let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
            let task = self.factory.create(task_id);

            match self.executor.try_submit(task) {
                Some(handle) => {
                    let collector = self.collector.clone();
                    tokio::spawn(async move {
                        if let Ok(result) = handle.await {
                            collector.record_result(&result);
                        }
                    });
                }
                None => {
                    tokio::time::sleep(RATE_RUNNER_TRY_SUBMIT_BACKOFF).await;
                }
            }
        }

        self.stop_requested.store(true, Ordering::SeqCst);
        self.executor
            .await_completion(RATE_RUNNER_DRAIN_TIMEOUT)
            .await;
        self.executor.close().await;

        let actual_duration = start.elapsed();
        let snapshot = self.collector.snapshot();
        debug!(
            actual_duration_secs = actual_duration.as_secs_f64(),
            total_tasks = snapshot.total_tasks,
            "rate-based run complete"
        );

        TestResult {
            snapshot,
            actual_duration,
        }
    }

    fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.collector.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency_controller::ControllerMode;
    use crate::ramp::{LinearRamp, RampKind};
    use crate::task::{Task, TaskResult};
    use async_trait::async_trait as task_async_trait;

    struct NoopTask;

    #[task_async_trait]
    impl Task for NoopTask {
        async fn execute(&self) -> TaskResult {
            TaskResult::success(0, Duration::from_micros(100))
        }
    }

    struct NoopFactory;

    impl TaskFactory for NoopFactory {
        fn create(&self, _task_id: i64) -> Box<dyn Task> {
            Box::new(NoopTask)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_based_runner_converges_and_reports_duration() {
        let ramp = LinearRamp::new(5, 5, 1.0, 0.0).unwrap();
        let controller =
            ConcurrencyController::new(RampKind::Linear(ramp), ControllerMode::ConcurrencyBased, None)
                .unwrap();
        let collector = Arc::new(MetricsCollector::new());
        let executor = Arc::new(BoundedTaskExecutor::new(50));
        let runner = ConcurrencyBasedRunner::new(
            controller,
            Arc::new(NoopFactory),
            collector.clone(),
            executor,
        );

        let handle = tokio::spawn(async move { runner.run(Duration::from_millis(500)).await });
        tokio::time::advance(Duration::from_millis(600)).await;
        let result = handle.await.unwrap();

        assert!(result.actual_duration >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let ramp = LinearRamp::new(1, 1, 1.0, 0.0).unwrap();
        let controller =
            ConcurrencyController::new(RampKind::Linear(ramp), ControllerMode::ConcurrencyBased, None)
                .unwrap();
        let collector = Arc::new(MetricsCollector::new());
        let executor = Arc::new(BoundedTaskExecutor::new(10));
        let runner = ConcurrencyBasedRunner::new(
            controller,
            Arc::new(NoopFactory),
            collector,
            executor,
        );
        runner.stop();
        runner.stop();
    }
}
