//! Trivial `Task` implementations used only by the demo binary, standing
//! in for the HTTP/gRPC clients the core deliberately does not implement.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;

use crate::task::{Task, TaskFactory, TaskResult};

/// Sleeps for a duration drawn uniformly from `[min, max]`, always
/// succeeding.
pub struct SleepTask {
    min: Duration,
    max: Duration,
}

impl SleepTask {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }
}

#[async_trait]
impl Task for SleepTask {
    async fn execute(&self) -> TaskResult {
        let started = Instant::now();
        let delay = if self.max > self.min {
            let extra = rand::thread_rng().gen_range(0..=(self.max - self.min).as_millis());
            self.min + Duration::from_millis(extra as u64)
        } else {
            self.min
        };
        tokio::time::sleep(delay).await;
        TaskResult::success(0, started.elapsed())
    }
}

pub struct SleepTaskFactory {
    min: Duration,
    max: Duration,
}

impl SleepTaskFactory {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }
}

impl TaskFactory for SleepTaskFactory {
    fn create(&self, _task_id: i64) -> Box<dyn Task> {
        Box::new(SleepTask::new(self.min, self.max))
    }
}

/// Burns CPU for roughly `iterations` busy-loop rounds, failing if the
/// running sum happens to land on a multiple of `fail_every` (when set),
/// so the demo binary's error-count reporting has something to show.
pub struct CpuBurnTask {
    iterations: u64,
    fail_every: Option<u64>,
}

impl CpuBurnTask {
    pub fn new(iterations: u64, fail_every: Option<u64>) -> Self {
        Self {
            iterations,
            fail_every,
        }
    }
}

#[async_trait]
impl Task for CpuBurnTask {
    async fn execute(&self) -> TaskResult {
        let started = Instant::now();
        let mut acc: u64 = 1;
        for i in 0..self.iterations {
            acc = acc.wrapping_mul(2654435761).wrapping_add(i);
        }
        let latency = started.elapsed();

        match self.fail_every {
            Some(n) if n > 0 && acc % n == 0 => {
                TaskResult::failure(0, latency, format!("cpu burn landed on multiple of {n}"))
            }
            _ => TaskResult::success(0, latency).with_payload_bytes(8),
        }
    }
}

pub struct CpuBurnTaskFactory {
    iterations: u64,
    fail_every: Option<u64>,
}

impl CpuBurnTaskFactory {
    pub fn new(iterations: u64, fail_every: Option<u64>) -> Self {
        Self {
            iterations,
            fail_every,
        }
    }
}

impl TaskFactory for CpuBurnTaskFactory {
    fn create(&self, _task_id: i64) -> Box<dyn Task> {
        Box::new(CpuBurnTask::new(self.iterations, self.fail_every))
    }
}
