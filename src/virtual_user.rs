//! Cooperative logical workers that loop over tasks until stopped.
//!
//! Grounded on `worker.rs::run_worker`'s closed loop (check-then-sleep,
//! cooperative cancellation), generalized from "HTTP GET in a loop" to
//! "pull a `Task` from a `TaskFactory`, execute it, record the result".

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::executor::panic_message;
use crate::metrics::MetricsCollector;
use crate::task::{TaskFactory, TaskResult};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// One running virtual user: a stop flag plus a handle to its loop task.
struct VirtualUserHandle {
    stop_flag: Arc<AtomicBool>,
    join_handle: JoinHandle<()>,
}

/// Owns the live set of virtual users and converges it to a target count.
/// Mutation of the user list is serialized behind a `tokio::sync::Mutex`
/// (held across `.await` during shutdown, matching `worker.rs`'s single
/// coordinating owner of worker lifetimes).
pub struct VirtualUserManager {
    factory: Arc<dyn TaskFactory>,
    collector: Arc<MetricsCollector>,
    global_stop: Arc<AtomicBool>,
    next_task_id: Arc<AtomicI64>,
    users: Mutex<Vec<VirtualUserHandle>>,
}

impl VirtualUserManager {
    pub fn new(factory: Arc<dyn TaskFactory>, collector: Arc<MetricsCollector>) -> Self {
        Self {
            factory,
            collector,
            global_stop: Arc::new(AtomicBool::new(false)),
            next_task_id: Arc::new(AtomicI64::new(0)),
            users: Mutex::new(Vec::new()),
        }
    }

    /// Starts or stops virtual users to converge on `target`. Stops come
    /// from the tail of the list (LIFO).
    pub async fn adjust_concurrency(&self, target: usize) {
        let mut users = self.users.lock().await;
        let current = users.len();

        if target > current {
            for _ in 0..(target - current) {
                users.push(self.spawn_virtual_user());
            }
            debug!(current, target, "scaled up virtual users");
        } else if target < current {
            for _ in 0..(current - target) {
                if let Some(handle) = users.pop() {
                    handle.stop_flag.store(true, Ordering::SeqCst);
                    handle.join_handle.abort();
                }
            }
            debug!(current, target, "scaled down virtual users");
        }
    }

    pub async fn current_count(&self) -> usize {
        self.users.lock().await.len()
    }

    fn spawn_virtual_user(&self) -> VirtualUserHandle {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let factory = self.factory.clone();
        let collector = self.collector.clone();
        let global_stop = self.global_stop.clone();
        let next_task_id = self.next_task_id.clone();
        let local_stop = stop_flag.clone();

        let join_handle = tokio::spawn(async move {
            run_virtual_user(factory, collector, global_stop, next_task_id, local_stop).await;
        });

        VirtualUserHandle {
            stop_flag,
            join_handle,
        }
    }

    /// Stops every user and awaits their completion with a bounded timeout.
    /// Never returns while any user is still observable in the list.
    pub async fn shutdown_all(&self) {
        self.shutdown_all_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    pub async fn shutdown_all_with_timeout(&self, timeout: Duration) {
        self.global_stop.store(true, Ordering::SeqCst);
        let mut users = self.users.lock().await;
        for handle in users.iter() {
            handle.stop_flag.store(true, Ordering::SeqCst);
        }

        let joins = users.drain(..).map(|handle| handle.join_handle);
        if tokio::time::timeout(timeout, futures::future::join_all(joins))
            .await
            .is_err()
        {
            warn!("one or more virtual users did not shut down within timeout");
        }
    }
}

async fn run_virtual_user(
    factory: Arc<dyn TaskFactory>,
    collector: Arc<MetricsCollector>,
    global_stop: Arc<AtomicBool>,
    next_task_id: Arc<AtomicI64>,
    stop_flag: Arc<AtomicBool>,
) {
    loop {
        if stop_flag.load(Ordering::Relaxed) || global_stop.load(Ordering::Relaxed) {
            break;
        }

        let task_id = next_task_id.fetch_add(1, Ordering::Relaxed);
        let task = factory.create(task_id);
        let started = Instant::now();
        // Run on its own inner task so a panic inside `execute()` surfaces as
        // a `JoinError` here instead of unwinding this virtual user's loop.
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
        collector.record_result(&result);
    }
    info!("virtual user loop exited");
}
