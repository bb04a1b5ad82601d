//! Wires a trivial sleep/CPU-burn task factory through a
//! `ConcurrencyBasedRunner` and prints the final snapshot. Exists to give
//! the crate a runnable surface; production task plugins (HTTP, gRPC, DB)
//! are the out-of-scope surrounding layer this binary stands in for.

use std::sync::Arc;
use std::time::Duration;

use loadcore::concurrency_controller::{ConcurrencyController, ControllerMode};
use loadcore::demo_tasks::SleepTaskFactory;
use loadcore::executor::BoundedTaskExecutor;
use loadcore::metrics::MetricsCollector;
use loadcore::ramp::{LinearRamp, RampKind};
use loadcore::runner::{ConcurrencyBasedRunner, TestRunner};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ramp = LinearRamp::new(5, 50, 10.0, 10.0).expect("valid ramp parameters");
    let controller = ConcurrencyController::new(
        RampKind::Linear(ramp),
        ControllerMode::ConcurrencyBased,
        None,
    )
    .expect("valid controller parameters");

    let factory = Arc::new(SleepTaskFactory::new(
        Duration::from_millis(5),
        Duration::from_millis(25),
    ));
    let collector = Arc::new(MetricsCollector::new());
    let executor = Arc::new(BoundedTaskExecutor::new(1_000));

    let runner = ConcurrencyBasedRunner::new(controller, factory, collector, executor);

    let result = runner.run(Duration::from_secs(20)).await;

    println!("actual_duration = {:?}", result.actual_duration);
    println!("total_tasks     = {}", result.snapshot.total_tasks);
    println!("successful      = {}", result.snapshot.successful_tasks);
    println!("failed          = {}", result.snapshot.failed_tasks);
    println!("success_rate    = {:.4}", result.snapshot.success_rate);
    println!("tps (window)    = {:.2}", result.snapshot.tps);
    println!("avg_latency_ms  = {:.2}", result.snapshot.avg_latency_ms);
    for (label, value) in &result.snapshot.percentiles {
        println!("{label:>6} = {value:.2} ms");
    }
    if !result.snapshot.error_counts.is_empty() {
        println!("errors:");
        for (kind, count) in &result.snapshot.error_counts {
            println!("  {kind}: {count}");
        }
    }
}
