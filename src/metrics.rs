//! Metrics collection: ingest `TaskResult`s from many concurrent producers,
//! produce a `MetricsSnapshot` on demand, with bounded memory.
//!
//! Tracker shape follows short `Mutex`-guarded critical sections with
//! lazily-evaluated stats and sliding aggregation, but the percentile
//! algorithm here is Algorithm R reservoir sampling rather than
//! `hdrhistogram`, because percentiles must equal a fixed latency exactly
//! once the reservoir saturates — log-linear histogram bucketing would
//! violate that.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::warn;

use crate::task::TaskResult;

/// Default reservoir capacity for latency percentile computation.
pub const DEFAULT_RESERVOIR_CAPACITY: usize = 10_000;
/// Default capacity of the timestamp ring used for sliding-window TPS.
pub const DEFAULT_TPS_RING_CAPACITY: usize = 100_000;
/// Default sliding window over which TPS is computed.
pub const DEFAULT_TPS_WINDOW: Duration = Duration::from_secs(5);
/// Maximum distinct error-kind keys retained before overflow into "OTHER".
pub const MAX_ERR_KINDS: usize = 100;
/// Maximum length (in bytes, char-boundary safe) of an error message used as a key.
pub const MAX_ERR_MSG_LEN: usize = 100;

const OVERFLOW_BUCKET: &str = "OTHER";

/// Percentile points reported in every snapshot.
pub const PERCENTILE_POINTS: [(&str, f64); 6] = [
    ("p50", 0.5),
    ("p75", 0.75),
    ("p90", 0.9),
    ("p95", 0.95),
    ("p99", 0.99),
    ("p999", 0.999),
];

/// Immutable point-in-time view of collected metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub start_time: Instant,
    pub elapsed: Duration,
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub tps: f64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
    /// Keyed by "p50", "p75", "p90", "p95", "p99", "p999"; latency in milliseconds.
    pub percentiles: BTreeMap<String, f64>,
    pub error_counts: HashMap<String, u64>,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
}

struct Reservoir {
    samples: Vec<u64>,
    capacity: usize,
    seen: u64,
}

impl Reservoir {
    fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            seen: 0,
        }
    }

    /// Algorithm R: the i-th observation (1-indexed) replaces a uniformly
    /// random existing slot with probability `capacity / i` once the
    /// reservoir is full.
    fn offer(&mut self, value: u64, rng: &mut impl Rng) {
        self.seen += 1;
        if self.samples.len() < self.capacity {
            self.samples.push(value);
            return;
        }
        let i = self.seen; // 1-indexed position of this observation
        let j = rng.gen_range(0..i);
        if (j as usize) < self.capacity {
            self.samples[j as usize] = value;
        }
    }
}

/// Aggregates `TaskResult`s from many concurrent producers with bounded
/// memory and produces `MetricsSnapshot`s on demand.
pub struct MetricsCollector {
    start_instant: Instant,
    total_tasks: AtomicU64,
    successful_tasks: AtomicU64,
    failed_tasks: AtomicU64,
    latency_sum_nanos: AtomicU64,
    min_latency_nanos: AtomicU64,
    max_latency_nanos: AtomicU64,
    reservoir: Mutex<Reservoir>,
    tps_ring: Mutex<VecDeque<Instant>>,
    tps_ring_capacity: usize,
    tps_window: Duration,
    error_counts: Mutex<HashMap<String, u64>>,
    closed: std::sync::atomic::AtomicBool,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_capacities(
            DEFAULT_RESERVOIR_CAPACITY,
            DEFAULT_TPS_RING_CAPACITY,
            DEFAULT_TPS_WINDOW,
        )
    }

    pub fn with_capacities(
        reservoir_capacity: usize,
        tps_ring_capacity: usize,
        tps_window: Duration,
    ) -> Self {
        Self {
            start_instant: Instant::now(),
            total_tasks: AtomicU64::new(0),
            successful_tasks: AtomicU64::new(0),
            failed_tasks: AtomicU64::new(0),
            latency_sum_nanos: AtomicU64::new(0),
            min_latency_nanos: AtomicU64::new(u64::MAX),
            max_latency_nanos: AtomicU64::new(0),
            reservoir: Mutex::new(Reservoir::new(reservoir_capacity)),
            tps_ring: Mutex::new(VecDeque::with_capacity(tps_ring_capacity.min(1024))),
            tps_ring_capacity,
            tps_window,
            error_counts: Mutex::new(HashMap::new()),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Non-blocking; safe to call from any worker.
    pub fn record_result(&self, result: &TaskResult) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }

        self.total_tasks.fetch_add(1, Ordering::Relaxed);
        if result.success {
            self.successful_tasks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_tasks.fetch_add(1, Ordering::Relaxed);
            if let Some(msg) = &result.error_message {
                self.record_error(msg);
            }
        }

        self.latency_sum_nanos
            .fetch_add(result.latency_nanos, Ordering::Relaxed);
        self.min_latency_nanos
            .fetch_min(result.latency_nanos, Ordering::Relaxed);
        self.max_latency_nanos
            .fetch_max(result.latency_nanos, Ordering::Relaxed);

        {
            let mut reservoir = self.reservoir.lock().unwrap();
            let mut rng = rand::thread_rng();
            reservoir.offer(result.latency_nanos, &mut rng);
        }

        {
            let now = Instant::now();
            let mut ring = self.tps_ring.lock().unwrap();
            ring.push_back(now);
            while ring.len() > self.tps_ring_capacity {
                ring.pop_front();
            }
        }
    }

    fn record_error(&self, message: &str) {
        let key = truncate_char_boundary(message, MAX_ERR_MSG_LEN);
        let mut counts = self.error_counts.lock().unwrap();
        if counts.contains_key(&key) || counts.len() < MAX_ERR_KINDS {
            *counts.entry(key).or_insert(0) += 1;
        } else {
            warn!(
                kind = %key,
                tracked = counts.len(),
                max = MAX_ERR_KINDS,
                "error-kind map at capacity, merging into OTHER"
            );
            *counts.entry(OVERFLOW_BUCKET.to_string()).or_insert(0) += 1;
        }
    }

    /// Callable at any time; returns a consistent-per-field, not
    /// cross-field-transactional, point-in-time view.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_tasks.load(Ordering::Relaxed);
        let successful = self.successful_tasks.load(Ordering::Relaxed);
        let failed = self.failed_tasks.load(Ordering::Relaxed);
        let latency_sum = self.latency_sum_nanos.load(Ordering::Relaxed);
        let min_nanos = self.min_latency_nanos.load(Ordering::Relaxed);
        let max_nanos = self.max_latency_nanos.load(Ordering::Relaxed);

        let elapsed = self.start_instant.elapsed();

        let success_rate = if total > 0 {
            successful as f64 / total as f64
        } else {
            0.0
        };

        let avg_latency_ms = if total > 0 {
            (latency_sum as f64 / total as f64) / 1_000_000.0
        } else {
            0.0
        };

        let tps = self.windowed_tps();

        let percentiles = self.compute_percentiles();

        let error_counts = self.error_counts.lock().unwrap().clone();

        MetricsSnapshot {
            start_time: self.start_instant,
            elapsed,
            total_tasks: total,
            successful_tasks: successful,
            failed_tasks: failed,
            tps,
            avg_latency_ms,
            success_rate,
            percentiles,
            error_counts,
            min_latency_ms: if min_nanos == u64::MAX {
                0.0
            } else {
                min_nanos as f64 / 1_000_000.0
            },
            max_latency_ms: max_nanos as f64 / 1_000_000.0,
        }
    }

    fn windowed_tps(&self) -> f64 {
        let now = Instant::now();
        let ring = self.tps_ring.lock().unwrap();
        let window_secs = self.tps_window.as_secs_f64();
        if window_secs <= 0.0 {
            return 0.0;
        }
        let count = ring
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) <= self.tps_window)
            .count();
        count as f64 / window_secs
    }

    fn compute_percentiles(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        let reservoir = self.reservoir.lock().unwrap();
        if reservoir.samples.is_empty() {
            return map;
        }
        let mut sorted = reservoir.samples.clone();
        drop(reservoir);
        sorted.sort_unstable();
        let n = sorted.len();
        for (label, p) in PERCENTILE_POINTS {
            let idx = ((p * n as f64).ceil() as usize).saturating_sub(1).min(n - 1);
            map.insert(label.to_string(), sorted[idx] as f64 / 1_000_000.0);
        }
        map
    }

    /// Releases sampling buffers. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reservoir.lock().unwrap().samples.clear();
        self.tps_ring.lock().unwrap().clear();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncates `s` to at most `max_len` bytes, backing off to the nearest
/// preceding char boundary so the result is always valid UTF-8.
fn truncate_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
