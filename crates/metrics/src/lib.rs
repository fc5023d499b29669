//! Streaming metrics
//!
//! Atomic counters for demand-driven streaming plus derived throughput rates.
//! Counter updates use relaxed ordering for minimal overhead on the hot path.
//!
//! # Thread Safety
//!
//! All `record_*` methods are safe to call from any number of threads without
//! external locking. `sample_rate` is the one exception: it reads and writes
//! the last-sample state, so it assumes a single dedicated sampler (typically
//! the [`MetricsReporter`] task). Concurrent samplers would not corrupt
//! memory, but the rates they compute would be meaningless.

mod reporter;

pub use reporter::MetricsReporter;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics for a demand-driven producer/sink pair
///
/// Monotonic counters track items, demand and backpressure; the rate state
/// tracks delivery throughput between samples.
#[derive(Debug)]
pub struct StreamMetrics {
    /// Items produced by the generator
    items_generated: AtomicU64,

    /// Items handed to the sink
    items_delivered: AtomicU64,

    /// Total demand credits granted by the sink
    demand_requested: AtomicU64,

    /// Times delivery stalled because demand drained to zero
    backpressure_pauses: AtomicU64,

    /// Sink-side batches completed
    batches_completed: AtomicU64,

    /// Cumulative batch processing time in nanoseconds
    batch_time_ns: AtomicU64,

    /// When metrics collection started
    start: Instant,

    /// Nanoseconds since `start` at the previous rate sample
    last_sample_ns: AtomicU64,

    /// Delivered count at the previous rate sample
    last_sampled_delivered: AtomicU64,

    /// Current delivery rate (f64 bit pattern)
    current_rate_bits: AtomicU64,

    /// Peak delivery rate (f64 bit pattern)
    peak_rate_bits: AtomicU64,
}

impl StreamMetrics {
    /// Create new metrics with all counters at zero
    pub fn new() -> Self {
        Self {
            items_generated: AtomicU64::new(0),
            items_delivered: AtomicU64::new(0),
            demand_requested: AtomicU64::new(0),
            backpressure_pauses: AtomicU64::new(0),
            batches_completed: AtomicU64::new(0),
            batch_time_ns: AtomicU64::new(0),
            start: Instant::now(),
            last_sample_ns: AtomicU64::new(0),
            last_sampled_delivered: AtomicU64::new(0),
            current_rate_bits: AtomicU64::new(0),
            peak_rate_bits: AtomicU64::new(0),
        }
    }

    /// Record an item produced by the generator
    #[inline]
    pub fn record_generated(&self) {
        self.items_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item handed to the sink
    #[inline]
    pub fn record_delivered(&self) {
        self.items_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record demand granted by the sink
    #[inline]
    pub fn record_requested(&self, n: u64) {
        self.demand_requested.fetch_add(n, Ordering::Relaxed);
    }

    /// Record a backpressure pause (demand drained to zero while work remains)
    #[inline]
    pub fn record_backpressure_pause(&self) {
        self.backpressure_pauses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed sink batch with its processing time
    #[inline]
    pub fn record_batch_complete(&self, duration: Duration) {
        self.batches_completed.fetch_add(1, Ordering::Relaxed);
        self.batch_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Update the current and peak delivery rates
    ///
    /// Computes items/sec since the previous sample. Call periodically from a
    /// single sampler task; returns the freshly computed rate.
    pub fn sample_rate(&self) -> f64 {
        let now_ns = self.start.elapsed().as_nanos() as u64;
        let delivered = self.items_delivered.load(Ordering::Relaxed);

        let last_ns = self.last_sample_ns.load(Ordering::Relaxed);
        let last_delivered = self.last_sampled_delivered.load(Ordering::Relaxed);

        let elapsed_ns = now_ns.saturating_sub(last_ns);
        if elapsed_ns > 0 {
            let delta = delivered.saturating_sub(last_delivered);
            let rate = delta as f64 / (elapsed_ns as f64 / 1_000_000_000.0);

            self.current_rate_bits
                .store(rate.to_bits(), Ordering::Relaxed);
            if rate > f64::from_bits(self.peak_rate_bits.load(Ordering::Relaxed)) {
                self.peak_rate_bits.store(rate.to_bits(), Ordering::Relaxed);
            }
        }

        self.last_sample_ns.store(now_ns, Ordering::Relaxed);
        self.last_sampled_delivered
            .store(delivered, Ordering::Relaxed);

        f64::from_bits(self.current_rate_bits.load(Ordering::Relaxed))
    }

    /// Get a snapshot of all metrics
    ///
    /// Fields are loaded individually, so the snapshot is eventually
    /// consistent across counters but each value is never torn.
    #[inline]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_generated: self.items_generated.load(Ordering::Relaxed),
            items_delivered: self.items_delivered.load(Ordering::Relaxed),
            demand_requested: self.demand_requested.load(Ordering::Relaxed),
            backpressure_pauses: self.backpressure_pauses.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batch_time_ns: self.batch_time_ns.load(Ordering::Relaxed),
            current_rate: f64::from_bits(self.current_rate_bits.load(Ordering::Relaxed)),
            peak_rate: f64::from_bits(self.peak_rate_bits.load(Ordering::Relaxed)),
        }
    }

    /// Demand granted but not yet satisfied
    ///
    /// Saturating: under correct protocol usage delivered never exceeds
    /// requested, since demand is recorded before the items it covers.
    #[inline]
    pub fn outstanding_demand(&self) -> u64 {
        let requested = self.demand_requested.load(Ordering::Relaxed);
        let delivered = self.items_delivered.load(Ordering::Relaxed);
        requested.saturating_sub(delivered)
    }

    /// Time since metrics collection started
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Average delivery rate over the entire run (items/sec)
    pub fn average_rate(&self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.items_delivered.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    // Direct accessors for individual counters (for logging)

    /// Get items generated count
    #[inline]
    pub fn items_generated(&self) -> u64 {
        self.items_generated.load(Ordering::Relaxed)
    }

    /// Get items delivered count
    #[inline]
    pub fn items_delivered(&self) -> u64 {
        self.items_delivered.load(Ordering::Relaxed)
    }

    /// Get total demand requested
    #[inline]
    pub fn demand_requested(&self) -> u64 {
        self.demand_requested.load(Ordering::Relaxed)
    }

    /// Get backpressure pause count
    #[inline]
    pub fn backpressure_pauses(&self) -> u64 {
        self.backpressure_pauses.load(Ordering::Relaxed)
    }

    /// Get completed batch count
    #[inline]
    pub fn batches_completed(&self) -> u64 {
        self.batches_completed.load(Ordering::Relaxed)
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of stream metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Items produced by the generator
    pub items_generated: u64,
    /// Items handed to the sink
    pub items_delivered: u64,
    /// Total demand credits granted
    pub demand_requested: u64,
    /// Backpressure pauses
    pub backpressure_pauses: u64,
    /// Sink batches completed
    pub batches_completed: u64,
    /// Cumulative batch processing time in nanoseconds
    pub batch_time_ns: u64,
    /// Delivery rate at the last sample (items/sec)
    pub current_rate: f64,
    /// Peak delivery rate observed (items/sec)
    pub peak_rate: f64,
}

impl MetricsSnapshot {
    /// Demand granted but not yet satisfied at snapshot time
    #[inline]
    pub fn outstanding_demand(&self) -> u64 {
        self.demand_requested.saturating_sub(self.items_delivered)
    }

    /// Average processing time per completed batch
    #[inline]
    pub fn avg_batch_time(&self) -> Duration {
        if self.batches_completed == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.batch_time_ns / self.batches_completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = StreamMetrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.items_generated, 0);
        assert_eq!(snapshot.items_delivered, 0);
        assert_eq!(snapshot.demand_requested, 0);
        assert_eq!(snapshot.backpressure_pauses, 0);
        assert_eq!(snapshot.batches_completed, 0);
        assert_eq!(snapshot.current_rate, 0.0);
        assert_eq!(snapshot.peak_rate, 0.0);
    }

    #[test]
    fn test_record_counters() {
        let metrics = StreamMetrics::new();

        metrics.record_generated();
        metrics.record_generated();
        metrics.record_delivered();
        metrics.record_requested(100);
        metrics.record_backpressure_pause();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.items_generated, 2);
        assert_eq!(snapshot.items_delivered, 1);
        assert_eq!(snapshot.demand_requested, 100);
        assert_eq!(snapshot.backpressure_pauses, 1);
    }

    #[test]
    fn test_record_batch_complete() {
        let metrics = StreamMetrics::new();

        metrics.record_batch_complete(Duration::from_millis(10));
        metrics.record_batch_complete(Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_completed, 2);
        assert_eq!(snapshot.batch_time_ns, 40_000_000);
        assert_eq!(snapshot.avg_batch_time(), Duration::from_millis(20));
    }

    #[test]
    fn test_avg_batch_time_zero_batches() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.avg_batch_time(), Duration::ZERO);
    }

    #[test]
    fn test_outstanding_demand() {
        let metrics = StreamMetrics::new();

        metrics.record_requested(100);
        for _ in 0..40 {
            metrics.record_delivered();
        }

        assert_eq!(metrics.outstanding_demand(), 60);
        assert_eq!(metrics.snapshot().outstanding_demand(), 60);
    }

    #[test]
    fn test_outstanding_demand_saturates() {
        // Delivered > requested should never happen under the protocol,
        // but the computation must not underflow if it does.
        let metrics = StreamMetrics::new();
        metrics.record_delivered();

        assert_eq!(metrics.outstanding_demand(), 0);
    }

    #[test]
    fn test_sample_rate() {
        let metrics = StreamMetrics::new();

        // First sample establishes a baseline.
        metrics.sample_rate();

        for _ in 0..1000 {
            metrics.record_delivered();
        }
        std::thread::sleep(Duration::from_millis(20));

        let rate = metrics.sample_rate();
        assert!(rate > 0.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.current_rate, rate);
        assert!(snapshot.peak_rate >= rate);
    }

    #[test]
    fn test_peak_rate_retained() {
        let metrics = StreamMetrics::new();

        for _ in 0..1000 {
            metrics.record_delivered();
        }
        std::thread::sleep(Duration::from_millis(10));
        metrics.sample_rate();
        let peak = metrics.snapshot().peak_rate;
        assert!(peak > 0.0);

        // No deliveries this interval: current drops, peak stays.
        std::thread::sleep(Duration::from_millis(10));
        metrics.sample_rate();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.current_rate, 0.0);
        assert_eq!(snapshot.peak_rate, peak);
    }

    #[test]
    fn test_average_rate() {
        let metrics = StreamMetrics::new();
        for _ in 0..100 {
            metrics.record_delivered();
        }
        std::thread::sleep(Duration::from_millis(10));

        assert!(metrics.average_rate() > 0.0);
        assert!(metrics.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = StreamMetrics::new();
        metrics.record_requested(10);
        metrics.record_delivered();

        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"demand_requested\":10"));
        assert!(json.contains("\"items_delivered\":1"));
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(StreamMetrics::new());
        let mut handles = vec![];

        for _ in 0..4 {
            let m = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    m.record_requested(1);
                    m.record_generated();
                    m.record_delivered();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.demand_requested, 4000);
        assert_eq!(snapshot.items_generated, 4000);
        assert_eq!(snapshot.items_delivered, 4000);
        assert_eq!(metrics.outstanding_demand(), 0);
    }
}
