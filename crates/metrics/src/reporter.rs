//! Periodic metrics reporter
//!
//! Samples delivery rates and logs a progress line at a fixed interval.
//! Runs as a tokio task until cancelled; on shutdown it logs a final
//! summary of the whole run.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::StreamMetrics;

/// Default reporting interval
const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Periodic reporter for [`StreamMetrics`]
///
/// Owns the single-sampler role: it is the only caller of
/// [`StreamMetrics::sample_rate`], so rate computations stay consistent.
pub struct MetricsReporter {
    metrics: Arc<StreamMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    /// Create a reporter with the default interval
    pub fn new(metrics: Arc<StreamMetrics>) -> Self {
        Self {
            metrics,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Set the reporting interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the reporter until cancellation
    ///
    /// Spawn this as a tokio task. Emits one progress line per tick and a
    /// final summary when the token is cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so the first report
        // covers a full interval.
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs(),
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                }
                _ = ticker.tick() => {
                    self.report_progress();
                }
            }
        }

        self.report_summary();
    }

    /// Log a single progress line
    fn report_progress(&self) {
        let rate = self.metrics.sample_rate();
        let snapshot = self.metrics.snapshot();

        info!(
            delivered = snapshot.items_delivered,
            rate_per_sec = format_args!("{:.0}", rate),
            peak_per_sec = format_args!("{:.0}", snapshot.peak_rate),
            outstanding_demand = snapshot.outstanding_demand(),
            backpressure_pauses = snapshot.backpressure_pauses,
            "streaming progress"
        );
    }

    /// Log the final run summary
    fn report_summary(&self) {
        self.metrics.sample_rate();
        let snapshot = self.metrics.snapshot();
        let elapsed = self.metrics.elapsed();

        info!(
            items_generated = snapshot.items_generated,
            items_delivered = snapshot.items_delivered,
            demand_requested = snapshot.demand_requested,
            backpressure_pauses = snapshot.backpressure_pauses,
            batches_completed = snapshot.batches_completed,
            elapsed_secs = format_args!("{:.2}", elapsed.as_secs_f64()),
            average_rate_per_sec = format_args!("{:.0}", self.metrics.average_rate()),
            peak_rate_per_sec = format_args!("{:.0}", snapshot.peak_rate),
            avg_batch_time_ms = format_args!("{:.2}", snapshot.avg_batch_time().as_secs_f64() * 1000.0),
            "metrics reporter shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_cancellation() {
        let metrics = Arc::new(StreamMetrics::new());
        let reporter =
            MetricsReporter::new(Arc::clone(&metrics)).with_interval(Duration::from_millis(10));

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        // Should exit when cancelled.
        reporter.run(cancel).await;
    }

    #[tokio::test]
    async fn test_reporter_samples_rates() {
        let metrics = Arc::new(StreamMetrics::new());
        let reporter =
            MetricsReporter::new(Arc::clone(&metrics)).with_interval(Duration::from_millis(10));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(reporter.run(cancel.clone()));

        for _ in 0..500 {
            metrics.record_delivered();
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        cancel.cancel();
        task.await.unwrap();

        // At least one tick sampled while deliveries were counted.
        assert!(metrics.snapshot().peak_rate > 0.0);
    }
}
