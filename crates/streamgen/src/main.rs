//! streamgen - Demand-driven synthetic data streaming engine
//!
//! Generates synthetic records strictly on demand: the sink loop grants
//! credits one batch at a time, the producer generates exactly that many
//! records, and a reporter task logs throughput while the stream runs.
//!
//! # Usage
//!
//! ```bash
//! streamgen
//! streamgen --count 10000000 --batch-size 2048 --workers 8
//! ```

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, bail, ensure};
use clap::Parser;
use streamgen_metrics::{MetricsReporter, StreamMetrics};
use streamgen_producer::{
    DeliveryExecutor, ExecutorConfig, Producer, ProducerError, StreamEvent, Subscription,
    SyntheticGenerator, SyntheticRecord,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// streamgen - Demand-driven synthetic data streaming engine
#[derive(Parser, Debug)]
#[command(name = "streamgen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Total number of records to generate
    #[arg(short, long, default_value_t = 1_000_000)]
    count: u64,

    /// Demand credits granted per batch
    #[arg(short, long, default_value_t = 1000)]
    batch_size: u64,

    /// Worker threads for the delivery runtime
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Seconds between metrics progress reports
    #[arg(long, default_value_t = 5)]
    report_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.workers.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(run(cli))
}

/// How a streaming run ended
enum StreamOutcome {
    /// All records delivered
    Completed(u64),
    /// Producer signaled a terminal error
    Failed(ProducerError),
    /// Ctrl-C received, subscription cancelled
    Interrupted(u64),
}

async fn run(cli: Cli) -> Result<()> {
    ensure!(cli.batch_size > 0, "batch size must be positive");

    let metrics = Arc::new(StreamMetrics::new());
    let executor = Arc::new(DeliveryExecutor::new(ExecutorConfig::default()));
    let producer = Producer::new(
        cli.count,
        SyntheticGenerator::new(),
        Arc::clone(&metrics),
        Arc::clone(&executor),
    );

    let (tx, rx) = mpsc::channel(cli.batch_size as usize);
    let subscription = producer.subscribe(tx)?;

    let cancel = CancellationToken::new();
    let reporter = MetricsReporter::new(Arc::clone(&metrics))
        .with_interval(std::time::Duration::from_secs(cli.report_interval_secs.max(1)));
    let reporter_task = tokio::spawn(reporter.run(cancel.clone()));

    info!(
        count = cli.count,
        batch_size = cli.batch_size,
        workers = cli.workers,
        "streaming started"
    );

    let outcome = stream_batches(&subscription, rx, &metrics, cli.batch_size).await;

    // Stop the reporter (it logs the final summary) and drain the executor.
    cancel.cancel();
    let _ = reporter_task.await;

    let report = executor.shutdown().await;
    if !report.is_clean() {
        warn!(
            aborted = report.aborted,
            leaked = report.leaked,
            "executor shutdown was not clean"
        );
    }

    match outcome? {
        StreamOutcome::Completed(records) => {
            info!(records, "streaming complete");
            Ok(())
        }
        StreamOutcome::Interrupted(records) => {
            info!(records, "streaming interrupted");
            Ok(())
        }
        StreamOutcome::Failed(err) => {
            error!(error = %err, "streaming failed");
            bail!("streaming failed: {err}")
        }
    }
}

/// The batching sink loop
///
/// Grants `batch_size` credits, consumes that many items, records the batch
/// latency, and repeats until the producer signals a terminal event.
async fn stream_batches(
    subscription: &Subscription<SyntheticGenerator>,
    mut rx: mpsc::Receiver<StreamEvent<SyntheticRecord>>,
    metrics: &StreamMetrics,
    batch_size: u64,
) -> Result<StreamOutcome> {
    let mut received = 0u64;

    loop {
        subscription.request(batch_size);
        let batch_start = Instant::now();
        let mut in_batch = 0u64;

        while in_batch < batch_size {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupt received, cancelling subscription");
                    subscription.cancel();
                    return Ok(StreamOutcome::Interrupted(received));
                }
                event = rx.recv() => {
                    match event {
                        Some(StreamEvent::Item(_record)) => {
                            received += 1;
                            in_batch += 1;
                        }
                        Some(StreamEvent::Complete) => {
                            if in_batch > 0 {
                                metrics.record_batch_complete(batch_start.elapsed());
                            }
                            return Ok(StreamOutcome::Completed(received));
                        }
                        Some(StreamEvent::Error(err)) => {
                            return Ok(StreamOutcome::Failed(err));
                        }
                        None => bail!("producer channel closed without a terminal event"),
                    }
                }
            }
        }

        metrics.record_batch_complete(batch_start.elapsed());
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
