//! Demand-driven producer
//!
//! The producer generates items only when its subscriber has granted demand
//! for them. Demand lives in an atomic credit counter; delivery runs as a
//! single-flight loop on the [`DeliveryExecutor`], so `request` and `cancel`
//! never block regardless of how many threads call them concurrently.
//!
//! # Protocol
//!
//! - `subscribe` binds exactly one sink channel; a second attempt is
//!   rejected without disturbing the first.
//! - `request(n)` adds `n` credits and schedules delivery if it is idle.
//! - The delivery loop emits one [`StreamEvent::Item`] per credit, in strict
//!   cursor order, until credits run out (backpressure pause) or the target
//!   count is reached (`Complete`, exactly once).
//! - `cancel` is idempotent and honored at the next loop iteration.
//!
//! # Single-flight and lost wakeups
//!
//! The `delivering` gate is a compare-and-set flag, not a mutex: requesters
//! that lose the race return immediately, and their credits are picked up by
//! the running loop re-reading the shared counter each iteration. After the
//! loop releases the gate it re-checks demand and re-acquires the gate
//! itself if new credits landed in the release window, so a request racing
//! the loop's exit is never stranded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use streamgen_metrics::StreamMetrics;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::ProducerError;
use crate::executor::DeliveryExecutor;
use crate::generator::ItemGenerator;

/// Events delivered to the sink channel
///
/// `Complete` and `Error` are terminal: at most one of the two is ever sent,
/// and nothing follows it.
#[derive(Debug)]
pub enum StreamEvent<T> {
    /// An item, delivered in strict cursor order
    Item(T),
    /// All `target_count` items were delivered
    Complete,
    /// The subscription failed
    Error(ProducerError),
}

/// A producer that generates items on demand
///
/// Accepts a single subscriber; the subscriber drives generation by granting
/// demand through its [`Subscription`].
pub struct Producer<G: ItemGenerator> {
    target_count: u64,
    generator: Arc<G>,
    metrics: Arc<StreamMetrics>,
    executor: Arc<DeliveryExecutor>,
    subscribed: AtomicBool,
}

impl<G: ItemGenerator> Producer<G> {
    /// Create a producer that will generate `target_count` items
    pub fn new(
        target_count: u64,
        generator: G,
        metrics: Arc<StreamMetrics>,
        executor: Arc<DeliveryExecutor>,
    ) -> Self {
        Self {
            target_count,
            generator: Arc::new(generator),
            metrics,
            executor,
            subscribed: AtomicBool::new(false),
        }
    }

    /// Total number of items this producer will generate
    pub fn target_count(&self) -> u64 {
        self.target_count
    }

    /// Attach a subscriber
    ///
    /// Events are delivered to `sender` in order. Generation does not start
    /// until the subscriber grants demand via [`Subscription::request`].
    ///
    /// # Errors
    ///
    /// Returns [`ProducerError::AlreadySubscribed`] if a subscription already
    /// exists; the existing subscription is unaffected.
    pub fn subscribe(
        &self,
        sender: mpsc::Sender<StreamEvent<G::Item>>,
    ) -> Result<Subscription<G>, ProducerError> {
        if self
            .subscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("producer already has a subscriber, rejecting subscription");
            return Err(ProducerError::AlreadySubscribed);
        }

        debug!(
            target_count = self.target_count,
            "subscriber attached, awaiting demand"
        );

        Ok(Subscription {
            state: Arc::new(SubscriptionState {
                target_count: self.target_count,
                generator: Arc::clone(&self.generator),
                metrics: Arc::clone(&self.metrics),
                executor: Arc::clone(&self.executor),
                sender,
                demand: AtomicU64::new(0),
                cursor: AtomicU64::new(0),
                delivering: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
            }),
        })
    }
}

impl<G: ItemGenerator> std::fmt::Debug for Producer<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("target_count", &self.target_count)
            .field("subscribed", &self.subscribed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Handle for granting demand and cancelling
///
/// Cloneable so any number of threads can call [`request`](Self::request)
/// concurrently; all clones share one credit counter.
pub struct Subscription<G: ItemGenerator> {
    state: Arc<SubscriptionState<G>>,
}

impl<G: ItemGenerator> Clone for Subscription<G> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<G: ItemGenerator> Subscription<G> {
    /// Grant demand for `n` additional items
    ///
    /// Non-blocking: credits are added atomically and delivery is scheduled
    /// on the executor if idle. Calling with `n == 0` is a protocol
    /// violation that terminates the subscription with
    /// [`ProducerError::ZeroDemand`]. Requests after cancellation or a
    /// terminal signal are accepted and ignored.
    pub fn request(&self, n: u64) {
        // After cancellation no further callbacks reach the sink, violation
        // or not.
        if self.state.cancelled.load(Ordering::Acquire) {
            return;
        }

        if n == 0 {
            self.state.fail(ProducerError::ZeroDemand);
            return;
        }

        if self.state.terminated.load(Ordering::Acquire) {
            return;
        }

        self.state.metrics.record_requested(n);
        self.state.demand.fetch_add(n, Ordering::AcqRel);
        self.state.try_schedule();
    }

    /// Cancel the subscription
    ///
    /// Idempotent. The delivery loop observes the flag before producing each
    /// item; an item already being generated is delivered, nothing after it.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Whether a terminal signal (`Complete` or `Error`) has been emitted
    pub fn is_terminated(&self) -> bool {
        self.state.terminated.load(Ordering::Acquire)
    }
}

impl<G: ItemGenerator> std::fmt::Debug for Subscription<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("demand", &self.state.demand.load(Ordering::Relaxed))
            .field("cursor", &self.state.cursor.load(Ordering::Relaxed))
            .field("cancelled", &self.is_cancelled())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Shared state between the subscription handle and the delivery loop
struct SubscriptionState<G: ItemGenerator> {
    target_count: u64,
    generator: Arc<G>,
    metrics: Arc<StreamMetrics>,
    executor: Arc<DeliveryExecutor>,
    sender: mpsc::Sender<StreamEvent<G::Item>>,

    /// Outstanding demand credits
    demand: AtomicU64,

    /// Next item index; mutated only by the delivery loop
    cursor: AtomicU64,

    /// Single-flight gate for the delivery loop
    delivering: AtomicBool,

    /// One-way cancellation flag
    cancelled: AtomicBool,

    /// Set by whoever emits the terminal signal; at most one wins
    terminated: AtomicBool,
}

impl<G: ItemGenerator> SubscriptionState<G> {
    /// Schedule the delivery loop if it is idle
    fn try_schedule(self: &Arc<Self>) {
        if self
            .delivering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // A running loop will observe the added demand.
            return;
        }

        let state = Arc::clone(self);
        if !self.executor.spawn(async move { state.deliver().await }) {
            // Executor is shutting down; release the gate so a later
            // request can retry.
            self.delivering.store(false, Ordering::Release);
        }
    }

    /// The delivery loop: drains demand one item at a time
    ///
    /// Runs at most once concurrently per subscription (guarded by the
    /// `delivering` gate its scheduler acquired).
    async fn deliver(self: Arc<Self>) {
        loop {
            while self.demand.load(Ordering::Acquire) > 0
                && !self.cancelled.load(Ordering::Acquire)
                && !self.terminated.load(Ordering::Acquire)
            {
                let cursor = self.cursor.load(Ordering::Acquire);

                if cursor == self.target_count {
                    if !self.terminated.swap(true, Ordering::AcqRel) {
                        debug!(target_count = self.target_count, "generation complete");
                        let _ = self.sender.send(StreamEvent::Complete).await;
                    }
                    // Terminal: the gate stays held so late requests never
                    // schedule another loop.
                    return;
                }

                let item = match self.generator.generate(cursor) {
                    Ok(item) => item,
                    Err(e) => {
                        error!(index = cursor, error = %e, "item generation failed");
                        if !self.terminated.swap(true, Ordering::AcqRel) {
                            let _ = self
                                .sender
                                .send(StreamEvent::Error(ProducerError::Generate {
                                    index: cursor,
                                    source: e,
                                }))
                                .await;
                        }
                        return;
                    }
                };

                if self.sender.send(StreamEvent::Item(item)).await.is_err() {
                    // Receiver dropped; nobody is left to signal.
                    debug!(index = cursor, "sink channel closed, stopping delivery");
                    self.terminated.store(true, Ordering::Release);
                    return;
                }

                self.metrics.record_generated();
                self.metrics.record_delivered();
                self.cursor.store(cursor + 1, Ordering::Release);
                self.demand.fetch_sub(1, Ordering::AcqRel);
            }

            // Demand that drained exactly at the target is completion, not
            // a stall: emit the terminal signal here, since the while above
            // exits on empty demand before re-checking the cursor.
            if self.cursor.load(Ordering::Acquire) == self.target_count
                && !self.cancelled.load(Ordering::Acquire)
            {
                if !self.terminated.swap(true, Ordering::AcqRel) {
                    debug!(target_count = self.target_count, "generation complete");
                    let _ = self.sender.send(StreamEvent::Complete).await;
                }
                return;
            }

            // One pause per drain-to-zero while items remain undelivered.
            // Completion and cancellation are not pauses.
            if self.demand.load(Ordering::Acquire) == 0
                && !self.cancelled.load(Ordering::Acquire)
                && !self.terminated.load(Ordering::Acquire)
                && self.cursor.load(Ordering::Acquire) < self.target_count
            {
                self.metrics.record_backpressure_pause();
            }

            self.delivering.store(false, Ordering::Release);

            // Demand added between the drain check and the gate release
            // would otherwise be stranded until the next request.
            if self.demand.load(Ordering::Acquire) > 0
                && !self.cancelled.load(Ordering::Acquire)
                && !self.terminated.load(Ordering::Acquire)
                && self
                    .delivering
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                continue;
            }

            return;
        }
    }

    /// Terminate with a protocol-violation error
    ///
    /// The error event is sent from a spawned task so the caller never
    /// blocks; ordering after already-queued items is preserved by the
    /// channel.
    fn fail(self: &Arc<Self>, err: ProducerError) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        warn!(error = %err, "protocol violation, terminating subscription");

        let state = Arc::clone(self);
        if !self.executor.spawn(async move {
            let _ = state.sender.send(StreamEvent::Error(err)).await;
        }) {
            warn!("executor unavailable, terminal error signal dropped");
        }
    }
}

#[cfg(test)]
#[path = "producer_test.rs"]
mod tests;
