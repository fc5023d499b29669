//! Demand-driven producer core
//!
//! A producer that never generates more items than its subscriber has
//! requested, implemented so that requests and production can race
//! concurrently without losing, duplicating or reordering demand credits.
//!
//! # Architecture
//!
//! ```text
//! [Sink]                          [Producer]
//!   subscribe(tx) ───────────────→ single-subscriber gate
//!   request(n) ──→ atomic credits ──→ CAS single-flight gate
//!                                       │
//!                              [DeliveryExecutor task]
//!                                       │ generate(cursor)
//!   rx ←── StreamEvent::Item ───────────┘  (strict cursor order)
//!   rx ←── StreamEvent::Complete | Error   (exactly once)
//! ```
//!
//! # Key Design
//!
//! - **Non-blocking demand**: `request`/`cancel` are lock-free counter and
//!   flag updates; generation always runs on the executor, never on the
//!   caller's thread.
//! - **Single-flight delivery**: a compare-and-set gate guarantees at most
//!   one delivery loop per subscription, with a post-release demand re-check
//!   so no request is ever lost to the idle transition.
//! - **Closed event set**: the sink receives `Item`/`Complete`/`Error`
//!   variants over an ordered channel, making exhaustive handling trivial.
//! - **Bounded shutdown**: the executor waits gracefully, then aborts, then
//!   logs what it could not reclaim.

mod error;
mod executor;
mod generator;
mod producer;

pub use error::{GenerateError, ProducerError, Result};
pub use executor::{DeliveryExecutor, ExecutorConfig, ShutdownReport};
pub use generator::{ItemGenerator, SyntheticGenerator, SyntheticRecord};
pub use producer::{Producer, StreamEvent, Subscription};

/// Default sink channel capacity
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;
