//! Item generation
//!
//! Generators map a monotonically increasing index to an item. They hold no
//! shared mutable state (per-call randomness is fine), so generation is
//! trivially parallelizable even though the delivery loop invokes it
//! serially.

use uuid::Uuid;

use crate::error::GenerateError;

/// Maps an index to a produced item
///
/// Implementations must be pure with respect to shared state: two calls with
/// the same index may differ (randomness), but a call must not observe or
/// mutate anything outside its own arguments.
pub trait ItemGenerator: Send + Sync + 'static {
    /// The item type produced
    type Item: Send + 'static;

    /// Generate the item at `index`
    ///
    /// # Errors
    ///
    /// A generation failure is terminal for the subscription driving it.
    fn generate(&self, index: u64) -> Result<Self::Item, GenerateError>;
}

/// A synthetic record with a numeric key, a label and a value
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRecord {
    /// Record key (the generation index)
    pub id: i64,
    /// Human-readable label, unique per record
    pub label: String,
    /// Random value in `[0, 1000)`
    pub amount: f64,
}

/// Generator for [`SyntheticRecord`]s
///
/// Labels embed the index plus a short random suffix so records are unique
/// even across runs; amounts are uniform random.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticGenerator;

impl SyntheticGenerator {
    /// Create a new synthetic generator
    pub fn new() -> Self {
        Self
    }
}

impl ItemGenerator for SyntheticGenerator {
    type Item = SyntheticRecord;

    fn generate(&self, index: u64) -> Result<SyntheticRecord, GenerateError> {
        let suffix = Uuid::new_v4().simple().to_string();

        Ok(SyntheticRecord {
            id: index as i64,
            label: format!("label_{}_{}", index, &suffix[..8]),
            amount: rand::random::<f64>() * 1000.0,
        })
    }
}
