//! Producer error types

use thiserror::Error;

/// Errors surfaced by the producer
///
/// Protocol violations (`AlreadySubscribed`, `ZeroDemand`) leave existing
/// state intact; `Generate` is terminal for the subscription that hit it.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// A subscription already exists for this producer
    #[error("producer already has a subscriber")]
    AlreadySubscribed,

    /// `request` was called with zero demand
    #[error("requested demand must be positive")]
    ZeroDemand,

    /// The generator failed to produce an item
    #[error("failed to generate item at index {index}")]
    Generate {
        /// Cursor position at which generation failed
        index: u64,
        /// Underlying generator error
        #[source]
        source: GenerateError,
    },
}

/// Error raised by an [`ItemGenerator`](crate::ItemGenerator) implementation
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GenerateError {
    message: String,
}

impl GenerateError {
    /// Create a generator error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for producer operations
pub type Result<T> = std::result::Result<T, ProducerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProducerError::AlreadySubscribed;
        assert!(err.to_string().contains("already has a subscriber"));

        let err = ProducerError::ZeroDemand;
        assert!(err.to_string().contains("positive"));

        let err = ProducerError::Generate {
            index: 42,
            source: GenerateError::new("boom"),
        };
        assert!(err.to_string().contains("index 42"));

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "boom");
    }
}
