//! Error types for the trading coordinator.

use thiserror::Error;

/// Error taxonomy shared by adapters, routing, and portfolio services.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Malformed request: unknown instrument, non-positive amount,
    /// notional above the configured cap.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credentials or signature rejected by the venue.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport failure or timeout before a definitive venue answer.
    #[error("Network error: {0}")]
    Network(String),

    /// The venue received the order and refused it.
    #[error("Order rejected by {venue}: {reason}")]
    Rejected { venue: String, reason: String },

    /// The idempotency key has already been used for an order.
    #[error("Duplicate client key: {0}")]
    DuplicateClientKey(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ExchangeError {
    /// Whether a caller may safely retry the operation.
    ///
    /// Only transport failures qualify, and only for reads. Order
    /// submission is never auto-retried even on network errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Network(_))
    }
}

/// Result type alias for coordinator operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
