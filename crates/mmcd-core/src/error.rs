//! Common error type for sample sources

use thiserror::Error;

/// Result type for sample source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors a sample source can report for one poll cycle
///
/// Lower layers (transport, protocol) convert their own errors into this
/// type so the sampling engine can treat every source the same way.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The serial line or its driver failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The ECU answered, but not the way the protocol requires
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The ECU did not answer within the deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Every slot queried in the cycle failed
    #[error("No response from ECU: {attempted} queries failed")]
    NoResponse {
        /// Number of slots that were queried
        attempted: usize,
    },

    /// None of the requested slots can be queried, so nothing was polled
    #[error("No queryable sensor selected")]
    NothingToPoll,
}

impl SourceError {
    /// Returns true when the error suggests the device is gone rather than
    /// a single garbled exchange
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            SourceError::Transport(_) | SourceError::NoResponse { .. }
        )
    }
}
