//! Error types for engine operations.

use std::error::Error;

use thiserror::Error;

/// Primary error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation is not supported by the underlying engine.
    #[error("engine operation not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Operation failed in the underlying engine.
    #[error("engine operation failed")]
    OperationFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Torrent identifier when available.
        torrent_id: Option<i64>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Torrent was not found.
    #[error("torrent not found")]
    NotFound {
        /// Missing torrent identifier.
        torrent_id: i64,
    },
    /// The engine has been stopped and no longer accepts commands.
    #[error("engine stopped")]
    Stopped,
}

impl EngineError {
    /// Operation identifier attached to the failure, when one exists.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Unsupported { operation } | Self::OperationFailed { operation, .. } => {
                Some(operation)
            }
            Self::NotFound { .. } | Self::Stopped => None,
        }
    }
}

/// Convenience alias for engine operation results.
pub type EngineResult<T> = Result<T, EngineError>;
