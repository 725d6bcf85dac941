//! # Design
//!
//! - Constant messages with the failing operation carried as a field.
//! - Sources are preserved and never re-logged at the call site.

use std::error::Error as StdError;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: tinytorrent_config::ConfigError,
    },
    /// The RPC server failed to start.
    #[error("rpc server operation failed")]
    Server {
        /// Operation identifier.
        operation: &'static str,
        /// Source server error.
        source: tinytorrent_server::ServerError,
    },
    /// Logging could not be installed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: tinytorrent_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn server(
        operation: &'static str,
        source: tinytorrent_server::ServerError,
    ) -> Self {
        Self::Server { operation, source }
    }

    pub(crate) fn telemetry(
        operation: &'static str,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Telemetry {
            operation,
            source: source.into(),
        }
    }
}
