//! Error types for the transport layer.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tinytorrent_config::ConfigError;

/// Result alias for server lifecycle operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Failures raised while starting or stopping the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Options failed validation.
    #[error("invalid server options")]
    Config {
        /// Validation failure.
        #[from]
        source: ConfigError,
    },
    /// A configured header name is not a valid HTTP header.
    #[error("invalid header name")]
    InvalidHeader {
        /// Offending header name.
        name: String,
    },
    /// The listener could not bind the configured address.
    #[error("failed to bind rpc listener")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The bound socket did not report its local address.
    #[error("failed to read listener address")]
    LocalAddr {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// `start` was called on a server that is already running.
    #[error("server already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn bind_errors_keep_their_source() {
        let err = ServerError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 80)),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind rpc listener");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("in use"));
    }
}
