//! Server startup errors.

use thiserror::Error;

/// Failure to bring the listener up.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested `host:port`.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
