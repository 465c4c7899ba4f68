//! Error types for fastest-address resolution

use thiserror::Error;

/// Result type alias for fastest-address operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving the fastest address
#[derive(Debug, Error)]
pub enum Error {
    /// No upstream produced a usable response
    #[error("upstream error: {0}")]
    Upstream(String),

    /// DNS message could not be built or encoded
    #[error("DNS error: {0}")]
    Dns(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
