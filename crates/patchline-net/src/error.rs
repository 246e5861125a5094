//! Error types for transport operations

use thiserror::Error;

/// Error types for transport and mirror operations
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// All mirrors were tried without success
    #[error("cannot connect to any update mirror")]
    MirrorsExhausted,

    /// IO error while writing the destination file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled through its token
    #[error("download cancelled")]
    Cancelled,
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a status-code error
    pub fn http_status(status: u16, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    /// Whether the error is a cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
