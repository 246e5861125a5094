//! Error types for the update engine

use thiserror::Error;

/// Error types for update operations
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Manifest or configuration problem
    #[error(transparent)]
    Manifest(#[from] patchline_manifest::Error),

    /// Transport problem, including mirror exhaustion
    #[error(transparent)]
    Transport(#[from] patchline_net::Error),

    /// Archive decoding problem
    #[error("decompression failed: {0}")]
    Decompress(#[from] patchline_lzma::Error),

    /// A downloaded file did not hash to its manifest identifier
    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Manifest path of the file
        path: String,
        /// Identifier the manifest expects
        expected: String,
        /// Identifier the downloaded bytes produced
        actual: String,
    },

    /// The same file failed twice in a row
    #[error("too many retries downloading {path}")]
    TooManyRetries {
        /// Manifest path of the file
        path: String,
    },

    /// Filesystem operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The update was cancelled through its token
    #[error("update cancelled")]
    Cancelled,

    /// Another check or update is already in flight
    #[error("cannot {operation} while another update operation is running")]
    Busy {
        /// The rejected operation
        operation: &'static str,
    },

    /// The server requires a newer updater; files must not be touched
    #[error("a manual update is required")]
    ManualUpdateRequired,

    /// A component download was requested before a version check filled
    /// in its server-side fields
    #[error("component {name} is not known or has no server information yet")]
    ComponentUnavailable {
        /// The component's `ini_name`
        name: String,
    },
}

/// Result type for update operations
pub type Result<T> = std::result::Result<T, UpdateError>;

impl UpdateError {
    /// Create a hash-mismatch error
    pub fn hash_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::HashMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a too-many-retries error
    pub fn too_many_retries(path: impl Into<String>) -> Self {
        Self::TooManyRetries { path: path.into() }
    }

    /// Create a busy error
    pub fn busy(operation: &'static str) -> Self {
        Self::Busy { operation }
    }

    /// Whether the error is a cooperative cancellation, possibly wrapped
    /// by the transport or the decoder
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Transport(e) => e.is_cancelled(),
            Self::Decompress(e) => matches!(e, patchline_lzma::Error::Cancelled),
            _ => false,
        }
    }
}
