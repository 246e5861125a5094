//! Error types for manifest and configuration parsing

use std::path::PathBuf;
use thiserror::Error;

/// Error types for manifest and configuration handling
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while reading a manifest, config, or hashed file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest text is missing a required section
    #[error("manifest is missing the [{section}] section")]
    MissingSection {
        /// Name of the absent section
        section: &'static str,
    },

    /// Manifest text is missing a required key
    #[error("manifest is missing {key} in [{section}]")]
    MissingKey {
        /// Section the key was expected in
        section: &'static str,
        /// The absent key
        key: &'static str,
    },

    /// No updater configuration file was found
    #[error("no updater configuration found under {root}")]
    ConfigMissing {
        /// Installation root that was searched
        root: PathBuf,
    },
}

/// Result type for manifest and configuration operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a missing-section error
    pub fn missing_section(section: &'static str) -> Self {
        Self::MissingSection { section }
    }

    /// Create a missing-key error
    pub fn missing_key(section: &'static str, key: &'static str) -> Self {
        Self::MissingKey { section, key }
    }

    /// Create a config-missing error
    pub fn config_missing(root: impl Into<PathBuf>) -> Self {
        Self::ConfigMissing { root: root.into() }
    }
}
