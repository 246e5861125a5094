//! Manifest and configuration formats for the patchline updater
//!
//! This crate covers everything the updater reads from disk or from a
//! mirror before any network planning happens:
//!
//! - [`ContentId`]: the textual content identifier used throughout the
//!   manifest format, plus streaming file hashing
//! - [`IniStore`]: the tolerant sectioned key/value dialect shared by the
//!   `version` manifest, `UpdaterConfig.ini`, and the update scripts
//! - [`Manifest`]: the parsed `version` file: tracked files, archive
//!   metadata, add-on entries, and version strings
//! - [`UpdaterConfig`]: mirrors, ignore masks, and custom components,
//!   including the legacy `updateconfig.ini` fallback

#![warn(missing_docs)]

mod config;
mod error;
mod ident;
mod manifest;
mod store;

pub use config::{
    CONFIG_PATH, CustomComponent, DEFAULT_IGNORE_MASKS, IgnoreMasks, LEGACY_CONFIG_PATH,
    UpdateMirror, UpdaterConfig,
};
pub use error::{Error, Result};
pub use ident::{ContentId, hash_file, hash_reader};
pub use manifest::{AddOnEntry, FileEntry, Manifest, VERSION_NONE, canonical_path};
pub use store::{IniSection, IniStore};
