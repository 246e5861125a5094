//! Installation layout: well-known files and directories
//!
//! All constants are installation-root-relative with forward slashes;
//! [`install_path`] joins them onto the root for the running platform.

use std::path::{Path, PathBuf};

/// The local manifest
pub const VERSION_FILE: &str = "version";

/// Manifest downloaded during a check, promoted on finalize
pub const TEMP_VERSION_FILE: &str = "version_u";

/// Staging area mirroring the installation tree
pub const STAGING_DIR: &str = "Updater";

/// Directory holding the updater's own support files
pub const RESOURCES_DIR: &str = "Resources";

/// Extension of archived downloads
pub const ARCHIVE_EXT: &str = ".lzma";

/// Consulted by the second stage to locate the client launcher
pub const CLIENT_DEFINITIONS_PATH: &str = "Resources/ClientDefinitions.ini";

/// Staged theme file promoted into the INI directory on finalize
pub const STAGED_THEME_FILE: &str = "Theme_c.ini";

/// Destination of the staged theme file
pub const THEME_TARGET_PATH: &str = "INI/Theme.ini";

/// Log file written by the second stage, base-directory-relative
pub const SECOND_STAGE_LOG_PATH: &str = "Client/SecondStageUpdater.log";

/// File name of the second-stage binary
#[cfg(windows)]
pub const SECOND_STAGE_BIN: &str = "patchline-stage2.exe";
/// File name of the second-stage binary
#[cfg(not(windows))]
pub const SECOND_STAGE_BIN: &str = "patchline-stage2";

/// Join a forward-slash manifest path onto the installation root
pub fn install_path(root: &Path, relative: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in relative.split('/').filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path
}

/// Path of a file inside the staging directory
pub fn staging_path(root: &Path, relative: &str) -> PathBuf {
    install_path(&root.join(STAGING_DIR), relative)
}

/// Installed location of the second-stage binary
pub fn second_stage_path(root: &Path) -> PathBuf {
    root.join(RESOURCES_DIR).join(SECOND_STAGE_BIN)
}
