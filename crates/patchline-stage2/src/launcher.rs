//! Locating the client launcher after an update

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use patchline_updater::layout::{CLIENT_DEFINITIONS_PATH, install_path};

/// Launcher key consulted in the client definitions
#[cfg(windows)]
const LAUNCHER_KEY: &str = "LauncherExe=";
/// Launcher key consulted in the client definitions
#[cfg(not(windows))]
const LAUNCHER_KEY: &str = "UnixLauncherExe=";

/// Read `ClientDefinitions.ini` and resolve the configured launcher
/// path. The lookup is line-based: the single line starting with the
/// platform's launcher key wins, with any trailing `;` comment removed.
pub fn find_launcher(base: &Path) -> Result<PathBuf> {
    let path = install_path(base, CLIENT_DEFINITIONS_PATH);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;

    for line in text.lines() {
        if let Some(value) = line.trim().strip_prefix(LAUNCHER_KEY) {
            let value = value.split(';').next().unwrap_or("").trim();
            if value.is_empty() {
                break;
            }
            return Ok(install_path(base, &value.replace('\\', "/")));
        }
    }

    bail!("no {LAUNCHER_KEY} entry in {}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_definitions(base: &Path, text: &str) {
        let path = install_path(base, CLIENT_DEFINITIONS_PATH);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, text).expect("write");
    }

    #[test]
    fn finds_the_platform_launcher_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_definitions(
            dir.path(),
            "[Settings]\nLauncherExe=Launcher.exe\nUnixLauncherExe=launcher.sh ; comment\n",
        );

        let launcher = find_launcher(dir.path()).expect("launcher");
        #[cfg(windows)]
        assert_eq!(launcher, dir.path().join("Launcher.exe"));
        #[cfg(not(windows))]
        assert_eq!(launcher, dir.path().join("launcher.sh"));
    }

    #[test]
    fn missing_entry_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_definitions(dir.path(), "[Settings]\nClientName=Test\n");
        assert!(find_launcher(dir.path()).is_err());
    }

    #[test]
    fn missing_definitions_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(find_launcher(dir.path()).is_err());
    }
}
