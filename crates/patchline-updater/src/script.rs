//! Declarative pre-/post-update script interpreter
//!
//! Mirrors serve two optional scripts: `preupdateexec` runs before the
//! download loop, `updateexec` after it. Both are INI documents whose
//! sections mutate the installation. Sections are processed in a fixed
//! order and every operation logs and swallows its own failure, so one
//! bad key never aborts the rest of the script.

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use patchline_manifest::{IniStore, canonical_path};

use crate::layout::install_path;

/// Script fetched and run before the download loop
pub const PRE_UPDATE_SCRIPT: &str = "preupdateexec";

/// Script fetched and run after the download loop
pub const POST_UPDATE_SCRIPT: &str = "updateexec";

/// Sections in their processing order
const SECTION_ORDER: &[&str] = &[
    "Delete",
    "Rename",
    "RenameFolder",
    "RenameAndMerge",
    "DeleteFolder",
    "ForceDeleteFolder",
    "DeleteFolderIfEmpty",
    "CreateFolder",
];

/// Apply a parsed script to the installation rooted at `root`.
///
/// All paths in the script are installation-relative; missing sources
/// are ignored.
pub fn run_script(root: &Path, store: &IniStore) {
    for &section in SECTION_ORDER {
        let Some(section_store) = store.section(section) else {
            continue;
        };
        debug!("running script section [{section}] ({} keys)", section_store.len());
        for (key, value) in section_store.entries() {
            let result = match section {
                "Delete" => delete_file(root, key),
                "Rename" => rename_file(root, key, value),
                "RenameFolder" => rename_folder(root, key, value),
                "RenameAndMerge" => rename_and_merge(root, key, value),
                "DeleteFolder" | "ForceDeleteFolder" => delete_folder(root, key),
                "DeleteFolderIfEmpty" => delete_folder_if_empty(root, key),
                "CreateFolder" => create_folder(root, key),
                _ => Ok(()),
            };
            if let Err(e) = result {
                warn!("script step [{section}] {key:?} failed: {e}");
            }
        }
    }
}

fn delete_file(root: &Path, key: &str) -> std::io::Result<()> {
    let path = install_path(root, &canonical_path(key));
    if path.is_file() {
        debug!("script: deleting {}", path.display());
        fs::remove_file(path)?;
    }
    Ok(())
}

fn rename_file(root: &Path, key: &str, value: &str) -> std::io::Result<()> {
    let from = install_path(root, &canonical_path(key));
    if !from.is_file() {
        return Ok(());
    }
    let to = install_path(root, &canonical_path(value));
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!("script: renaming {} -> {}", from.display(), to.display());
    fs::rename(from, to)
}

fn rename_folder(root: &Path, key: &str, value: &str) -> std::io::Result<()> {
    let from = install_path(root, &canonical_path(key));
    if !from.is_dir() {
        return Ok(());
    }
    let to = install_path(root, &canonical_path(value));
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!("script: renaming folder {} -> {}", from.display(), to.display());
    fs::rename(from, to)
}

/// Move a directory onto `value`. When the destination already exists the
/// source's direct files are merged in: a file whose name is taken in the
/// destination is deleted from the source, every other file moves over.
fn rename_and_merge(root: &Path, key: &str, value: &str) -> std::io::Result<()> {
    let from = install_path(root, &canonical_path(key));
    if !from.is_dir() {
        return Ok(());
    }
    let to = install_path(root, &canonical_path(value));
    if !to.is_dir() {
        return rename_folder(root, key, value);
    }

    for entry in fs::read_dir(&from)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let target = to.join(entry.file_name());
        if target.exists() {
            debug!("script: merge dropping duplicate {}", entry.path().display());
            fs::remove_file(entry.path())?;
        } else {
            debug!(
                "script: merge moving {} -> {}",
                entry.path().display(),
                target.display()
            );
            fs::rename(entry.path(), target)?;
        }
    }
    Ok(())
}

fn delete_folder(root: &Path, key: &str) -> std::io::Result<()> {
    let path = install_path(root, &canonical_path(key));
    if path.is_dir() {
        debug!("script: deleting folder {}", path.display());
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

/// Delete a directory only when it holds no direct child files;
/// subdirectories do not count against emptiness.
fn delete_folder_if_empty(root: &Path, key: &str) -> std::io::Result<()> {
    let path = install_path(root, &canonical_path(key));
    if !path.is_dir() {
        return Ok(());
    }
    let has_files = fs::read_dir(&path)?
        .filter_map(std::result::Result::ok)
        .any(|e| e.file_type().is_ok_and(|t| t.is_file()));
    if !has_files {
        debug!("script: deleting empty folder {}", path.display());
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

fn create_folder(root: &Path, key: &str) -> std::io::Result<()> {
    let path = install_path(root, &canonical_path(key));
    if !path.exists() {
        debug!("script: creating folder {}", path.display());
        fs::create_dir_all(path)?;
    }
    Ok(())
}
