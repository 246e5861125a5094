//! Copying the staged tree over the live installation

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use patchline_updater::layout::{RESOURCES_DIR, SECOND_STAGE_BIN, VERSION_FILE};

use crate::console::Console;

/// Copy every staged file to its place under `base`, overwriting.
///
/// The second stage's own binary (at the base root or under
/// `Resources/`, extension-insensitive) and the `version` manifest are
/// skipped; the manifest is promoted separately once all content is in
/// place.
pub fn copy_staged_tree(base: &Path, staging: &Path, console: &Console) -> Result<()> {
    let own_stems = own_file_stems();
    debug!("own file stems: {own_stems:?}");

    for entry in WalkDir::new(staging) {
        let entry = entry.context("failed to enumerate the staging area")?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(staging)
            .context("staged file outside the staging area")?;
        let relative_str = relative.to_string_lossy().replace('\\', "/");

        if should_skip(&relative_str, &own_stems) {
            debug!("skipping {relative_str}");
            continue;
        }

        let target = base.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        std::fs::copy(entry.path(), &target)
            .with_context(|| format!("cannot update {relative_str}"))?;
        console.info(&format!("updated {relative_str}"));
    }

    Ok(())
}

/// Copy the staged manifest into place. Runs after the content copy so a
/// failed update never leaves a new manifest over old files.
pub fn promote_manifest(base: &Path, staging: &Path, console: &Console) {
    let staged = staging.join(VERSION_FILE);
    if !staged.is_file() {
        return;
    }
    match std::fs::copy(&staged, base.join(VERSION_FILE)) {
        Ok(_) => console.info("manifest promoted"),
        Err(e) => console.warn(&format!("could not promote the manifest: {e}")),
    }
}

/// File stems this process must never overwrite: its running executable
/// and the installed name of the second-stage binary.
fn own_file_stems() -> Vec<String> {
    let mut stems = vec![stem_of(SECOND_STAGE_BIN)];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(stem) = exe.file_stem().and_then(|s| s.to_str()) {
            let stem = stem.to_ascii_lowercase();
            if !stems.contains(&stem) {
                stems.push(stem);
            }
        }
    }
    stems
}

fn stem_of(name: &str) -> String {
    name.rsplit_once('.')
        .map_or(name, |(stem, _)| stem)
        .to_ascii_lowercase()
}

/// Whether a staged path must not be copied: the literal manifest name,
/// or one of the updater's own files at the base root or under
/// `Resources/`, compared without extension.
fn should_skip(relative: &str, own_stems: &[String]) -> bool {
    if relative == VERSION_FILE {
        return true;
    }

    let mut parts: Vec<&str> = relative.split('/').collect();
    let Some(name) = parts.pop() else {
        return false;
    };
    let shallow = parts.is_empty() || (parts.len() == 1 && parts[0] == RESOURCES_DIR);
    if !shallow {
        return false;
    }

    let stem = stem_of(name);
    own_stems.iter().any(|own| *own == stem)
}
