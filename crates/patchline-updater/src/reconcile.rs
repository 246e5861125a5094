//! Three-way reconciliation between the local tree, the local manifest,
//! and the server manifest

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, trace, warn};

use patchline_manifest::{CustomComponent, FileEntry, IgnoreMasks, Manifest, hash_file};

use crate::layout::install_path;

/// An ordered download plan: the server entries that need fetching and
/// the total transfer size.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Entries to download, in server-manifest order
    pub entries: Vec<FileEntry>,
    /// Sum of each entry's transfer size (archive size when archived)
    pub total_kb: u64,
}

impl Plan {
    /// Whether nothing needs downloading
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of planned entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn push(&mut self, entry: FileEntry) {
        self.total_kb += entry.download_size_kb();
        self.entries.push(entry);
    }
}

/// Build the download plan for one server manifest.
///
/// Per server entry: a matching local-manifest record decides by
/// identifier comparison (with a missing physical file always enqueued);
/// without a record the physical file is probed and hashed, and a hash
/// failure counts as not intact.
pub fn build_plan(root: &Path, local: Option<&Manifest>, server: &Manifest) -> Plan {
    let local_index: HashMap<&str, &FileEntry> = local
        .map(|m| m.files.iter().map(|f| (f.path.as_str(), f)).collect())
        .unwrap_or_default();

    let mut plan = Plan::default();
    for entry in &server.files {
        let physical = install_path(root, &entry.path);

        if let Some(known) = local_index.get(entry.path.as_str()) {
            if !physical.is_file() {
                trace!("{}: tracked but missing on disk", entry.path);
                plan.push(entry.clone());
            } else if known.identifier != entry.identifier {
                trace!("{}: manifest identifier differs", entry.path);
                plan.push(entry.clone());
            }
            continue;
        }

        if physical.is_file() {
            match hash_file(&physical) {
                Ok(actual) if actual == entry.identifier => {}
                Ok(_) => {
                    trace!("{}: untracked file differs from server", entry.path);
                    plan.push(entry.clone());
                }
                Err(e) => {
                    warn!("{}: identifier unavailable ({e}), enqueueing", entry.path);
                    plan.push(entry.clone());
                }
            }
        } else {
            trace!("{}: absent", entry.path);
            plan.push(entry.clone());
        }
    }

    debug!(
        "plan: {} of {} files, {} kB",
        plan.len(),
        server.files.len(),
        plan.total_kb
    );
    plan
}

/// Repair the local manifest against the physical tree before planning.
///
/// Entries matching an ignore mask are trusted by identifier and left
/// untouched. Every other entry is dropped when its file is missing, or
/// rehashed with the actual identifier written back, repairing a stale
/// local manifest. Reports `(done, total)` through `on_progress`.
pub fn verify_local_files<F>(
    root: &Path,
    manifest: &mut Manifest,
    masks: &IgnoreMasks,
    mut on_progress: F,
) where
    F: FnMut(usize, usize),
{
    let total = manifest.files.len();
    let mut done = 0usize;

    manifest.files.retain_mut(|entry| {
        done += 1;
        on_progress(done, total);

        if masks.matches(&entry.path) {
            return true;
        }

        let physical = install_path(root, &entry.path);
        if !physical.is_file() {
            trace!("{}: dropped from local manifest (missing)", entry.path);
            return false;
        }

        match hash_file(&physical) {
            Ok(actual) => {
                if actual != entry.identifier {
                    trace!("{}: repairing stale local identifier", entry.path);
                    entry.identifier = actual;
                }
                true
            }
            Err(e) => {
                warn!("{}: identifier unavailable ({e}), dropping", entry.path);
                false
            }
        }
    });
}

/// Names of installed components whose on-disk copy no longer matches
/// the server.
pub fn outdated_components(root: &Path, components: &[CustomComponent]) -> Vec<String> {
    components
        .iter()
        .filter(|c| c.outdated(root))
        .map(|c| c.ini_name.clone())
        .collect()
}
