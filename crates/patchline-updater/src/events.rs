//! Host-observable update events
//!
//! The hosting shell passes one observer into the orchestrator at
//! construction. All methods default to no-ops so hosts implement only
//! what they surface. Callbacks arrive on the task running the check or
//! update; implementations should hand work to their own event loop
//! rather than block.

use crate::{UpdateError, VersionState};

/// Receiver for orchestrator events
pub trait UpdateObserver: Send + Sync {
    /// The version state changed
    fn version_state_changed(&self, _state: VersionState) {}

    /// A version check refreshed file and component identifiers
    fn file_identifiers_updated(&self) {}

    /// Progress of the local verification pass before an update
    fn local_file_check_progress(&self, _done: usize, _total: usize) {}

    /// The local verification pass finished
    fn local_file_versions_checked(&self) {}

    /// A version check found installed custom components that are outdated
    fn custom_components_outdated(&self, _ini_names: &[String]) {}

    /// Byte-level progress of the running download
    fn update_progress(&self, _current_file: &str, _file_percent: u32, _total_percent: u32) {}

    /// One planned file finished its pipeline. Carries the archive file
    /// name when the download was served compressed.
    fn file_download_completed(&self, _archive_name: Option<&str>) {}

    /// The update finished without requiring a restart
    fn update_completed(&self) {}

    /// The update aborted with an error
    fn update_failed(&self, _error: &UpdateError) {}

    /// Staged files are ready; the host should exit so the second stage
    /// can replace locked files
    fn restart(&self) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl UpdateObserver for NullObserver {}
