//! Version state machine values

use std::fmt;

/// Where the installation stands relative to the server.
///
/// Only the orchestrator writes this value; hosts observe transitions
/// through [`crate::UpdateObserver::version_state_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum VersionState {
    /// No successful version check has happened yet
    #[default]
    Unknown,
    /// Local and server game versions match
    UpToDate,
    /// The server publishes a different game version
    Outdated,
    /// The local tree cannot be matched to any known manifest
    Mismatched,
    /// A version check is running
    UpdateCheckInProgress,
    /// An update is running
    UpdateInProgress,
}

impl VersionState {
    /// Whether a check or update is currently running
    pub fn in_progress(self) -> bool {
        matches!(self, Self::UpdateCheckInProgress | Self::UpdateInProgress)
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::UpToDate => "up to date",
            Self::Outdated => "outdated",
            Self::Mismatched => "mismatched",
            Self::UpdateCheckInProgress => "checking for updates",
            Self::UpdateInProgress => "updating",
        };
        f.write_str(name)
    }
}
