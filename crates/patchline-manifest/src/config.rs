//! Updater configuration: mirrors, ignore masks, and custom components

use std::path::Path;
use tracing::{debug, warn};

use crate::store::IniStore;
use crate::{ContentId, Error, Result};

/// Primary configuration file, relative to the installation root
pub const CONFIG_PATH: &str = "Resources/UpdaterConfig.ini";

/// Legacy mirror list consulted when [`CONFIG_PATH`] is absent
pub const LEGACY_CONFIG_PATH: &str = "updateconfig.ini";

/// Masks applied when the config specifies none
pub const DEFAULT_IGNORE_MASKS: &[&str] = &[".rtf", ".txt", "Theme.ini", "gui_settings.xml"];

/// One download mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMirror {
    /// Base URL, always ending with `/`
    pub url: String,
    /// Display name; user priority settings refer to mirrors by name
    pub name: String,
    /// Human-readable location
    pub location: String,
}

impl UpdateMirror {
    /// Create a mirror, normalizing the URL to end with `/`
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        Self {
            url,
            name: name.into(),
            location: location.into(),
        }
    }
}

/// An optional downloadable module tracked by the same hash rules as
/// regular files but fetched only on demand.
#[derive(Debug, Clone, Default)]
pub struct CustomComponent {
    /// Identifier shared between the config and the manifest's `[AddOns]`
    pub ini_name: String,
    /// Name shown to the user
    pub display_name: String,
    /// URL path under the mirror, or an absolute URL
    pub download_path: String,
    /// Installation-relative destination path
    pub local_path: String,
    /// Whether `download_path` is a complete URL rather than mirror-relative
    pub download_path_is_absolute: bool,
    /// Suppresses the archive extension when building the download URL
    pub no_archive_extension_on_download_path: bool,

    /// Plaintext size reported by the server manifest, in kilobytes
    pub remote_size_kb: u64,
    /// Compressed size reported by the server manifest, in kilobytes
    pub remote_archive_size_kb: u64,
    /// Identifier the server manifest expects
    pub remote_identifier: Option<ContentId>,
    /// Identifier of the compressed form, when one is served
    pub remote_archive_identifier: Option<ContentId>,
    /// Identifier of the file currently on disk, if present
    pub local_identifier: Option<ContentId>,
    /// Whether the server serves a compressed form
    pub archived: bool,
    /// Whether a version check has filled the remote fields
    pub initialized: bool,
    /// Whether a download of this component is currently running
    pub is_being_downloaded: bool,
}

impl CustomComponent {
    /// Whether the on-disk copy is present but does not match the server
    pub fn outdated(&self, root: &Path) -> bool {
        if !root.join(&self.local_path).is_file() {
            return false;
        }
        match (&self.remote_identifier, &self.local_identifier) {
            (Some(remote), Some(local)) => remote != local,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Case-insensitive substring masks excluding paths from hash verification
#[derive(Debug, Clone)]
pub struct IgnoreMasks(Vec<String>);

impl IgnoreMasks {
    /// Build masks from config fields; empty input falls back to defaults
    pub fn new(masks: Vec<String>) -> Self {
        if masks.is_empty() {
            return Self::default();
        }
        Self(masks.into_iter().map(|m| m.to_ascii_uppercase()).collect())
    }

    /// Whether a path matches any mask.
    ///
    /// Masks are uppercased substring matches, not globs, despite the
    /// name the config format uses.
    pub fn matches(&self, path: &str) -> bool {
        let upper = path.to_ascii_uppercase();
        self.0.iter().any(|mask| upper.contains(mask))
    }
}

impl Default for IgnoreMasks {
    fn default() -> Self {
        Self(
            DEFAULT_IGNORE_MASKS
                .iter()
                .map(|m| m.to_ascii_uppercase())
                .collect(),
        )
    }
}

/// Parsed updater configuration
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Paths matching these masks are trusted by identifier during local
    /// verification instead of being rehashed
    pub ignore_masks: IgnoreMasks,
    /// Default mirror ordering; user priority is applied on top
    pub mirrors: Vec<UpdateMirror>,
    /// Optional components the user may install
    pub components: Vec<CustomComponent>,
}

impl UpdaterConfig {
    /// Parse the `UpdaterConfig.ini` dialect
    pub fn parse(store: &IniStore) -> Self {
        let ignore_masks = IgnoreMasks::new(
            store
                .section("Settings")
                .map(|s| {
                    s.get_list("IgnoreMasks")
                        .into_iter()
                        .filter(|m| !m.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        );

        let mut mirrors = Vec::new();
        if let Some(section) = store.section("DownloadMirrors") {
            for (key, value) in section.entries() {
                let fields: Vec<&str> = value.split(',').map(str::trim).collect();
                if fields.len() < 2 || fields[0].is_empty() {
                    warn!("malformed mirror entry {key:?}: {value:?}");
                    continue;
                }
                mirrors.push(UpdateMirror::new(
                    fields[0],
                    fields[1],
                    fields.get(2).copied().unwrap_or(""),
                ));
            }
        }

        let mut components = Vec::new();
        if let Some(section) = store.section("CustomComponents") {
            for (key, value) in section.entries() {
                let fields: Vec<&str> = value.split(',').map(str::trim).collect();
                if fields.len() < 4 {
                    warn!("malformed custom component entry {key:?}: {value:?}");
                    continue;
                }
                let download_path = fields[2].to_string();
                components.push(CustomComponent {
                    display_name: fields[0].to_string(),
                    ini_name: fields[1].to_string(),
                    download_path_is_absolute: is_absolute_url(&download_path),
                    download_path,
                    local_path: crate::canonical_path(fields[3]),
                    no_archive_extension_on_download_path: fields
                        .get(4)
                        .is_some_and(|f| parse_flag(f)),
                    ..CustomComponent::default()
                });
            }
        }

        Self {
            ignore_masks,
            mirrors,
            components,
        }
    }

    /// Parse the legacy `updateconfig.ini`: one `url,name,location` mirror
    /// per line, no sections.
    pub fn parse_legacy(text: &str) -> Self {
        let mut mirrors = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 2 || fields[0].is_empty() {
                continue;
            }
            mirrors.push(UpdateMirror::new(
                fields[0],
                fields[1],
                fields.get(2).copied().unwrap_or(""),
            ));
        }
        Self {
            ignore_masks: IgnoreMasks::default(),
            mirrors,
            components: Vec::new(),
        }
    }

    /// Load configuration from an installation root, falling back to the
    /// legacy mirror list when the primary file is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let primary = root.join(CONFIG_PATH);
        if primary.is_file() {
            let text = std::fs::read_to_string(&primary)?;
            debug!("loaded updater config from {}", primary.display());
            return Ok(Self::parse(&IniStore::parse(&text)));
        }

        let legacy = root.join(LEGACY_CONFIG_PATH);
        if legacy.is_file() {
            let text = std::fs::read_to_string(&legacy)?;
            debug!("loaded legacy mirror list from {}", legacy.display());
            return Ok(Self::parse_legacy(&text));
        }

        Err(Error::config_missing(root))
    }
}

fn is_absolute_url(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn parse_flag(field: &str) -> bool {
    matches!(field.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
