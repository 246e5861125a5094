//! The `version` manifest: tracked files, archive metadata, and add-ons

use std::fmt::Write as _;
use std::path::Path;
use tracing::warn;

use crate::store::IniStore;
use crate::{ContentId, Error, Result};

/// Section holding the version strings and the manual-download URL
const INFO_SECTION: &str = "DTA";
/// Section mapping tracked paths to `identifier,size_kb`
const FILE_SECTION: &str = "FileVersions";
/// Section mapping archived paths to `archive_identifier,archive_size_kb`
const ARCHIVE_SECTION: &str = "ArchivedFiles";
/// Section mapping add-on names to `identifier,size_kb`
const ADDON_SECTION: &str = "AddOns";

/// Version string meaning "not applicable"
pub const VERSION_NONE: &str = "N/A";

/// One tracked file record from a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Installation-relative path, forward-slash canonical
    pub path: String,
    /// Content identifier of the plaintext file
    pub identifier: ContentId,
    /// Plaintext size in kilobytes, 0 if unknown
    pub size_kb: u64,
    /// Identifier of the compressed form, when one is served
    pub archive_identifier: Option<ContentId>,
    /// Compressed size in kilobytes, 0 if not archived
    pub archive_size_kb: u64,
}

impl FileEntry {
    /// Whether a compressed form of this file is served
    pub fn archived(&self) -> bool {
        self.archive_identifier
            .as_ref()
            .is_some_and(|id| !id.is_empty())
    }

    /// Kilobytes that fetching this entry will transfer
    pub fn download_size_kb(&self) -> u64 {
        if self.archived() {
            self.archive_size_kb
        } else {
            self.size_kb
        }
    }
}

/// One add-on record from the manifest's `[AddOns]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOnEntry {
    /// Component identifier matching `UpdaterConfig.ini`
    pub ini_name: String,
    /// Content identifier of the plaintext file
    pub identifier: ContentId,
    /// Plaintext size in kilobytes
    pub size_kb: u64,
    /// Identifier of the compressed form, when one is served
    pub archive_identifier: Option<ContentId>,
    /// Compressed size in kilobytes
    pub archive_size_kb: u64,
}

impl AddOnEntry {
    /// Whether a compressed form of this add-on is served
    pub fn archived(&self) -> bool {
        self.archive_identifier
            .as_ref()
            .is_some_and(|id| !id.is_empty())
    }
}

/// An immutable-by-convention snapshot of one `version` file.
///
/// Each version check parses a fresh snapshot; entries inside a download
/// plan are replaced, never patched in place. The one sanctioned mutation
/// is the local-verification pass, which repairs stale identifiers in the
/// *local* snapshot before a plan is rebuilt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    /// Game version string; equality with the server's value is the
    /// update trigger
    pub game_version: String,
    /// Updater version string; divergence forces a manual update
    pub updater_version: String,
    /// URL surfaced to the user when a manual update is required
    pub manual_download_url: String,
    /// Tracked files
    pub files: Vec<FileEntry>,
    /// Optional downloadable modules
    pub add_ons: Vec<AddOnEntry>,
}

impl Manifest {
    /// Parse a manifest document.
    ///
    /// A document without a `[DTA]` `Version` key is malformed. Individual
    /// file lines with fewer than two comma-separated fields are logged
    /// and skipped rather than failing the whole manifest.
    pub fn parse(text: &str) -> Result<Self> {
        let store = IniStore::parse(text);

        let info = store
            .section(INFO_SECTION)
            .ok_or_else(|| Error::missing_section(INFO_SECTION))?;
        let game_version = info
            .get("Version")
            .ok_or_else(|| Error::missing_key(INFO_SECTION, "Version"))?
            .to_string();
        let updater_version = info
            .get("UpdaterVersion")
            .unwrap_or(VERSION_NONE)
            .to_string();
        let manual_download_url = info.get("ManualDownloadURL").unwrap_or("").to_string();

        let mut files = Vec::new();
        if let Some(section) = store.section(FILE_SECTION) {
            for (key, value) in section.entries() {
                let path = canonical_path(key);
                let Some((identifier, size_kb)) = parse_id_size(&path, value) else {
                    continue;
                };
                let (archive_identifier, archive_size_kb) =
                    archive_fields(&store, key).unwrap_or((None, 0));
                files.push(FileEntry {
                    path,
                    identifier,
                    size_kb,
                    archive_identifier,
                    archive_size_kb,
                });
            }
        }

        let mut add_ons = Vec::new();
        if let Some(section) = store.section(ADDON_SECTION) {
            for (key, value) in section.entries() {
                let Some((identifier, size_kb)) = parse_id_size(key, value) else {
                    continue;
                };
                let (archive_identifier, archive_size_kb) =
                    archive_fields(&store, key).unwrap_or((None, 0));
                add_ons.push(AddOnEntry {
                    ini_name: key.to_string(),
                    identifier,
                    size_kb,
                    archive_identifier,
                    archive_size_kb,
                });
            }
        }

        Ok(Self {
            game_version,
            updater_version,
            manual_download_url,
            files,
            add_ons,
        })
    }

    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Look up a tracked file by canonical path
    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Look up an add-on by its component name
    pub fn add_on(&self, ini_name: &str) -> Option<&AddOnEntry> {
        self.add_ons.iter().find(|a| a.ini_name == ini_name)
    }

    /// Render the manifest back to the on-wire INI form
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[{INFO_SECTION}]");
        let _ = writeln!(out, "Version={}", self.game_version);
        if !self.updater_version.is_empty() {
            let _ = writeln!(out, "UpdaterVersion={}", self.updater_version);
        }
        if !self.manual_download_url.is_empty() {
            let _ = writeln!(out, "ManualDownloadURL={}", self.manual_download_url);
        }

        let _ = writeln!(out, "\n[{FILE_SECTION}]");
        for file in &self.files {
            let _ = writeln!(out, "{}={},{}", file.path, file.identifier, file.size_kb);
        }

        let archived: Vec<_> = self.files.iter().filter(|f| f.archived()).collect();
        if !archived.is_empty() {
            let _ = writeln!(out, "\n[{ARCHIVE_SECTION}]");
            for file in archived {
                let id = file.archive_identifier.as_ref().map_or("", ContentId::as_str);
                let _ = writeln!(out, "{}={},{}", file.path, id, file.archive_size_kb);
            }
        }

        if !self.add_ons.is_empty() {
            let _ = writeln!(out, "\n[{ADDON_SECTION}]");
            for add_on in &self.add_ons {
                let _ = writeln!(
                    out,
                    "{}={},{}",
                    add_on.ini_name, add_on.identifier, add_on.size_kb
                );
            }
        }

        out
    }
}

/// Normalize a manifest path: trimmed, forward-slash separated
pub fn canonical_path(raw: &str) -> String {
    raw.trim().replace('\\', "/")
}

fn parse_id_size(key: &str, value: &str) -> Option<(ContentId, u64)> {
    let fields: Vec<&str> = value.split(',').map(str::trim).collect();
    if fields.len() < 2 {
        warn!("malformed manifest entry for {key:?}: {value:?}");
        return None;
    }
    let identifier = ContentId::new(fields[0]);
    let size_kb = fields[1].parse().unwrap_or(0);
    Some((identifier, size_kb))
}

fn archive_fields(store: &IniStore, key: &str) -> Option<(Option<ContentId>, u64)> {
    let value = store.get(ARCHIVE_SECTION, key)?;
    let fields: Vec<&str> = value.split(',').map(str::trim).collect();
    if fields.len() < 2 {
        warn!("malformed archive entry for {key:?}: {value:?}");
        return None;
    }
    let identifier = ContentId::new(fields[0]);
    if identifier.is_empty() {
        return None;
    }
    Some((Some(identifier), fields[1].parse().unwrap_or(0)))
}
