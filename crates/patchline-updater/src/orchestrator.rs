//! Update orchestrator: the state machine coordinating version checks,
//! planning, downloads, scripts, and the second-stage handoff

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

use patchline_manifest::{
    CustomComponent, IgnoreMasks, IniStore, Manifest, UpdaterConfig, VERSION_NONE,
};
use patchline_net::{CancelToken, MirrorList, Transport, UpdateMirror, UserAgent};

use crate::engine;
use crate::events::{NullObserver, UpdateObserver};
use crate::layout::{
    ARCHIVE_EXT, RESOURCES_DIR, SECOND_STAGE_BIN, STAGED_THEME_FILE, STAGING_DIR,
    TEMP_VERSION_FILE, THEME_TARGET_PATH, VERSION_FILE, install_path, second_stage_path,
};
use crate::reconcile::{self, Plan};
use crate::script;
use crate::state::VersionState;
use crate::{Result, UpdateError};

/// Builder for [`Updater`]
pub struct UpdaterBuilder {
    root: PathBuf,
    local_game: String,
    host_version: String,
    calling_executable: String,
    user_mirror_priority: Vec<String>,
    observer: Arc<dyn UpdateObserver>,
}

impl UpdaterBuilder {
    /// Start building an updater for the installation at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            local_game: "Game".to_string(),
            host_version: VERSION_NONE.to_string(),
            calling_executable: "client".to_string(),
            user_mirror_priority: Vec::new(),
            observer: Arc::new(NullObserver),
        }
    }

    /// Name of the installed game, used in the User-Agent header
    pub fn local_game(mut self, name: impl Into<String>) -> Self {
        self.local_game = name.into();
        self
    }

    /// Version of the hosting client shell, used in the User-Agent header
    pub fn host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    /// Executable name handed to the second stage so it can relaunch the
    /// client
    pub fn calling_executable(mut self, name: impl Into<String>) -> Self {
        self.calling_executable = name.into();
        self
    }

    /// Mirror names the user prefers, in order; applied on top of the
    /// configured default ordering
    pub fn user_mirror_priority(mut self, names: Vec<String>) -> Self {
        self.user_mirror_priority = names;
        self
    }

    /// Receiver for orchestrator events
    pub fn observer(mut self, observer: Arc<dyn UpdateObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Load configuration and the local manifest and build the updater
    pub fn build(self) -> Result<Updater> {
        let config = UpdaterConfig::load(&self.root)?;

        let mut mirrors = MirrorList::new(config.mirrors);
        mirrors.apply_user_priority(&self.user_mirror_priority);

        let local_manifest = load_local_manifest(&self.root);
        let user_agent = UserAgent {
            local_game: self.local_game,
            updater_version: local_manifest
                .as_ref()
                .map_or_else(|| VERSION_NONE.to_string(), |m| m.updater_version.clone()),
            game_version: local_manifest
                .as_ref()
                .map_or_else(|| VERSION_NONE.to_string(), |m| m.game_version.clone()),
            host_version: self.host_version,
        };
        let transport = Transport::new(&user_agent)?;

        Ok(Updater {
            root: self.root,
            observer: self.observer,
            transport,
            mirrors,
            ignore_masks: config.ignore_masks,
            components: config.components,
            calling_executable: self.calling_executable,
            cancel: CancelToken::new(),
            state: VersionState::Unknown,
            local_manifest,
            server_manifest: None,
            plan: Plan::default(),
            manual_update_required: false,
            manual_download_url: String::new(),
            update_size_kb: 0,
            total_downloaded_kb: 0,
        })
    }
}

fn load_local_manifest(root: &Path) -> Option<Manifest> {
    let path = root.join(VERSION_FILE);
    if !path.is_file() {
        return None;
    }
    match Manifest::load(&path) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!("local manifest unreadable: {e}");
            None
        }
    }
}

/// The update orchestrator.
///
/// Exclusively owns the mutable version state, the current plan, the
/// byte counters, and the mirror cursor. The host observes transitions
/// through the [`UpdateObserver`] supplied at construction and requests
/// cancellation through [`Updater::cancel_update`]; the `&mut self`
/// receivers on [`Updater::check_for_updates`] and
/// [`Updater::start_update`] serialize the long-running operations, and
/// each additionally rejects callers by consulting the state.
pub struct Updater {
    root: PathBuf,
    observer: Arc<dyn UpdateObserver>,
    transport: Transport,
    mirrors: MirrorList,
    ignore_masks: IgnoreMasks,
    components: Vec<CustomComponent>,
    calling_executable: String,
    cancel: CancelToken,

    state: VersionState,
    local_manifest: Option<Manifest>,
    server_manifest: Option<Manifest>,
    plan: Plan,
    manual_update_required: bool,
    manual_download_url: String,
    update_size_kb: u64,
    total_downloaded_kb: u64,
}

impl Updater {
    /// Start building an updater for the installation at `root`
    pub fn builder(root: impl Into<PathBuf>) -> UpdaterBuilder {
        UpdaterBuilder::new(root)
    }

    /// Current version state
    pub fn version_state(&self) -> VersionState {
        self.state
    }

    /// Whether the last check found an updater-version divergence
    pub fn manual_update_required(&self) -> bool {
        self.manual_update_required
    }

    /// URL to surface when a manual update is required
    pub fn manual_download_url(&self) -> &str {
        &self.manual_download_url
    }

    /// Transfer size of the current plan, in kilobytes
    pub fn update_size_kb(&self) -> u64 {
        self.update_size_kb
    }

    /// Kilobytes completed by the running or last update
    pub fn total_downloaded_kb(&self) -> u64 {
        self.total_downloaded_kb
    }

    /// The current download plan
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Configured custom components with their runtime state
    pub fn components(&self) -> &[CustomComponent] {
        &self.components
    }

    /// Mirrors in their current order
    pub fn mirrors(&self) -> &[UpdateMirror] {
        self.mirrors.mirrors()
    }

    /// Position of the mirror failover cursor
    pub fn current_mirror_index(&self) -> usize {
        self.mirrors.current_index()
    }

    /// Move a mirror up in the ordering; silent no-op out of range
    pub fn move_mirror_up(&mut self, index: usize) {
        self.mirrors.move_up(index);
    }

    /// Move a mirror down in the ordering; silent no-op out of range
    pub fn move_mirror_down(&mut self, index: usize) {
        self.mirrors.move_down(index);
    }

    /// A clone of the cancellation token driving in-flight work
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Request cancellation of the running update
    pub fn cancel_update(&self) {
        self.cancel.cancel();
    }

    /// Check the current mirror for a new version, failing over through
    /// the mirror list. Transitions to up-to-date, outdated, or
    /// mismatched; on error the state returns to unknown and the failure
    /// is reported through the observer.
    pub async fn check_for_updates(&mut self) -> Result<()> {
        if self.state.in_progress() {
            return Err(UpdateError::busy("check for updates"));
        }
        self.set_state(VersionState::UpdateCheckInProgress);

        match self.version_check().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(VersionState::Unknown);
                self.observer.update_failed(&e);
                Err(e)
            }
        }
    }

    async fn version_check(&mut self) -> Result<()> {
        let temp_manifest = self.root.join(TEMP_VERSION_FILE);
        let _ = tokio::fs::remove_file(&temp_manifest).await;

        let server = loop {
            let Some(mirror) = self.mirrors.current() else {
                return Err(patchline_net::Error::MirrorsExhausted.into());
            };
            let url = format!("{}{VERSION_FILE}", mirror.url);
            info!("checking for updates at {url}");

            match self
                .transport
                .download_to_file(&url, &temp_manifest, |_, _| {}, &self.cancel)
                .await
            {
                Ok(_) => {
                    let text = tokio::fs::read_to_string(&temp_manifest).await?;
                    break Manifest::parse(&text)?;
                }
                Err(e) if e.is_cancelled() => return Err(e.into()),
                Err(e) => {
                    warn!("mirror unreachable: {e}");
                    if !self.mirrors.advance() {
                        return Err(patchline_net::Error::MirrorsExhausted.into());
                    }
                }
            }
        };

        self.refresh_components(&server).await;
        self.observer.file_identifiers_updated();

        self.manual_update_required = false;
        self.manual_download_url.clear();

        let local_versions = self
            .local_manifest
            .as_ref()
            .map(|m| (m.game_version.clone(), m.updater_version.clone()));

        match local_versions {
            Some((local_game, _)) if local_game == server.game_version => {
                self.plan = Plan::default();
                self.update_size_kb = 0;
                self.server_manifest = Some(server);
                self.set_state(VersionState::UpToDate);

                let outdated = reconcile::outdated_components(&self.root, &self.components);
                if !outdated.is_empty() {
                    self.observer.custom_components_outdated(&outdated);
                }
            }
            Some((_, local_updater)) => {
                if server.updater_version != VERSION_NONE
                    && server.updater_version != local_updater
                {
                    info!(
                        "updater version diverged ({local_updater} -> {}), manual update required",
                        server.updater_version
                    );
                    self.manual_update_required = true;
                    self.manual_download_url = server.manual_download_url.clone();
                    self.plan = Plan::default();
                    self.update_size_kb = 0;
                } else {
                    self.rebuild_plan(&server).await?;
                }
                self.server_manifest = Some(server);
                self.set_state(VersionState::Outdated);
            }
            None => {
                // No usable local manifest: the tree cannot be matched to
                // any known snapshot. A full-plan update is still allowed.
                self.rebuild_plan(&server).await?;
                self.server_manifest = Some(server);
                self.set_state(VersionState::Mismatched);
            }
        }

        Ok(())
    }

    /// Run the update decided by the last check. Cancellation reverts to
    /// the outdated state silently; any other failure transitions to
    /// unknown and reports through the observer.
    pub async fn start_update(&mut self) -> Result<()> {
        match self.state {
            VersionState::Outdated | VersionState::Mismatched => {}
            _ => return Err(UpdateError::busy("start an update")),
        }
        if self.manual_update_required {
            return Err(UpdateError::ManualUpdateRequired);
        }
        let Some(server) = self.server_manifest.clone() else {
            return Err(UpdateError::busy("start an update"));
        };

        self.set_state(VersionState::UpdateInProgress);
        self.total_downloaded_kb = 0;

        match self.run_update(&server).await {
            Ok(_restarting) => Ok(()),
            Err(e) if e.is_cancelled() => {
                info!("update cancelled, staged files kept for the next attempt");
                self.cancel.reset();
                self.set_state(VersionState::Outdated);
                Ok(())
            }
            Err(e) => {
                self.set_state(VersionState::Unknown);
                self.observer.update_failed(&e);
                Err(e)
            }
        }
    }

    async fn run_update(&mut self, server: &Manifest) -> Result<bool> {
        self.run_remote_script(script::PRE_UPDATE_SCRIPT).await?;

        if let Some(mut local) = self.local_manifest.take() {
            let root = self.root.clone();
            let masks = self.ignore_masks.clone();
            let observer = Arc::clone(&self.observer);
            local = tokio::task::spawn_blocking(move || {
                reconcile::verify_local_files(&root, &mut local, &masks, |done, total| {
                    observer.local_file_check_progress(done, total);
                });
                local
            })
            .await
            .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?;
            self.local_manifest = Some(local);
        }
        self.observer.local_file_versions_checked();

        self.rebuild_plan(server).await?;

        let Some(mirror) = self.mirrors.current() else {
            return Err(patchline_net::Error::MirrorsExhausted.into());
        };
        let mirror_url = mirror.url.clone();

        let entries = self.plan.entries.clone();
        for entry in &entries {
            if self.cancel.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }

            let observer = Arc::clone(&self.observer);
            let name = entry.path.clone();
            let entry_kb = entry.download_size_kb();
            let downloaded_before_kb = self.total_downloaded_kb;
            let update_total_kb = self.update_size_kb;
            let on_bytes = move |bytes: u64, total: Option<u64>| {
                let file_percent = percent(bytes, total.unwrap_or(entry_kb * 1024));
                let total_percent = percent(
                    downloaded_before_kb * 1024 + bytes,
                    update_total_kb * 1024,
                );
                observer.update_progress(&name, file_percent, total_percent);
            };

            engine::stage_entry_with_retry(
                &mut self.transport,
                &mirror_url,
                &self.root,
                entry,
                &self.cancel,
                on_bytes,
            )
            .await?;

            self.total_downloaded_kb += entry_kb;
            let archive_name = entry
                .archived()
                .then(|| format!("{}{ARCHIVE_EXT}", entry.path));
            self.observer.file_download_completed(archive_name.as_deref());
        }

        self.run_remote_script(script::POST_UPDATE_SCRIPT).await?;

        self.finalize(server).await
    }

    async fn rebuild_plan(&mut self, server: &Manifest) -> Result<()> {
        let root = self.root.clone();
        let local = self.local_manifest.clone();
        let server = server.clone();
        let plan = tokio::task::spawn_blocking(move || {
            reconcile::build_plan(&root, local.as_ref(), &server)
        })
        .await
        .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?;

        self.update_size_kb = plan.total_kb;
        self.plan = plan;
        Ok(())
    }

    async fn refresh_components(&mut self, server: &Manifest) {
        for component in &mut self.components {
            let Some(add_on) = server.add_on(&component.ini_name) else {
                continue;
            };
            component.remote_identifier = Some(add_on.identifier.clone());
            component.remote_archive_identifier = add_on.archive_identifier.clone();
            component.remote_size_kb = add_on.size_kb;
            component.remote_archive_size_kb = add_on.archive_size_kb;
            component.archived = add_on.archived();

            let local_path = install_path(&self.root, &component.local_path);
            component.local_identifier = if local_path.is_file() {
                engine::hash_file_async(local_path).await.ok()
            } else {
                None
            };
            component.initialized = true;
            debug!("component {} refreshed", component.ini_name);
        }
    }

    /// Fetch a script from the current mirror, run it, and delete it.
    /// A mirror without the script is not an error; cancellation is.
    async fn run_remote_script(&mut self, name: &str) -> Result<()> {
        let Some(mirror) = self.mirrors.current() else {
            return Ok(());
        };
        let url = format!("{}{name}", mirror.url);
        let destination = self.root.join(name);

        match self
            .transport
            .download_to_file(&url, &destination, |_, _| {}, &self.cancel)
            .await
        {
            Ok(_) => {
                let text = tokio::fs::read_to_string(&destination)
                    .await
                    .unwrap_or_default();
                let store = IniStore::parse(&text);
                let root = self.root.clone();
                tokio::task::spawn_blocking(move || script::run_script(&root, &store))
                    .await
                    .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?;
                let _ = tokio::fs::remove_file(&destination).await;
                Ok(())
            }
            Err(e) if e.is_cancelled() => Err(e.into()),
            Err(e) => {
                warn!("skipping {name}: {e}");
                Ok(())
            }
        }
    }

    /// Finalize the update. With files staged under `Updater/` the
    /// authoritative manifest moves into the staging area, the
    /// second-stage binary is refreshed and spawned, and the host is
    /// asked to exit. With nothing staged the manifest is promoted in
    /// place and the updater is immediately up to date.
    async fn finalize(&mut self, server: &Manifest) -> Result<bool> {
        let staging = self.root.join(STAGING_DIR);
        let temp_manifest = self.root.join(TEMP_VERSION_FILE);

        if staging.is_dir() {
            // The second stage reads the manifest from the staging area,
            // so it must land there before the process spawns.
            let staged_manifest = staging.join(VERSION_FILE);
            let _ = tokio::fs::remove_file(&staged_manifest).await;
            tokio::fs::rename(&temp_manifest, &staged_manifest).await?;

            let staged_theme = staging.join(STAGED_THEME_FILE);
            if staged_theme.is_file() {
                let target = install_path(&self.root, THEME_TARGET_PATH);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(&staged_theme, &target).await?;
            }

            let staged_stage2 = staging.join(RESOURCES_DIR).join(SECOND_STAGE_BIN);
            let installed_stage2 = second_stage_path(&self.root);
            if staged_stage2.is_file() {
                if let Some(parent) = installed_stage2.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(&staged_stage2, &installed_stage2).await?;
                make_executable(&installed_stage2)?;
            }

            info!("handing off to the second-stage updater");
            Command::new(&installed_stage2)
                .arg(&self.calling_executable)
                .arg(format!("\"{}\"", self.root.display()))
                .spawn()?;

            self.observer.restart();
            Ok(true)
        } else {
            if temp_manifest.is_file() {
                let target = self.root.join(VERSION_FILE);
                let _ = tokio::fs::remove_file(&target).await;
                tokio::fs::rename(&temp_manifest, &target).await?;
            }
            self.local_manifest = Some(server.clone());
            self.plan = Plan::default();
            self.update_size_kb = 0;
            self.set_state(VersionState::UpToDate);
            self.observer.update_completed();
            Ok(false)
        }
    }

    /// Download one custom component into its installed location.
    pub async fn download_component(&mut self, ini_name: &str) -> Result<()> {
        let Some(index) = self
            .components
            .iter()
            .position(|c| c.ini_name == ini_name)
        else {
            return Err(UpdateError::ComponentUnavailable {
                name: ini_name.to_string(),
            });
        };
        let component = self.components[index].clone();
        let Some(remote_id) = component.remote_identifier.clone() else {
            return Err(UpdateError::ComponentUnavailable {
                name: ini_name.to_string(),
            });
        };

        let url_base = if component.download_path_is_absolute {
            component.download_path.replace('\\', "/")
        } else {
            let Some(mirror) = self.mirrors.current() else {
                return Err(patchline_net::Error::MirrorsExhausted.into());
            };
            format!("{}{}", mirror.url, component.download_path.replace('\\', "/"))
        };
        let destination = install_path(&self.root, &component.local_path);

        let observer = Arc::clone(&self.observer);
        let display_name = component.display_name.clone();
        let expected_kb = if component.archived {
            component.remote_archive_size_kb
        } else {
            component.remote_size_kb
        };
        let on_bytes = move |bytes: u64, total: Option<u64>| {
            let pct = percent(bytes, total.unwrap_or(expected_kb * 1024));
            observer.update_progress(&display_name, pct, pct);
        };

        self.components[index].is_being_downloaded = true;
        let archive_id = component
            .archived
            .then(|| component.remote_archive_identifier.clone())
            .flatten();
        let result = engine::download_component_file(
            &mut self.transport,
            &component.ini_name,
            &url_base,
            &destination,
            &remote_id,
            archive_id.as_ref(),
            !component.no_archive_extension_on_download_path,
            &self.cancel,
            on_bytes,
        )
        .await;
        self.components[index].is_being_downloaded = false;

        result?;
        self.components[index].local_identifier = Some(remote_id);
        self.observer.file_download_completed(None);
        Ok(())
    }

    fn set_state(&mut self, state: VersionState) {
        if self.state != state {
            debug!("version state: {} -> {state}", self.state);
            self.state = state;
            self.observer.version_state_changed(state);
        }
    }
}

fn percent(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part.saturating_mul(100) / whole).min(100) as u32
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
