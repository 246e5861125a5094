//! End-to-end orchestrator tests against a mock mirror

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use patchline_manifest::ContentId;
use patchline_updater::{
    NullObserver, UpdateError, UpdateObserver, Updater, VersionState, layout,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    State(VersionState),
    Failed(String),
    Completed,
    Restart,
    FileDone(Option<String>),
    ComponentsOutdated(Vec<String>),
}

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<Event>>,
}

impl Recording {
    fn events(&self) -> Vec<Event> {
        self.events.lock().expect("events").clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().expect("events").push(event);
    }
}

impl UpdateObserver for Recording {
    fn version_state_changed(&self, state: VersionState) {
        self.push(Event::State(state));
    }
    fn update_completed(&self) {
        self.push(Event::Completed);
    }
    fn update_failed(&self, error: &UpdateError) {
        self.push(Event::Failed(error.to_string()));
    }
    fn restart(&self) {
        self.push(Event::Restart);
    }
    fn file_download_completed(&self, archive_name: Option<&str>) {
        self.push(Event::FileDone(archive_name.map(str::to_string)));
    }
    fn custom_components_outdated(&self, ini_names: &[String]) {
        self.push(Event::ComponentsOutdated(ini_names.to_vec()));
    }
}

struct Install {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Install {
    fn new(mirror_urls: &[String]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("Resources")).expect("mkdir");

        let mut config = String::from("[DownloadMirrors]\n");
        for (i, url) in mirror_urls.iter().enumerate() {
            config.push_str(&format!("{i}={url}/,Mirror{i},Test\n"));
        }
        fs::write(root.join("Resources/UpdaterConfig.ini"), config).expect("config");

        Self { _dir: dir, root }
    }

    fn write(&self, rel: &str, data: &[u8]) {
        let path = layout::install_path(&self.root, rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, data).expect("write");
    }

    fn write_local_manifest(&self, text: &str) {
        self.write(layout::VERSION_FILE, text.as_bytes());
    }

    #[cfg(unix)]
    fn install_fake_second_stage(&self) {
        use std::os::unix::fs::PermissionsExt;
        let path = self.root.join("Resources").join(layout::SECOND_STAGE_BIN);
        fs::write(&path, "#!/bin/sh\nexit 0\n").expect("fake second stage");
        let mut permissions = fs::metadata(&path).expect("meta").permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).expect("chmod");
    }

    fn updater(&self, observer: Arc<dyn UpdateObserver>) -> Updater {
        Updater::builder(&self.root)
            .local_game("TestGame")
            .host_version("9.9")
            .observer(observer)
            .build()
            .expect("updater")
    }
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    lzma_rs::lzma_compress(&mut std::io::Cursor::new(data), &mut out).expect("compress");
    out
}

async fn mount_manifest(server: &MockServer, text: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", layout::VERSION_FILE)))
        .respond_with(ResponseTemplate::new(200).set_body_string(text.to_string()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn up_to_date_installation_downloads_nothing() {
    let server = MockServer::start().await;
    mount_manifest(&server, "[DTA]\nVersion=1.0\n").await;

    let install = Install::new(&[server.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\n");

    let recording = Arc::new(Recording::default());
    let mut updater = install.updater(recording.clone());
    updater.check_for_updates().await.expect("check");

    assert_eq!(updater.version_state(), VersionState::UpToDate);
    assert_eq!(updater.update_size_kb(), 0);
    assert!(updater.plan().is_empty());
    assert!(recording.events().contains(&Event::State(VersionState::UpToDate)));
}

#[cfg(unix)]
#[tokio::test]
async fn single_file_update_stages_verified_plaintext() {
    let plaintext = b"new game data".repeat(512);
    let plain_id = ContentId::from_data(&plaintext);
    let archive = compress(&plaintext);
    let archive_id = ContentId::from_data(&archive);

    let server = MockServer::start().await;
    mount_manifest(
        &server,
        &format!(
            "[DTA]\nVersion=2.0\n[FileVersions]\ngame.dat={plain_id},10\n\
             [ArchivedFiles]\ngame.dat={archive_id},4\n"
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/game.dat.lzma"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let install = Install::new(&[server.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\n[FileVersions]\ngame.dat=1111,10\n");
    install.write("game.dat", b"old game data");
    install.install_fake_second_stage();

    let recording = Arc::new(Recording::default());
    let mut updater = install.updater(recording.clone());
    updater.check_for_updates().await.expect("check");

    assert_eq!(updater.version_state(), VersionState::Outdated);
    assert_eq!(updater.plan().len(), 1);
    assert_eq!(updater.update_size_kb(), 4);

    updater.start_update().await.expect("update");

    let staged = install.root.join("Updater/game.dat");
    assert_eq!(
        patchline_manifest::hash_file(&staged).expect("hash staged"),
        plain_id
    );
    assert!(!install.root.join("Updater/game.dat.lzma").exists());
    // authoritative manifest moved into the staging area before handoff
    assert!(install.root.join("Updater/version").is_file());
    assert!(!install.root.join(layout::TEMP_VERSION_FILE).exists());

    let events = recording.events();
    assert!(events.contains(&Event::Restart));
    assert!(events.contains(&Event::FileDone(Some("game.dat.lzma".to_string()))));
    assert_eq!(updater.version_state(), VersionState::UpdateInProgress);
    assert_eq!(updater.total_downloaded_kb(), 4);
}

#[tokio::test]
async fn version_check_fails_over_to_next_mirror() {
    let bad = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&bad)
        .await;

    let good = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[DTA]\nVersion=1.0\n"))
        .expect(2)
        .mount(&good)
        .await;

    let install = Install::new(&[bad.uri(), good.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\n");

    let recording = Arc::new(Recording::default());
    let mut updater = install.updater(recording.clone());
    updater.check_for_updates().await.expect("check");

    assert_eq!(updater.current_mirror_index(), 1);
    assert_eq!(updater.version_state(), VersionState::UpToDate);
    assert!(!recording.events().iter().any(|e| matches!(e, Event::Failed(_))));

    // failover is idempotent: a second check against the working mirror
    // leaves the cursor where it is
    updater.check_for_updates().await.expect("second check");
    assert_eq!(updater.current_mirror_index(), 1);
}

#[tokio::test]
async fn exhausted_mirrors_abort_the_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let install = Install::new(&[server.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\n");

    let recording = Arc::new(Recording::default());
    let mut updater = install.updater(recording.clone());
    let result = updater.check_for_updates().await;

    assert!(result.is_err());
    assert_eq!(updater.version_state(), VersionState::Unknown);
    assert_eq!(updater.current_mirror_index(), 0);
    assert!(recording.events().iter().any(|e| matches!(e, Event::Failed(_))));
}

#[tokio::test]
async fn updater_version_divergence_requires_manual_update() {
    let server = MockServer::start().await;
    mount_manifest(
        &server,
        "[DTA]\nVersion=2.0\nUpdaterVersion=2\nManualDownloadURL=https://x\n\
         [FileVersions]\ngame.dat=123,10\n",
    )
    .await;

    let install = Install::new(&[server.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\nUpdaterVersion=1\n");

    let mut updater = install.updater(Arc::new(NullObserver));
    updater.check_for_updates().await.expect("check");

    assert_eq!(updater.version_state(), VersionState::Outdated);
    assert!(updater.manual_update_required());
    assert_eq!(updater.manual_download_url(), "https://x");
    assert!(updater.plan().is_empty());

    assert!(matches!(
        updater.start_update().await,
        Err(UpdateError::ManualUpdateRequired)
    ));
}

#[tokio::test]
async fn corrupt_archive_is_retried_once_then_fails() {
    let plaintext = b"payload".repeat(100);
    let plain_id = ContentId::from_data(&plaintext);
    let archive = compress(&plaintext);

    let server = MockServer::start().await;
    mount_manifest(
        &server,
        &format!(
            "[DTA]\nVersion=2.0\n[FileVersions]\ngame.dat={plain_id},1\n\
             [ArchivedFiles]\ngame.dat=99999,1\n"
        ),
    )
    .await;
    // archive hash will not match the manifest's 99999
    Mock::given(method("GET"))
        .and(path("/game.dat.lzma"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .expect(2)
        .mount(&server)
        .await;

    let install = Install::new(&[server.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\n");

    let recording = Arc::new(Recording::default());
    let mut updater = install.updater(recording.clone());
    updater.check_for_updates().await.expect("check");

    let result = updater.start_update().await;
    assert!(matches!(result, Err(UpdateError::TooManyRetries { .. })));
    assert_eq!(updater.version_state(), VersionState::Unknown);
    assert!(!install.root.join("Updater/game.dat.lzma").exists());
    assert!(recording.events().iter().any(|e| matches!(e, Event::Failed(_))));
}

#[tokio::test]
async fn repaired_local_manifest_yields_empty_plan_and_promotes_version() {
    let on_disk = b"already current contents";
    let disk_id = ContentId::from_data(on_disk);

    let server = MockServer::start().await;
    mount_manifest(
        &server,
        &format!("[DTA]\nVersion=2.0\n[FileVersions]\ngame.dat={disk_id},1\n"),
    )
    .await;

    let install = Install::new(&[server.uri()]);
    // stale local identifier: verification repairs it to the disk hash
    install.write_local_manifest("[DTA]\nVersion=1.0\n[FileVersions]\ngame.dat=42,1\n");
    install.write("game.dat", on_disk);

    let recording = Arc::new(Recording::default());
    let mut updater = install.updater(recording.clone());
    updater.check_for_updates().await.expect("check");
    assert_eq!(updater.version_state(), VersionState::Outdated);

    updater.start_update().await.expect("update");

    // nothing was staged, so the manifest is promoted in place
    assert_eq!(updater.version_state(), VersionState::UpToDate);
    assert!(!install.root.join(layout::STAGING_DIR).exists());
    assert!(!install.root.join(layout::TEMP_VERSION_FILE).exists());
    let promoted = fs::read_to_string(install.root.join(layout::VERSION_FILE)).expect("version");
    assert!(promoted.contains("Version=2.0"));
    assert!(recording.events().contains(&Event::Completed));

    // idempotent re-run: a fresh check is immediately up to date
    updater.check_for_updates().await.expect("recheck");
    assert_eq!(updater.version_state(), VersionState::UpToDate);
    assert!(updater.plan().is_empty());
}

#[tokio::test]
async fn missing_local_manifest_marks_mismatched_and_allows_full_update() {
    let contents = b"fresh file";
    let id = ContentId::from_data(contents);

    let server = MockServer::start().await;
    mount_manifest(
        &server,
        &format!("[DTA]\nVersion=2.0\n[FileVersions]\ngame.dat={id},1\n"),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/game.dat"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(contents.to_vec()))
        .mount(&server)
        .await;

    let install = Install::new(&[server.uri()]);
    let mut updater = install.updater(Arc::new(NullObserver));
    updater.check_for_updates().await.expect("check");

    assert_eq!(updater.version_state(), VersionState::Mismatched);
    assert_eq!(updater.plan().len(), 1);
}

#[tokio::test]
async fn pre_update_script_runs_and_is_deleted() {
    let server = MockServer::start().await;
    mount_manifest(&server, "[DTA]\nVersion=2.0\n").await;
    Mock::given(method("GET"))
        .and(path("/preupdateexec"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[Delete]\nobsolete.dat=\n"))
        .expect(1)
        .mount(&server)
        .await;

    let install = Install::new(&[server.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\n");
    install.write("obsolete.dat", b"old");

    let mut updater = install.updater(Arc::new(NullObserver));
    updater.check_for_updates().await.expect("check");
    updater.start_update().await.expect("update");

    assert!(!install.root.join("obsolete.dat").exists());
    assert!(!install.root.join("preupdateexec").exists());
    assert_eq!(updater.version_state(), VersionState::UpToDate);
}

#[tokio::test]
async fn cancelled_update_reverts_to_outdated_and_clears_the_flag() {
    let server = MockServer::start().await;
    mount_manifest(
        &server,
        "[DTA]\nVersion=2.0\n[FileVersions]\ngame.dat=123,1\n",
    )
    .await;

    let install = Install::new(&[server.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\n");

    let recording = Arc::new(Recording::default());
    let mut updater = install.updater(recording.clone());
    updater.check_for_updates().await.expect("check");
    assert_eq!(updater.version_state(), VersionState::Outdated);

    updater.cancel_update();
    updater.start_update().await.expect("cancelled update is not a failure");

    assert_eq!(updater.version_state(), VersionState::Outdated);
    assert!(!updater.cancel_token().is_cancelled());
    assert!(!recording.events().iter().any(|e| matches!(e, Event::Failed(_))));
}

#[tokio::test]
async fn concurrent_operations_are_rejected_by_state() {
    let server = MockServer::start().await;
    mount_manifest(&server, "[DTA]\nVersion=1.0\n").await;

    let install = Install::new(&[server.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\n");

    let mut updater = install.updater(Arc::new(NullObserver));
    // up to date: starting an update is rejected
    updater.check_for_updates().await.expect("check");
    assert!(matches!(
        updater.start_update().await,
        Err(UpdateError::Busy { .. })
    ));
}

#[tokio::test]
async fn custom_component_downloads_to_local_path() {
    let payload = b"component payload".repeat(64);
    let payload_id = ContentId::from_data(&payload);

    let server = MockServer::start().await;
    mount_manifest(
        &server,
        &format!("[DTA]\nVersion=1.0\n[AddOns]\nhires_pack={payload_id},2\n"),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/hires/pack.big"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let install = Install::new(&[server.uri()]);
    install.write_local_manifest("[DTA]\nVersion=1.0\n");
    let config_path = install.root.join("Resources/UpdaterConfig.ini");
    let mut config = fs::read_to_string(&config_path).expect("config");
    config.push_str("\n[CustomComponents]\n0=High-res pack,hires_pack,hires/pack.big,Packs/pack.big\n");
    fs::write(&config_path, config).expect("config");

    let mut updater = install.updater(Arc::new(NullObserver));

    // before any check the component has no server information
    assert!(matches!(
        updater.download_component("hires_pack").await,
        Err(UpdateError::ComponentUnavailable { .. })
    ));

    updater.check_for_updates().await.expect("check");
    updater.download_component("hires_pack").await.expect("component");

    let installed = install.root.join("Packs/pack.big");
    assert_eq!(fs::read(&installed).expect("read"), payload);
    let component = &updater.components()[0];
    assert_eq!(component.local_identifier.as_ref(), Some(&payload_id));
    assert!(!component.is_being_downloaded);
}
