//! Per-file download pipeline: fetch, verify, decompress, verify, stage

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use patchline_manifest::{ContentId, FileEntry, hash_file};
use patchline_net::{CancelToken, Transport};

use crate::layout::{ARCHIVE_EXT, staging_path};
use crate::{Result, UpdateError};

/// Attempts per file before the update aborts
const MAX_ATTEMPTS: u32 = 2;

/// Base delay before a retry attempt
const RETRY_BACKOFF_MS: u64 = 500;

/// Jitter factor (0.0 to 1.0) applied to the retry delay
const RETRY_JITTER: f64 = 0.1;

fn retry_backoff() -> Duration {
    let jitter = 1.0 + (rand::random::<f64>() * 2.0 - 1.0) * RETRY_JITTER;
    Duration::from_millis((RETRY_BACKOFF_MS as f64 * jitter).max(0.0) as u64)
}

/// Hash a file off the async runtime
pub(crate) async fn hash_file_async(path: PathBuf) -> Result<ContentId> {
    let id = tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| UpdateError::Io(std::io::Error::other(e)))??;
    Ok(id)
}

/// Decompress a framed archive off the async runtime
async fn decompress_async(source: PathBuf, destination: PathBuf, cancel: CancelToken) -> Result<u64> {
    tokio::task::spawn_blocking(move || {
        let probe = || cancel.is_cancelled();
        patchline_lzma::decompress_file(&source, &destination, &probe)
    })
    .await
    .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?
    .map_err(UpdateError::from)
}

/// Whether an existing file already hashes to `expected`
async fn matches(path: &Path, expected: &ContentId) -> bool {
    if !path.is_file() {
        return false;
    }
    hash_file_async(path.to_path_buf())
        .await
        .is_ok_and(|actual| actual == *expected)
}

fn with_archive_ext(path: &Path) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(ARCHIVE_EXT);
    PathBuf::from(os)
}

/// Run one planned entry through the pipeline into the staging area,
/// retrying once. Cancellation is never retried.
pub(crate) async fn stage_entry_with_retry<F>(
    transport: &mut Transport,
    mirror_url: &str,
    root: &Path,
    entry: &FileEntry,
    cancel: &CancelToken,
    mut on_bytes: F,
) -> Result<()>
where
    F: FnMut(u64, Option<u64>),
{
    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            let backoff = retry_backoff();
            debug!("{}: retrying after {backoff:?}", entry.path);
            sleep(backoff).await;
        }
        match stage_entry(transport, mirror_url, root, entry, cancel, &mut on_bytes).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => warn!(
                "{}: attempt {attempt}/{MAX_ATTEMPTS} failed: {e}",
                entry.path
            ),
        }
    }
    Err(UpdateError::too_many_retries(&entry.path))
}

/// One pipeline attempt for a planned entry.
///
/// A plaintext file already staged with the right identifier short-cuts
/// the whole attempt; a cached archive with the right identifier skips
/// only the network fetch. Either way the final plaintext is re-verified
/// before the file counts as staged.
async fn stage_entry<F>(
    transport: &mut Transport,
    mirror_url: &str,
    root: &Path,
    entry: &FileEntry,
    cancel: &CancelToken,
    mut on_bytes: F,
) -> Result<()>
where
    F: FnMut(u64, Option<u64>),
{
    let plain_staged = staging_path(root, &entry.path);
    if let Some(parent) = plain_staged.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if matches(&plain_staged, &entry.identifier).await {
        debug!("{}: already staged, skipping", entry.path);
        return Ok(());
    }

    let archive_id = entry
        .archive_identifier
        .clone()
        .filter(|id| !id.is_empty());
    if let Some(archive_id) = archive_id {
        let archive_staged = with_archive_ext(&plain_staged);

        if matches(&archive_staged, &archive_id).await {
            debug!("{}: cached archive matches, skipping fetch", entry.path);
        } else {
            let url = format!("{mirror_url}{}{ARCHIVE_EXT}", entry.path);
            transport
                .download_to_file(&url, &archive_staged, &mut on_bytes, cancel)
                .await?;

            let actual = hash_file_async(archive_staged.clone()).await?;
            if actual != archive_id {
                let _ = tokio::fs::remove_file(&archive_staged).await;
                return Err(UpdateError::hash_mismatch(
                    &entry.path,
                    archive_id.as_str(),
                    actual.as_str(),
                ));
            }
        }

        decompress_async(archive_staged.clone(), plain_staged.clone(), cancel.clone()).await?;
        tokio::fs::remove_file(&archive_staged).await?;
    } else {
        let url = format!("{mirror_url}{}", entry.path);
        transport
            .download_to_file(&url, &plain_staged, &mut on_bytes, cancel)
            .await?;
    }

    let actual = hash_file_async(plain_staged.clone()).await?;
    if actual != entry.identifier {
        let _ = tokio::fs::remove_file(&plain_staged).await;
        return Err(UpdateError::hash_mismatch(
            &entry.path,
            entry.identifier.as_str(),
            actual.as_str(),
        ));
    }

    info!("{}: staged", entry.path);
    Ok(())
}

/// Run a custom component through the same pipeline, writing directly to
/// its installed location instead of the staging area.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn download_component_file<F>(
    transport: &mut Transport,
    label: &str,
    url_base: &str,
    destination: &Path,
    expected: &ContentId,
    archive: Option<&ContentId>,
    append_archive_ext: bool,
    cancel: &CancelToken,
    mut on_bytes: F,
) -> Result<()>
where
    F: FnMut(u64, Option<u64>),
{
    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            sleep(retry_backoff()).await;
        }
        match component_attempt(
            transport,
            url_base,
            destination,
            expected,
            archive,
            append_archive_ext,
            cancel,
            &mut on_bytes,
        )
        .await
        {
            Ok(()) => return Ok(()),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => warn!("{label}: attempt {attempt}/{MAX_ATTEMPTS} failed: {e}"),
        }
    }
    Err(UpdateError::too_many_retries(label))
}

#[allow(clippy::too_many_arguments)]
async fn component_attempt<F>(
    transport: &mut Transport,
    url_base: &str,
    destination: &Path,
    expected: &ContentId,
    archive: Option<&ContentId>,
    append_archive_ext: bool,
    cancel: &CancelToken,
    mut on_bytes: F,
) -> Result<()>
where
    F: FnMut(u64, Option<u64>),
{
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if matches(destination, expected).await {
        debug!("component at {} already current", destination.display());
        return Ok(());
    }

    let label = destination.display().to_string();

    if let Some(archive_id) = archive {
        let archive_path = with_archive_ext(destination);
        let url = if append_archive_ext {
            format!("{url_base}{ARCHIVE_EXT}")
        } else {
            url_base.to_string()
        };
        transport
            .download_to_file(&url, &archive_path, &mut on_bytes, cancel)
            .await?;

        let actual = hash_file_async(archive_path.clone()).await?;
        if actual != *archive_id {
            let _ = tokio::fs::remove_file(&archive_path).await;
            return Err(UpdateError::hash_mismatch(
                &label,
                archive_id.as_str(),
                actual.as_str(),
            ));
        }

        decompress_async(archive_path.clone(), destination.to_path_buf(), cancel.clone()).await?;
        tokio::fs::remove_file(&archive_path).await?;
    } else {
        transport
            .download_to_file(url_base, destination, &mut on_bytes, cancel)
            .await?;
    }

    let actual = hash_file_async(destination.to_path_buf()).await?;
    if actual != *expected {
        let _ = tokio::fs::remove_file(destination).await;
        return Err(UpdateError::hash_mismatch(
            &label,
            expected.as_str(),
            actual.as_str(),
        ));
    }

    Ok(())
}
