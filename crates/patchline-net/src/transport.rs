//! Cancellable HTTP GET-to-file transport

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, PRAGMA, USER_AGENT};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::{CancelToken, Error, Result};

/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Version string meaning "not applicable"
const VERSION_NONE: &str = "N/A";

/// Components of the updater's User-Agent header
#[derive(Debug, Clone)]
pub struct UserAgent {
    /// Name of the installed game
    pub local_game: String,
    /// Updater version, `"N/A"` when unknown
    pub updater_version: String,
    /// Installed game version
    pub game_version: String,
    /// Version of the hosting client shell
    pub host_version: String,
}

impl UserAgent {
    /// Render the header value. The ` Updater/...` segment is omitted
    /// while the updater version is `"N/A"`.
    pub fn render(&self) -> String {
        if self.updater_version == VERSION_NONE {
            format!(
                "{} Game/{} Client/{}",
                self.local_game, self.game_version, self.host_version
            )
        } else {
            format!(
                "{} Updater/{} Game/{} Client/{}",
                self.local_game, self.updater_version, self.game_version, self.host_version
            )
        }
    }
}

/// Cancellable HTTP GET-to-file client.
///
/// Every request carries cache-defeating headers so neither the client
/// nor an intermediary proxy serves a stale manifest. Only one download
/// may be in flight per handle; the `&mut self` receiver makes callers
/// serialize.
#[derive(Debug)]
pub struct Transport {
    client: Client,
    user_agent: String,
}

impl Transport {
    /// Create a transport with the given User-Agent components
    pub fn new(user_agent: &UserAgent) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            user_agent: user_agent.render(),
        })
    }

    /// Create a transport around an existing reqwest client
    pub fn with_client(client: Client, user_agent: &UserAgent) -> Self {
        Self {
            client,
            user_agent: user_agent.render(),
        }
    }

    /// The rendered User-Agent header value
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Download `url` into `destination`, reporting `(bytes_so_far,
    /// total_bytes)` after every chunk.
    ///
    /// Cancellation tears down the in-flight request and removes the
    /// destination file; transport failures remove it as well so a
    /// partial body is never mistaken for a staged file.
    pub async fn download_to_file<F>(
        &mut self,
        url: &str,
        destination: &Path,
        on_progress: F,
        cancel: &CancelToken,
    ) -> Result<u64>
    where
        F: FnMut(u64, Option<u64>),
    {
        debug!("GET {url} -> {}", destination.display());
        let result = self
            .stream_to_file(url, destination, on_progress, cancel)
            .await;
        if let Err(e) = &result {
            warn!("download of {url} failed: {e}");
            let _ = tokio::fs::remove_file(destination).await;
        }
        result
    }

    async fn stream_to_file<F>(
        &mut self,
        url: &str,
        destination: &Path,
        mut on_progress: F,
        cancel: &CancelToken,
    ) -> Result<u64>
    where
        F: FnMut(u64, Option<u64>),
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(status.as_u16(), url));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut bytes_so_far = 0u64;

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            bytes_so_far += chunk.len() as u64;
            trace!("{url}: {bytes_so_far} bytes");
            on_progress(bytes_so_far, total);
        }

        file.flush().await?;
        debug!("downloaded {} from {url}", format_bytes(bytes_so_far));
        Ok(bytes_so_far)
    }
}

/// Render a byte count for log lines
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
