//! Cross-process exclusion between the host and the second stage
//!
//! The host acquires the lock for its lifetime; the second stage waits
//! for it before touching the installation. The lock is an advisory
//! lockfile in the system temp directory keyed by a fixed GUID, so every
//! process on the machine contends on the same file. The operating
//! system releases it when the holder dies, which is how an abandoned
//! holder behaves as released.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

/// Well-known identifier both stages agree on
pub const PROCESS_LOCK_GUID: &str = "66c234dd-7a32-44e5-a1f5-204a87b0d7e6";

/// Poll interval while waiting for the lock
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Held exclusive lock; released on drop
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
}

impl ProcessLock {
    /// Location of the lockfile
    pub fn lock_path() -> PathBuf {
        std::env::temp_dir().join(format!("patchline-{PROCESS_LOCK_GUID}.lock"))
    }

    /// Try to acquire the lock without waiting. `Ok(None)` means another
    /// process holds it.
    pub fn acquire() -> io::Result<Option<Self>> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(Self::lock_path())?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("acquired process lock at {:?}", Self::lock_path());
                Ok(Some(Self { file }))
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Wait up to `timeout` for the lock, polling until the current
    /// holder exits. `Ok(None)` means the wait timed out.
    pub fn acquire_with_timeout(timeout: Duration) -> io::Result<Option<Self>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lock) = Self::acquire()? {
                return Ok(Some(lock));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
