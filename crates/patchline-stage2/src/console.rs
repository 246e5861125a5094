//! Colored console output mirrored to the second-stage log file

use owo_colors::OwoColorize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use patchline_updater::layout::{SECOND_STAGE_LOG_PATH, install_path};

/// Console writer: green info, yellow warnings, red fatals, everything
/// mirrored to `Client/SecondStageUpdater.log` under the base directory.
/// An unwritable log target degrades to console-only output.
pub struct Console {
    log: Mutex<Option<File>>,
}

impl Console {
    /// Open the console for an installation base directory
    pub fn open(base: &Path) -> Self {
        let path = install_path(base, SECOND_STAGE_LOG_PATH);
        let log = path.parent().and_then(|parent| {
            std::fs::create_dir_all(parent).ok()?;
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()
        });
        Self {
            log: Mutex::new(log),
        }
    }

    /// Informational progress line
    pub fn info(&self, message: &str) {
        println!("{}", message.green());
        self.log_line("INFO", message);
    }

    /// Recoverable problem
    pub fn warn(&self, message: &str) {
        println!("{}", message.yellow());
        self.log_line("WARN", message);
    }

    /// Unrecoverable failure; the process exits right after
    pub fn fatal(&self, message: &str) {
        eprintln!("{}", message.red());
        self.log_line("FATAL", message);
    }

    fn log_line(&self, level: &str, message: &str) {
        if let Ok(mut guard) = self.log.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = writeln!(file, "[{level}] {message}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_mirrored_to_the_log_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let console = Console::open(dir.path());
        console.info("copying files");
        console.warn("slow disk");
        console.fatal("gave up");

        let log = std::fs::read_to_string(install_path(dir.path(), SECOND_STAGE_LOG_PATH))
            .expect("log file");
        assert!(log.contains("[INFO] copying files"));
        assert!(log.contains("[WARN] slow disk"));
        assert!(log.contains("[FATAL] gave up"));
    }
}
