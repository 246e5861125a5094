//! Second-stage updater
//!
//! Spawned by the client shell right before it exits to finish an
//! update. The client holds the update lock for its lifetime, so
//! acquiring it here means the client is gone and its file handles are
//! free. Staged files are then copied over the live tree, the manifest
//! is promoted last, and the client launcher is started again.

use anyhow::{Context, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

use patchline_updater::{ProcessLock, layout};

mod apply;
mod console;
mod launcher;

use console::Console;

/// How long to wait for the client to release the update lock
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Settle delay after the lock is acquired, letting the operating system
/// release the exited client's file handles
const SETTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(
    name = "patchline-stage2",
    about = "Finalizes a staged update after the client exits",
    version
)]
struct Cli {
    /// File name of the client executable that spawned this process
    client_executable: String,

    /// Installation base directory, possibly wrapped in quotes
    base_directory: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Any failure, invalid arguments included, exits with code 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    let base = PathBuf::from(strip_quotes(&cli.base_directory));
    let console = Console::open(&base);

    match run(&cli.client_executable, &base, &console) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            console.fatal(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(client_executable: &str, base: &Path, console: &Console) -> anyhow::Result<()> {
    console.info(&format!(
        "finalizing update for {client_executable} in {}",
        base.display()
    ));

    console.info("waiting for the client to exit");
    let _lock = ProcessLock::acquire_with_timeout(LOCK_TIMEOUT)
        .context("update lock unavailable")?
        .context("timed out waiting for the client to release the update lock")?;
    debug!("update lock acquired");
    std::thread::sleep(SETTLE_DELAY);

    let staging = base.join(layout::STAGING_DIR);
    if !staging.is_dir() {
        bail!("no staged update found at {}", staging.display());
    }

    apply::copy_staged_tree(base, &staging, console)?;
    apply::promote_manifest(base, &staging, console);

    let launcher_path = launcher::find_launcher(base)?;
    if launcher_path.is_file() {
        console.info(&format!("launching {}", launcher_path.display()));
        std::process::Command::new(&launcher_path)
            .current_dir(base)
            .spawn()
            .context("failed to launch the client")?;
        Ok(())
    } else {
        console.warn(&format!(
            "client launcher {} is missing",
            launcher_path.display()
        ));
        bail!("launcher missing");
    }
}

/// The base directory argument arrives wrapped in quotes; paths that
/// contain their own quotes are not supported.
fn strip_quotes(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}
