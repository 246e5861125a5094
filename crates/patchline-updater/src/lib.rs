//! Update engine for the patchline game-client shell
//!
//! The engine compares a locally installed tree against the `version`
//! manifest published by one of several mirrors, downloads only the files
//! whose content identifiers differ, decompresses archived downloads,
//! applies the declarative pre-/post-update scripts, and finally hands
//! off to the second-stage binary that replaces locked files once the
//! client has exited.
//!
//! The [`Updater`] orchestrator owns all mutable update state. Hosts
//! observe it through an [`UpdateObserver`] passed in at construction and
//! cancel in-flight work through the orchestrator's [`CancelToken`].

mod engine;
mod error;
mod events;
pub mod layout;
mod lock;
mod orchestrator;
mod reconcile;
mod script;
mod state;

pub use error::{Result, UpdateError};
pub use events::{NullObserver, UpdateObserver};
pub use lock::{PROCESS_LOCK_GUID, ProcessLock};
pub use orchestrator::{Updater, UpdaterBuilder};
pub use patchline_net::CancelToken;
pub use reconcile::{Plan, build_plan, outdated_components, verify_local_files};
pub use script::{POST_UPDATE_SCRIPT, PRE_UPDATE_SCRIPT, run_script};
pub use state::VersionState;
