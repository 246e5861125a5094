//! Cancellable HTTP transport and mirror management for the patchline updater
//!
//! This crate provides the two network-facing pieces of the updater:
//!
//! - [`Transport`]: a cancellable GET-to-file client with progress
//!   callbacks, cache-defeating headers, and the composed updater
//!   User-Agent string
//! - [`MirrorList`]: the ordered mirror set with user-priority rewriting
//!   and the failover cursor the orchestrator advances on connection
//!   failures
//!
//! Cancellation is cooperative: a [`CancelToken`] is threaded through
//! every long-running operation and checked between chunks.

#![warn(missing_docs)]

mod cancel;
mod error;
mod mirrors;
mod transport;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use mirrors::MirrorList;
pub use patchline_manifest::UpdateMirror;
pub use transport::{Transport, UserAgent, format_bytes};
