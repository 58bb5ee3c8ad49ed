//! Guarded transfer backends for mirsync
//!
//! This crate applies semantic file events at a sync destination:
//!
//! - **Path Safety Guard**: every destination path is checked against the
//!   destination root before anything is touched
//! - **Local backend**: mirrors into another directory on this machine
//! - **SFTP backend**: mirrors onto a remote host, connecting lazily and
//!   closing the session after an idle period
//! - **Factory**: picks the backend matching a configuration's destination
//!
//! The in-memory remote host used by tests is available with the
//! `test-utils` feature.
//!
//! # Examples
//!
//! ```rust
//! use mirsync_transfer::{LocalBackend, TransferBackend};
//! use mirsync_types::FileEvent;
//!
//! # async fn example() -> mirsync_types::Result<()> {
//! let backend = LocalBackend::new("/home/me/site", "/backup/site");
//! backend.apply(&FileEvent::DirCreated("/home/me/site/img".into())).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod guard;
pub mod local;
pub mod mapper;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod remote;
pub mod russh_client;
pub mod sftp;

pub use backend::{source_root, BackendFactory, BackendOptions, DefaultBackendFactory, TransferBackend};
pub use guard::PathGuard;
pub use local::LocalBackend;
pub use mapper::PathMapper;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryConnector, MemoryRemote, MemorySession};
pub use remote::{RemoteConnector, RemoteEntry, RemoteSession};
pub use russh_client::{RusshConnector, RusshSession};
pub use sftp::{SftpBackend, DEFAULT_IDLE_TIMEOUT};
