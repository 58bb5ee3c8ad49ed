//! Live one-way sync orchestration for mirsync
//!
//! A [`SyncOrchestrator`] keeps one [`SyncItem`] per registered
//! configuration. Starting an item watches its source root, builds the
//! transfer backend for its destination and spawns a worker that applies the
//! reconciled events in order. Backend connectivity is folded into the item's
//! [`SyncStatus`](mirsync_types::SyncStatus); a failed event marks the item
//! `Failed` until it is stopped and started again.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mirsync_config::{Configuration, Connection};
//! use mirsync_engine::{ErrorHandler, OrchestratorOptions, SyncOrchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> mirsync_types::Result<()> {
//! let orchestrator = SyncOrchestrator::new(OrchestratorOptions::default());
//! let item = orchestrator.register(Configuration::new(
//!     "site",
//!     Connection::local("/home/me/site"),
//!     Connection::local("/mnt/backup/site"),
//! ))?;
//!
//! let on_error: ErrorHandler = Arc::new(|item: &mirsync_engine::SyncItem, error: &mirsync_types::Error| {
//!     eprintln!("{} failed: {}", item.id(), error);
//! });
//! orchestrator.start(&item, on_error).await?;
//! // ...
//! orchestrator.stop(&item).await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod item;
pub mod orchestrator;
mod worker;

pub use item::SyncItem;
pub use orchestrator::{ErrorHandler, OrchestratorOptions, SyncOrchestrator};
