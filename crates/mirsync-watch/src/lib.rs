//! Directory watching for mirsync
//!
//! This crate turns the OS file notification feed for a directory tree into a
//! clean stream of semantic [`FileEvent`](mirsync_types::FileEvent)s:
//!
//! - **Crawler**: recursive listing used for initial uploads and moved-in trees
//! - **Raw records**: `(path, flags)` notifications as delivered by the OS
//! - **Reconciler**: pairs the two halves of a rename, and turns unpaired
//!   halves into moves in or out of the watched root
//! - **Stream**: a background task per watched root, cancelled through a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken)
//!
//! # Examples
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use mirsync_watch::{FileEventStream, WatchOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mirsync_types::Result<()> {
//! let mut events = FileEventStream::watch("/srv/data", WatchOptions::default(), CancellationToken::new())?;
//! while let Some(event) = events.next().await {
//!     println!("{}", event?);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod crawler;
pub mod raw;
pub mod reconciler;
pub mod source;
pub mod stream;

pub use crawler::{crawl, CrawlEntry};
pub use raw::{EventFlags, RawEvent};
pub use reconciler::{Reconciler, DEFAULT_RENAME_WINDOW};
pub use source::NotifyTranslator;
pub use stream::{FileEventStream, WatchHandle, WatchOptions};
