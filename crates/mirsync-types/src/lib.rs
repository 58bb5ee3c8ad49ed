//! Core type system and error handling for mirsync
//!
//! This crate provides the foundational types shared by every mirsync crate:
//!
//! - **Error handling**: the [`Error`] taxonomy (authorization, connectivity,
//!   execution, initialization, watch) with kinds and severity levels
//! - **Events**: the semantic [`FileEvent`] stream produced by the reconciler
//! - **Status**: per-item [`SyncStatus`] and the backend [`ConnectionStatus`] signal
//!
//! # Features
//!
//! - `std` (default): Enable standard library features
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use mirsync_types::{ConnectionStatus, SyncStatus};
//!
//! let status = SyncStatus::Active.fold(ConnectionStatus::Connected);
//! assert_eq!(status, SyncStatus::Connected);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod result;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorKind, ErrorSeverity};
pub use result::Result;
pub use types::*;
