//! mirsync end-to-end test support
//!
//! Shared fixtures for the integration tests under `tests/`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
pub mod test_utils;
