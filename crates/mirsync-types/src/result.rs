//! Result type alias for mirsync operations

use crate::Error;

/// Result type alias for mirsync operations
pub type Result<T> = std::result::Result<T, Error>;
