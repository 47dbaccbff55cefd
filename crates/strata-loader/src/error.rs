//! Error types for the class-loading engine.

use std::path::PathBuf;

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Loader error types.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The class is not available on any layer.
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// Checkout was attempted after the pool was closed.
    #[error("loader pool is closed; clear cached loaders and retry the task")]
    PoolClosed,

    /// Copying a native library into the staging directory failed.
    ///
    /// The logical name is not recorded, so a later request may succeed.
    #[error("failed to stage native library `{name}` from {path:?}: {source}")]
    Staging {
        /// Logical library name as requested.
        name: String,
        /// Source file the copy was attempted from.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A class file was located but could not be read.
    #[error("failed to read class data: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("loader error: {0}")]
    Other(#[from] anyhow::Error),
}

impl LoaderError {
    /// Whether this error is a not-found outcome that protocol points may
    /// recover from (bottom-layer find, reverse lookup).
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoaderError::ClassNotFound(_))
    }
}
