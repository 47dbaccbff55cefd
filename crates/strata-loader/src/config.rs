//! Engine configuration defaults and environment lookups.
//!
//! Environment variable names live here so they are defined exactly once.

use std::path::PathBuf;

/// Environment variable names.
pub mod env_vars {
    /// Native library search path, platform-delimited (`:` on Unix, `;` on
    /// Windows). Read once per loader at construction.
    pub const LIBRARY_PATH: &str = "STRATA_LIBRARY_PATH";
}

/// Read the native library search path from the environment.
///
/// A missing variable yields an empty list. Entries are kept verbatim;
/// nonexistent directories are skipped at lookup time, not here.
pub fn native_search_path() -> Vec<PathBuf> {
    match std::env::var_os(env_vars::LIBRARY_PATH) {
        Some(raw) => std::env::split_paths(&raw).collect(),
        None => Vec::new(),
    }
}
