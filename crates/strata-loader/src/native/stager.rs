//! Per-loader native library staging.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::NativeLibraryRegistry;
use crate::config;
use crate::error::{LoaderError, Result};

/// Map a logical library name to the platform filename
/// (`foo` → `libfoo.so` on Linux, `libfoo.dylib` on macOS, `foo.dll` on
/// Windows).
pub fn platform_library_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    )
}

struct StagerState {
    /// Logical name → staged copy path.
    mapped: HashMap<String, PathBuf>,
    /// Current staging directory. `None` after close: located libraries can
    /// no longer be staged.
    temp_dir: Option<PathBuf>,
}

/// Stages native libraries for one loader.
///
/// The search path is captured once at construction. All operations run
/// under a single per-loader mutex so the staged identity of a logical name
/// is stable under concurrent requests.
pub struct NativeStager {
    label: String,
    search_path: Vec<PathBuf>,
    registry: Arc<NativeLibraryRegistry>,
    state: Mutex<StagerState>,
}

impl NativeStager {
    /// Create a stager. `search_path` of `None` reads the configured
    /// environment value; see [`config::native_search_path`].
    pub fn new(
        label: impl Into<String>,
        search_path: Option<Vec<PathBuf>>,
        registry: Arc<NativeLibraryRegistry>,
    ) -> Self {
        Self {
            label: label.into(),
            search_path: search_path.unwrap_or_else(config::native_search_path),
            registry,
            state: Mutex::new(StagerState {
                mapped: HashMap::new(),
                temp_dir: None,
            }),
        }
    }

    /// Resolve a logical library name to a staged copy.
    ///
    /// Repeated requests for the same name return the cached copy. Returns
    /// `Ok(None)` when no search path entry holds the library. A failed copy
    /// is not recorded, so a retry may succeed.
    pub fn find_library(&self, name: &str) -> Result<Option<PathBuf>> {
        let mut state = self.state.lock();
        if let Some(staged) = state.mapped.get(name) {
            return Ok(Some(staged.clone()));
        }

        let file_name = platform_library_name(name);
        let Some(found) = self
            .search_path
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
        else {
            return Ok(None);
        };

        let Some(temp_dir) = state.temp_dir.clone() else {
            return Err(LoaderError::Staging {
                name: name.to_string(),
                path: found,
                source: std::io::Error::other("no staging directory installed"),
            });
        };

        let staged = temp_dir.join(&file_name);
        std::fs::copy(&found, &staged).map_err(|source| LoaderError::Staging {
            name: name.to_string(),
            path: found.clone(),
            source,
        })?;
        let staged = staged.canonicalize().unwrap_or(staged);

        debug!(
            loader = %self.label,
            library = name,
            from = %found.display(),
            to = %staged.display(),
            "staged native library"
        );
        self.registry.register(staged.clone());
        state.mapped.insert(name.to_string(), staged.clone());
        Ok(Some(staged))
    }

    /// Replace the staging directory.
    ///
    /// Every previously staged file is deleted through the registry and the
    /// mapped table is cleared; later requests re-stage against the new
    /// directory. `None` installs the unreachable sentinel used on close.
    pub fn set_temp_dir(&self, dir: Option<PathBuf>) {
        let mut state = self.state.lock();
        for (_, staged) in state.mapped.drain() {
            self.registry.delete(&staged);
        }
        state.temp_dir = dir;
    }

    /// The staged path currently recorded for a logical name, if any.
    pub fn staged_path(&self, name: &str) -> Option<PathBuf> {
        self.state.lock().mapped.get(name).cloned()
    }
}

impl Drop for NativeStager {
    fn drop(&mut self) {
        // Loaders tear the stager down in close(); this covers loaders that
        // were never closed.
        let state = self.state.get_mut();
        for (_, staged) in state.mapped.drain() {
            self.registry.delete(&staged);
        }
    }
}
