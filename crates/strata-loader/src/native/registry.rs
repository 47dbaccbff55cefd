//! Process-wide registry of staged native library files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, warn};

static GLOBAL: OnceLock<Arc<NativeLibraryRegistry>> = OnceLock::new();
static EXIT_HOOK: Once = Once::new();

extern "C" fn drain_at_exit() {
    if let Some(registry) = GLOBAL.get() {
        registry.drain();
    }
}

/// Tracks every staged native library file in the process.
///
/// Files stay registered until [`delete`](Self::delete) is called for them
/// or the exit hook drains the registry. Draining also removes staging
/// directories that become empty.
pub struct NativeLibraryRegistry {
    staged: Mutex<BTreeSet<PathBuf>>,
    drained: AtomicBool,
}

impl NativeLibraryRegistry {
    pub(crate) fn new() -> Self {
        Self {
            staged: Mutex::new(BTreeSet::new()),
            drained: AtomicBool::new(false),
        }
    }

    /// The process-wide registry. Installs the exit hook on first use.
    pub fn global() -> Arc<Self> {
        let registry = GLOBAL.get_or_init(|| Arc::new(Self::new())).clone();
        EXIT_HOOK.call_once(|| unsafe {
            libc::atexit(drain_at_exit);
        });
        registry
    }

    /// Record a staged file.
    pub fn register(&self, path: PathBuf) {
        debug!(path = %path.display(), "registering staged native library");
        self.staged.lock().insert(path);
    }

    /// Forget a staged file and delete it from disk.
    pub fn delete(&self, path: &Path) {
        self.staged.lock().remove(path);
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "deleted staged native library"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to delete staged native library");
            }
        }
    }

    /// Whether a path is currently registered.
    pub fn contains(&self, path: &Path) -> bool {
        self.staged.lock().contains(path)
    }

    /// Number of files currently registered.
    pub fn staged_count(&self) -> usize {
        self.staged.lock().len()
    }

    /// Delete every staged file, then delete containing directories that
    /// became empty. Runs at most once; later calls are no-ops.
    pub fn drain(&self) {
        if self.drained.swap(true, Ordering::SeqCst) {
            return;
        }
        let staged: Vec<PathBuf> = std::mem::take(&mut *self.staged.lock()).into_iter().collect();
        let mut parents: BTreeSet<PathBuf> = BTreeSet::new();
        for path in &staged {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), %err, "failed to delete staged native library");
                }
            }
            if let Some(parent) = path.parent() {
                parents.insert(parent.to_path_buf());
            }
        }
        for dir in parents {
            // Only empty directories are removable; anything else stays.
            let _ = std::fs::remove_dir(&dir);
        }
        debug!(files = staged.len(), "native library registry drained");
    }
}
