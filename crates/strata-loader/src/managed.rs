//! Base capability shared by the managed loader layers.
//!
//! A [`ManagedLoader`] is a classpath-delegating loader with two extras
//! attached: native library staging and a post-close fallback. Once `close`
//! has run, the primary classpath never serves another lookup; anything that
//! still arrives (typically from background threads leaking past task end)
//! is redirected to a lazily built [`ZombieLoader`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::class::{
    class_file_path, next_loader_id, scan_classpath, ClassLoader, DefinedClasses, LoadedClass,
    LoaderId,
};
use crate::error::{LoaderError, Result};
use crate::lock::ClassLoadingLock;
use crate::native::{NativeLibraryRegistry, NativeStager};
use crate::zombie::ZombieLoader;

/// Sink for loader warnings.
///
/// The engine is a guest inside a larger build process; the host decides
/// where loader diagnostics go.
pub trait LogSink: Send + Sync {
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

/// Default sink: forwards to [`tracing::warn!`].
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn warn(&self, message: &str) {
        warn!("{message}");
    }
}

/// Options shared by every loader built from one pool.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Suppress the post-close lookup warning.
    pub allow_zombies: bool,

    /// Warning sink.
    pub log: Arc<dyn LogSink>,

    /// Native library search path. `None` reads the
    /// [`config::env_vars::LIBRARY_PATH`](crate::config::env_vars::LIBRARY_PATH)
    /// environment variable once per loader.
    pub native_search_path: Option<Vec<PathBuf>>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            allow_zombies: false,
            log: Arc::new(TracingSink),
            native_search_path: None,
        }
    }
}

impl std::fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("allow_zombies", &self.allow_zombies)
            .field("native_search_path", &self.native_search_path)
            .finish_non_exhaustive()
    }
}

/// Classpath loader base with staging and post-close fallback attached.
pub struct ManagedLoader {
    label: String,
    classpath: Vec<PathBuf>,
    parent: Arc<dyn ClassLoader>,
    options: LoaderOptions,
    closed: AtomicBool,
    defined: Arc<DefinedClasses>,
    locks: ClassLoadingLock,
    stager: NativeStager,
    zombie: Mutex<Option<Arc<ZombieLoader>>>,
    zombie_warned: AtomicBool,
}

impl ManagedLoader {
    /// Create a loader over `classpath` delegating to `parent`.
    pub fn new(
        label: impl Into<String>,
        classpath: Vec<PathBuf>,
        parent: Arc<dyn ClassLoader>,
        options: LoaderOptions,
    ) -> Self {
        let label = label.into();
        let id = next_loader_id();
        let stager = NativeStager::new(
            label.clone(),
            options.native_search_path.clone(),
            NativeLibraryRegistry::global(),
        );
        debug!(loader = %label, id, "created managed loader");
        Self {
            label,
            classpath,
            parent,
            options,
            closed: AtomicBool::new(false),
            defined: Arc::new(DefinedClasses::new(id)),
            locks: ClassLoadingLock::new(),
            stager,
            zombie: Mutex::new(None),
            zombie_warned: AtomicBool::new(false),
        }
    }

    /// Diagnostic label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Id of this loader instance.
    pub fn id(&self) -> LoaderId {
        self.defined.loader_id()
    }

    /// Classpath entries, in resolution order.
    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    /// Parent loader reference.
    pub fn parent(&self) -> &Arc<dyn ClassLoader> {
        &self.parent
    }

    /// Options this loader was built with.
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `f` holding the per-name class-loading lock.
    pub(crate) fn with_class_lock<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        self.locks.with_lock(name, f)
    }

    /// The class, if this loader already defined it.
    pub fn find_loaded(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.defined.get(name)
    }

    /// Find and define a class from this loader's own classpath.
    ///
    /// Closed loaders redirect to the fallback. Callers are responsible for
    /// holding the per-name lock where the protocol requires it.
    pub fn find_class(&self, name: &str) -> Result<Arc<LoadedClass>> {
        if self.is_closed() {
            return self.fallback(name).find_class(name);
        }
        if let Some(class) = self.defined.get(name) {
            return Ok(class);
        }
        let rel = class_file_path(name);
        let Some(path) = scan_classpath(&self.classpath, &rel) else {
            return Err(LoaderError::ClassNotFound(name.to_string()));
        };
        let bytes = std::fs::read(path)?;
        Ok(self.defined.define(name, bytes))
    }

    /// Locate a resource on this loader's own classpath.
    pub fn find_resource(&self, name: &str) -> Option<PathBuf> {
        if self.is_closed() {
            return self.fallback(name).find_resource(name);
        }
        scan_classpath(&self.classpath, std::path::Path::new(name))
    }

    /// Resolve and stage a native library by logical name.
    pub fn find_library(&self, name: &str) -> Result<Option<PathBuf>> {
        self.stager.find_library(name)
    }

    /// Replace the staging directory; previously staged files are deleted.
    pub fn set_temp_dir(&self, dir: PathBuf) {
        self.stager.set_temp_dir(Some(dir));
    }

    /// Close this loader. Idempotent; only the first call acts.
    ///
    /// Order: mark closed, close the fallback if one was built, tear down
    /// staging, release the primary classpath.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(zombie) = self.zombie.lock().as_ref() {
            zombie.close();
        }
        self.stager.set_temp_dir(None);
        debug!(loader = %self.label, id = self.id(), "closed managed loader");
    }

    /// Fetch or build the post-close fallback, warning once.
    fn fallback(&self, requested: &str) -> Arc<ZombieLoader> {
        if !self.options.allow_zombies && !self.zombie_warned.swap(true, Ordering::AcqRel) {
            let thread = std::thread::current();
            self.options.log.warn(&format!(
                "loader `{}` is closed, but thread `{}` requested `{}` through it; \
                 serving from a fallback loader",
                self.label,
                thread.name().unwrap_or("<unnamed>"),
                requested,
            ));
        }
        let mut slot = self.zombie.lock();
        slot.get_or_insert_with(|| {
            debug!(loader = %self.label, "building post-close fallback loader");
            Arc::new(ZombieLoader::new(
                format!("{}-zombie", self.label),
                self.classpath.clone(),
                self.defined.clone(),
            ))
        })
        .clone()
    }
}
