//! The per-task bottom layer.
//!
//! A [`TaskLoader`] holds the task's full (dynamic) classpath and lives for
//! exactly one task run. Classes shared with the dependency layer resolve
//! upward so their identity is stable across tasks; everything else is
//! defined here and discarded with the loader. Closing the loader checks its
//! parent back into the pool *first*: the pool's checkin decides the
//! parent's fate, so the parent must still be live at that point.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::class::{ClassLoader, LoadedClass, LoaderId};
use crate::dependency::DependencyLoader;
use crate::error::Result;
use crate::managed::{LoaderOptions, ManagedLoader};
use crate::pool::LoaderPool;

/// Bottom-layer loader for one task run.
pub struct TaskLoader {
    base: ManagedLoader,
    parent: Arc<DependencyLoader>,
    pool: Arc<LoaderPool>,
    checked_in: AtomicBool,
}

impl std::fmt::Debug for TaskLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLoader").finish_non_exhaustive()
    }
}

impl TaskLoader {
    pub(crate) fn new(
        label: impl Into<String>,
        full_classpath: Vec<PathBuf>,
        parent: Arc<DependencyLoader>,
        pool: Arc<LoaderPool>,
        temp_dir: PathBuf,
        options: LoaderOptions,
    ) -> Self {
        let parent_ref: Arc<dyn ClassLoader> = parent.clone();
        let base = ManagedLoader::new(label, full_classpath, parent_ref, options);
        base.set_temp_dir(temp_dir);
        Self {
            base,
            parent,
            pool,
            checked_in: AtomicBool::new(false),
        }
    }

    /// Diagnostic label.
    pub fn label(&self) -> &str {
        self.base.label()
    }

    /// Id of this loader instance.
    pub fn id(&self) -> LoaderId {
        self.base.id()
    }

    /// The dependency-layer parent.
    pub fn dependency_loader(&self) -> &Arc<DependencyLoader> {
        &self.parent
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.checked_in.load(Ordering::Acquire)
    }

    /// Find a class on this loader's own classpath, defining it here.
    ///
    /// This is the entry the parent's reverse edge invokes: no upward
    /// delegation, so a reflective resolution cannot ping-pong between the
    /// layers.
    pub fn lookup_class(&self, name: &str) -> Result<Arc<LoadedClass>> {
        self.find_class(name)
    }

    /// Resolve and stage a native library by logical name.
    pub fn find_library(&self, name: &str) -> Result<Option<PathBuf>> {
        self.base.find_library(name)
    }

    /// Replace the staging directory; previously staged files are deleted.
    pub fn set_temp_dir(&self, dir: PathBuf) {
        self.base.set_temp_dir(dir);
    }

    /// End the task: check the parent back into the pool, then close this
    /// loader. Idempotent; only the first call acts.
    pub fn close(&self) {
        if self.checked_in.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(loader = %self.base.label(), "task finished, returning dependency loader");
        self.pool.checkin(self.parent.clone());
        self.base.close();
    }

    /// Double-checked find against the dynamic classpath.
    fn find_class(&self, name: &str) -> Result<Arc<LoadedClass>> {
        if let Some(class) = self.base.find_loaded(name) {
            return Ok(class);
        }
        self.base.with_class_lock(name, || {
            if let Some(class) = self.base.find_loaded(name) {
                return Ok(class);
            }
            self.base.find_class(name)
        })
    }
}

impl ClassLoader for TaskLoader {
    fn load_class(&self, name: &str) -> Result<Arc<LoadedClass>> {
        if self.base.is_closed() {
            // Post-close lookups stay on this layer; the parent may already
            // be serving another task.
            return self.base.find_class(name);
        }
        if let Some(class) = self.base.find_loaded(name) {
            return Ok(class);
        }
        match self.parent.load_class_opts(name, false) {
            Ok(class) => Ok(class),
            Err(err) if err.is_not_found() => self.find_class(name),
            Err(err) => Err(err),
        }
    }

    fn find_loaded_class(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.base.find_loaded(name)
    }

    fn find_resource(&self, name: &str) -> Option<PathBuf> {
        if self.base.is_closed() {
            return self.base.find_resource(name);
        }
        self.parent
            .find_resource(name)
            .or_else(|| self.base.find_resource(name))
    }
}

impl Drop for TaskLoader {
    fn drop(&mut self) {
        if !self.checked_in.load(Ordering::Acquire) {
            debug!(loader = %self.base.label(), "task loader dropped without close");
            self.close();
        }
    }
}
