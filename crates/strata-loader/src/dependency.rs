//! The cacheable middle layer.
//!
//! A [`DependencyLoader`] holds the long-lived dependency classpath and is
//! the piece worth keeping warm between tasks. It differs from a plain
//! delegating loader in three ways: a *reverse edge* lets it consult the
//! task-layer child when reflection demands that this layer resolve a class
//! that only exists on the task classpath; a *dirty* flag records that such
//! a resolution happened (the loader's identity now depends on a transient
//! child, so the pool must not reuse it); and resource lookups go through a
//! per-checkout sub-loader built over the task's full classpath.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::class::{ClassLoader, LoadedClass, LoaderId, PathClassLoader};
use crate::error::{LoaderError, Result};
use crate::managed::{LoaderOptions, ManagedLoader};
use crate::task::TaskLoader;

/// Middle-layer loader over the dependency classpath.
pub struct DependencyLoader {
    base: ManagedLoader,
    /// Reverse edge to the current task-layer child. Weak: the parent never
    /// keeps the child alive beyond the child's own lifetime.
    descendant: Mutex<Weak<TaskLoader>>,
    /// Set on the first successful reverse-edge resolution; never cleared.
    dirty: AtomicBool,
    /// Per-checkout resource sub-loader over the task's full classpath.
    resources: Mutex<Option<PathClassLoader>>,
}

impl DependencyLoader {
    pub(crate) fn new(
        label: impl Into<String>,
        dependency_classpath: Vec<PathBuf>,
        parent: Arc<dyn ClassLoader>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            base: ManagedLoader::new(label, dependency_classpath, parent, options),
            descendant: Mutex::new(Weak::new()),
            dirty: AtomicBool::new(false),
            resources: Mutex::new(None),
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

    /// Whether a reverse-edge resolution has made this loader uncacheable.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    /// Per-checkout configuration: install the staging directory and build
    /// the resource sub-loader from the task's full classpath.
    pub(crate) fn setup(&self, temp_dir: PathBuf, full_classpath: Vec<PathBuf>) {
        self.base.set_temp_dir(temp_dir);
        let sub = PathClassLoader::new(
            format!("{}-resources", self.base.label()),
            full_classpath,
            None,
        );
        *self.resources.lock() = Some(sub);
    }

    /// Register the task-layer child for reverse lookups. Overwritten on
    /// each checkout; the previous child is closed by then.
    pub(crate) fn set_descendant(&self, task: Weak<TaskLoader>) {
        *self.descendant.lock() = task;
    }

    /// Load a class with the reverse edge enabled.
    ///
    /// This is the entry reflective code reaches; the task-layer child uses
    /// [`load_class_opts`](Self::load_class_opts) with `reverse_lookup =
    /// false` instead, so its ordinary bottom-up walk cannot recurse back
    /// into itself or spuriously dirty this loader.
    pub fn load_class(&self, name: &str) -> Result<Arc<LoadedClass>> {
        self.load_class_opts(name, true)
    }

    /// Load a class, choosing whether a failed walk may consult the
    /// registered child.
    pub fn load_class_opts(&self, name: &str, reverse_lookup: bool) -> Result<Arc<LoadedClass>> {
        self.base.with_class_lock(name, || {
            if let Some(class) = self.base.find_loaded(name) {
                return Ok(class);
            }
            match self.base.parent().load_class(name) {
                Ok(class) => return Ok(class),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
            match self.base.find_class(name) {
                Ok(class) => Ok(class),
                Err(err) if err.is_not_found() && reverse_lookup => {
                    self.descendant_lookup(name, err)
                }
                Err(err) => Err(err),
            }
        })
    }

    /// Resolve through the reverse edge, marking this loader dirty on
    /// success. Without a live child the original failure stands.
    fn descendant_lookup(
        &self,
        name: &str,
        original: LoaderError,
    ) -> Result<Arc<LoadedClass>> {
        let Some(task) = self.descendant.lock().upgrade() else {
            return Err(original);
        };
        match task.lookup_class(name) {
            Ok(class) => {
                if !self.dirty.swap(true, Ordering::AcqRel) {
                    debug!(
                        loader = %self.base.label(),
                        class = name,
                        "resolved through task layer; loader is no longer cacheable"
                    );
                }
                Ok(class)
            }
            Err(err) if err.is_not_found() => Err(original),
            Err(err) => Err(err),
        }
    }

    /// Resolve and stage a native library by logical name.
    pub fn find_library(&self, name: &str) -> Result<Option<PathBuf>> {
        self.base.find_library(name)
    }

    /// Close this loader. Idempotent.
    pub fn close(&self) {
        self.base.close();
    }
}

impl ClassLoader for DependencyLoader {
    fn load_class(&self, name: &str) -> Result<Arc<LoadedClass>> {
        DependencyLoader::load_class(self, name)
    }

    fn find_loaded_class(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.base.find_loaded(name)
    }

    /// Resources resolve against the current checkout's full classpath; a
    /// loader that was never set up has nothing to serve.
    fn find_resource(&self, name: &str) -> Option<PathBuf> {
        if self.base.is_closed() {
            return self.base.find_resource(name);
        }
        self.resources
            .lock()
            .as_ref()
            .and_then(|sub| sub.find_resource(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::class_file_path;
    use std::path::Path;

    fn write_class(root: &Path, name: &str, bytes: &[u8]) {
        let path = root.join(class_file_path(name));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn boot() -> Arc<dyn ClassLoader> {
        Arc::new(PathClassLoader::new("boot", vec![], None))
    }

    fn loader(classpath: Vec<PathBuf>) -> DependencyLoader {
        DependencyLoader::new("dependency", classpath, boot(), LoaderOptions::default())
    }

    #[test]
    fn test_starts_clean() {
        let dep = loader(vec![]);
        assert!(!dep.is_dirty());
        assert!(!dep.is_closed());
    }

    #[test]
    fn test_resolves_own_classpath() {
        let dir = tempfile::tempdir().unwrap();
        write_class(dir.path(), "dep.Foo", b"dep-bytes");

        let dep = loader(vec![dir.path().to_path_buf()]);
        let class = dep.load_class("dep.Foo").unwrap();
        assert_eq!(class.bytes(), b"dep-bytes");
        assert_eq!(class.defined_by(), dep.id());
        assert!(!dep.is_dirty());
    }

    #[test]
    fn test_reverse_miss_without_descendant_is_not_found() {
        let dep = loader(vec![]);
        let err = dep.load_class("app.Only").unwrap_err();
        assert!(err.is_not_found());
        assert!(!dep.is_dirty());
    }

    #[test]
    fn test_resources_need_setup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.conf"), b"k=v").unwrap();

        let dep = loader(vec![]);
        assert!(dep.find_resource("app.conf").is_none());

        dep.setup(
            tempfile::tempdir().unwrap().path().to_path_buf(),
            vec![dir.path().to_path_buf()],
        );
        assert!(dep.find_resource("app.conf").is_some());
    }

    #[test]
    fn test_setup_replaces_resource_sub_loader() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("only-first.conf"), b"1").unwrap();
        std::fs::write(second.path().join("only-second.conf"), b"2").unwrap();

        let dep = loader(vec![]);
        let temp = tempfile::tempdir().unwrap();
        dep.setup(temp.path().to_path_buf(), vec![first.path().to_path_buf()]);
        assert!(dep.find_resource("only-first.conf").is_some());

        dep.setup(temp.path().to_path_buf(), vec![second.path().to_path_buf()]);
        assert!(dep.find_resource("only-first.conf").is_none());
        assert!(dep.find_resource("only-second.conf").is_some());
    }
}
