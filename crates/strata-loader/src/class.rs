//! Class model: loaded-class handles, name resolution, and the loader trait.
//!
//! A *class* is a named binary module resolved from an ordered classpath.
//! Each loader owns a defined-class table; for a given (loader, name) pair at
//! most one [`LoadedClass`] is ever defined, and runtime class identity is
//! the identity of the `Arc` handle. Two loaders defining the same name from
//! the same bytes still produce distinct classes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LoaderError, Result};

/// File suffix for class data on a classpath entry.
pub const CLASS_FILE_SUFFIX: &str = ".class";

/// Unique identifier of a loader instance within the process.
pub type LoaderId = u64;

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique loader id.
pub(crate) fn next_loader_id() -> LoaderId {
    NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed)
}

/// A class defined by a loader.
///
/// Identity is the `Arc` handle: the same name loaded through the same
/// loader yields the same handle; a fresh loader yields a fresh one.
#[derive(Debug)]
pub struct LoadedClass {
    name: String,
    bytes: Vec<u8>,
    defined_by: LoaderId,
}

impl LoadedClass {
    /// Fully qualified dotted class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw class data.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Id of the loader that defined this class.
    pub fn defined_by(&self) -> LoaderId {
        self.defined_by
    }
}

/// Map a dotted class name to its relative file path on a classpath entry
/// (`com.example.Foo` → `com/example/Foo.class`).
pub fn class_file_path(name: &str) -> PathBuf {
    let mut rel: String = name.replace('.', "/");
    rel.push_str(CLASS_FILE_SUFFIX);
    PathBuf::from(rel)
}

/// Walk a classpath for a relative path; first entry wins.
///
/// Entries that are not directories are opaque to resolution and skipped.
pub(crate) fn scan_classpath(classpath: &[PathBuf], rel: &Path) -> Option<PathBuf> {
    classpath
        .iter()
        .filter(|entry| entry.is_dir())
        .map(|entry| entry.join(rel))
        .find(|candidate| candidate.is_file())
}

/// A loader of classes and resources.
///
/// `load_class` runs the loader's full delegation protocol;
/// `find_loaded_class` answers only from classes this loader has defined.
pub trait ClassLoader: Send + Sync {
    /// Load a class by fully qualified dotted name.
    fn load_class(&self, name: &str) -> Result<Arc<LoadedClass>>;

    /// Return the class if this loader already defined it.
    fn find_loaded_class(&self, name: &str) -> Option<Arc<LoadedClass>>;

    /// Locate a resource by slash-separated relative path.
    fn find_resource(&self, name: &str) -> Option<PathBuf>;
}

/// Per-loader defined-class table (the runtime's loaded-class cache).
///
/// Concurrent definitions of the same name collapse to the first completer;
/// all later callers observe that result.
#[derive(Debug)]
pub(crate) struct DefinedClasses {
    loader_id: LoaderId,
    table: Mutex<HashMap<String, Arc<LoadedClass>>>,
}

impl DefinedClasses {
    pub(crate) fn new(loader_id: LoaderId) -> Self {
        Self {
            loader_id,
            table: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn loader_id(&self) -> LoaderId {
        self.loader_id
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.table.lock().get(name).cloned()
    }

    /// Define a class from bytes, or return the existing definition.
    pub(crate) fn define(&self, name: &str, bytes: Vec<u8>) -> Arc<LoadedClass> {
        let mut table = self.table.lock();
        if let Some(existing) = table.get(name) {
            return existing.clone();
        }
        let class = Arc::new(LoadedClass {
            name: name.to_string(),
            bytes,
            defined_by: self.loader_id,
        });
        table.insert(name.to_string(), class.clone());
        class
    }
}

/// A plain delegating loader over a classpath.
///
/// Used as the parent above the dependency layer and as the engine of the
/// per-checkout resource sub-loader. Lookup order: already defined here,
/// then the parent (if any), then this loader's classpath.
pub struct PathClassLoader {
    label: String,
    classpath: Vec<PathBuf>,
    parent: Option<Arc<dyn ClassLoader>>,
    defined: DefinedClasses,
}

impl PathClassLoader {
    /// Create a loader over `classpath` with an optional parent.
    pub fn new(
        label: impl Into<String>,
        classpath: Vec<PathBuf>,
        parent: Option<Arc<dyn ClassLoader>>,
    ) -> Self {
        Self {
            label: label.into(),
            classpath,
            parent,
            defined: DefinedClasses::new(next_loader_id()),
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

    fn find_class(&self, name: &str) -> Result<Arc<LoadedClass>> {
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
}

impl ClassLoader for PathClassLoader {
    fn load_class(&self, name: &str) -> Result<Arc<LoadedClass>> {
        if let Some(class) = self.defined.get(name) {
            return Ok(class);
        }
        if let Some(parent) = &self.parent {
            match parent.load_class(name) {
                Ok(class) => return Ok(class),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        self.find_class(name)
    }

    fn find_loaded_class(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.defined.get(name)
    }

    fn find_resource(&self, name: &str) -> Option<PathBuf> {
        if let Some(parent) = &self.parent {
            if let Some(found) = parent.find_resource(name) {
                return Some(found);
            }
        }
        scan_classpath(&self.classpath, Path::new(name))
    }
}
