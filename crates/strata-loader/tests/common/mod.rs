//! Shared fixtures for the loader integration tests.
//!
//! Classpaths are plain directories of `.class` files generated into
//! [`tempfile::TempDir`]s; native libraries are files named with the
//! platform prefix/suffix.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use strata_loader::{
    class_file_path, platform_library_name, ClassLoader, LoaderOptions, LogSink, PathClassLoader,
};

/// Route engine logs into the test harness output. Safe to call from every
/// test; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Write class data for `name` under `root`.
pub fn write_class(root: &Path, name: &str, bytes: &[u8]) {
    let path = root.join(class_file_path(name));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

/// Write a resource at a slash-separated relative path under `root`.
pub fn write_resource(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

/// Write a native library with the platform filename for `logical` under
/// `root`, returning its path.
pub fn write_library(root: &Path, logical: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(platform_library_name(logical));
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A classpath directory populated with the given classes.
pub fn classpath_with(classes: &[(&str, &[u8])]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, bytes) in classes {
        write_class(dir.path(), name, bytes);
    }
    dir
}

/// An empty parent loader standing in for the host's system loader.
pub fn boot_loader() -> Arc<dyn ClassLoader> {
    Arc::new(PathClassLoader::new("boot", vec![], None))
}

/// Log sink that captures warnings for assertions.
#[derive(Default)]
pub struct CaptureSink {
    messages: Mutex<Vec<String>>,
}

impl CaptureSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl LogSink for CaptureSink {
    fn warn(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Default options with a capturing sink installed.
pub fn options_with_sink(sink: Arc<CaptureSink>) -> LoaderOptions {
    LoaderOptions {
        log: sink,
        ..LoaderOptions::default()
    }
}
