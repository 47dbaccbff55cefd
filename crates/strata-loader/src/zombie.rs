//! Post-close fallback loader.
//!
//! Background threads from a finished task can outlive their loader. A
//! lookup arriving after `close` must not surface an opaque null-class
//! failure: the fallback re-reads the same classpath from disk and, when
//! even that fails, reports classpath entries whose backing files have
//! vanished so the cause (a shutdown hook cleaning temp output) is visible.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::class::{class_file_path, next_loader_id, scan_classpath, DefinedClasses, LoadedClass};
use crate::error::{LoaderError, Result};

/// Fallback loader serving lookups that arrive after the primary loader
/// closed.
///
/// Holds the closed loader's defined-class table as its parent reference:
/// classes the primary loader defined earlier keep their identity; anything
/// else is re-read from the same classpath and defined here.
pub struct ZombieLoader {
    label: String,
    classpath: Vec<PathBuf>,
    origin: Arc<DefinedClasses>,
    defined: DefinedClasses,
    closed: AtomicBool,
}

impl ZombieLoader {
    pub(crate) fn new(
        label: impl Into<String>,
        classpath: Vec<PathBuf>,
        origin: Arc<DefinedClasses>,
    ) -> Self {
        Self {
            label: label.into(),
            classpath,
            origin,
            defined: DefinedClasses::new(next_loader_id()),
            closed: AtomicBool::new(false),
        }
    }

    /// Diagnostic label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Load a class: first the closed loader's own definitions, then this
    /// loader's classpath.
    pub fn find_class(&self, name: &str) -> Result<Arc<LoadedClass>> {
        if let Some(class) = self.origin.get(name) {
            return Ok(class);
        }
        if let Some(class) = self.defined.get(name) {
            return Ok(class);
        }
        let rel = class_file_path(name);
        match scan_classpath(&self.classpath, &rel) {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                Ok(self.defined.define(name, bytes))
            }
            None => {
                self.report_missing_entries(name);
                Err(LoaderError::ClassNotFound(name.to_string()))
            }
        }
    }

    /// Locate a resource on the classpath.
    pub fn find_resource(&self, name: &str) -> Option<PathBuf> {
        scan_classpath(&self.classpath, Path::new(name))
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(loader = %self.label, "closed fallback loader");
        }
    }

    /// Write a diagnostic for classpath entries whose backing files are
    /// gone. Goes straight to stderr: by the time a zombie lookup fails,
    /// logging may already have been shut down.
    fn report_missing_entries(&self, name: &str) {
        let missing: Vec<&PathBuf> = self
            .classpath
            .iter()
            .filter(|entry| !entry.exists())
            .collect();
        if missing.is_empty() {
            return;
        }
        eprintln!(
            "`{}` could not load `{}`: {} classpath entr{} no longer exist{}, \
             possibly removed by a shutdown hook:",
            self.label,
            name,
            missing.len(),
            if missing.len() == 1 { "y" } else { "ies" },
            if missing.len() == 1 { "s" } else { "" },
        );
        for entry in missing {
            eprintln!("  {}", entry.display());
        }
    }
}
