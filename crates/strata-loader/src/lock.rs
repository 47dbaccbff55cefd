//! Name-striped locking for class loads.
//!
//! Serializes concurrent loads of the *same* name through one loader while
//! letting distinct names proceed in parallel. The entry table is guarded by
//! a single short-lived mutex; the caller's closure runs holding only the
//! per-name mutex. Entries are removed as soon as no load is in flight, so
//! the table never grows beyond the set of names currently being loaded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Per-name mutex plus a holder count. The count is only touched under the
/// table mutex.
#[derive(Default)]
struct NameMutex {
    mutex: Mutex<()>,
    holders: AtomicUsize,
}

impl NameMutex {
    fn bump(&self) {
        self.holders.fetch_add(1, Ordering::Relaxed);
    }

    /// True when this was the last holder.
    fn unbump(&self) -> bool {
        self.holders.fetch_sub(1, Ordering::Relaxed) == 1
    }
}

/// Striped per-name mutex table.
#[derive(Default)]
pub struct ClassLoadingLock {
    entries: Mutex<HashMap<String, Arc<NameMutex>>>,
}

impl ClassLoadingLock {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the mutex for `name`.
    ///
    /// Entry bookkeeping happens under the table mutex; `f` itself runs
    /// under the per-name mutex only. The entry is released (and removed
    /// when unused) even if `f` panics.
    pub fn with_lock<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let entry = self.acquire(name);
        let _release = ReleaseOnDrop { table: self, name };
        let _guard = entry.mutex.lock();
        f()
    }

    /// Number of names currently being loaded. Diagnostic only.
    pub fn in_flight(&self) -> usize {
        self.entries.lock().len()
    }

    fn acquire(&self, name: &str) -> Arc<NameMutex> {
        let mut table = self.entries.lock();
        let entry = table
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(NameMutex::default()))
            .clone();
        entry.bump();
        entry
    }

    fn release(&self, name: &str) {
        let mut table = self.entries.lock();
        let last_holder = table.get(name).is_some_and(|entry| entry.unbump());
        if last_holder {
            table.remove(name);
        }
    }
}

struct ReleaseOnDrop<'a> {
    table: &'a ClassLoadingLock,
    name: &'a str,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.table.release(self.name);
    }
}
