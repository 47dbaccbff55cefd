//! Single-slot cache of idle dependency loaders.
//!
//! One pool exists per (dependency classpath, parent) identity. Checkout
//! hands out a fresh task-layer loader wrapped around either the cached
//! dependency loader or a newly built one; checkin decides the returned
//! loader's fate: dirty or late returns are closed, clean returns win the
//! slot. A displaced previous occupant is closed, since the last returned
//! loader carries the most recently configured resource sub-loader and only
//! one needs to stay warm.
//!
//! A single slot is deliberate: concurrent tasks over the same dependency
//! classpath are rare, and serving a fresh loader while the slot's occupant
//! is out is always safe.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::class::ClassLoader;
use crate::dependency::DependencyLoader;
use crate::error::{LoaderError, Result};
use crate::managed::LoaderOptions;
use crate::task::TaskLoader;

/// Counters describing a pool's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful checkouts.
    pub checkouts: u64,
    /// Checkouts served from the idle slot.
    pub slot_hits: u64,
    /// Checkouts that built a fresh dependency loader.
    pub fresh_creates: u64,
    /// Checkins closed because the loader was dirty.
    pub dirty_invalidations: u64,
    /// Slot occupants closed because a later checkin displaced them.
    pub displaced: u64,
}

#[derive(Default)]
struct PoolCounters {
    checkouts: AtomicU64,
    slot_hits: AtomicU64,
    fresh_creates: AtomicU64,
    dirty_invalidations: AtomicU64,
    displaced: AtomicU64,
}

/// Holder of at most one idle [`DependencyLoader`].
pub struct LoaderPool {
    dependency_classpath: Vec<PathBuf>,
    parent: Arc<dyn ClassLoader>,
    options: LoaderOptions,
    slot: Mutex<Option<Arc<DependencyLoader>>>,
    closed: AtomicBool,
    seq: AtomicU64,
    counters: PoolCounters,
}

impl LoaderPool {
    /// Create a pool over a dependency classpath and parent loader.
    pub fn new(
        dependency_classpath: Vec<PathBuf>,
        parent: Arc<dyn ClassLoader>,
        options: LoaderOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            dependency_classpath,
            parent,
            options,
            slot: Mutex::new(None),
            closed: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            counters: PoolCounters::default(),
        })
    }

    /// The dependency classpath this pool serves.
    pub fn dependency_classpath(&self) -> &[PathBuf] {
        &self.dependency_classpath
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the slot currently holds an idle loader. Diagnostic only.
    pub fn has_idle(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Activity counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            checkouts: self.counters.checkouts.load(Ordering::Relaxed),
            slot_hits: self.counters.slot_hits.load(Ordering::Relaxed),
            fresh_creates: self.counters.fresh_creates.load(Ordering::Relaxed),
            dirty_invalidations: self.counters.dirty_invalidations.load(Ordering::Relaxed),
            displaced: self.counters.displaced.load(Ordering::Relaxed),
        }
    }

    /// Check out a task-scoped loader for one task run.
    ///
    /// Reuses the idle dependency loader when one is cached, configures it
    /// for this checkout, and wraps it in a fresh [`TaskLoader`] registered
    /// as its reverse-edge child. The caller must close the task loader at
    /// task end; that is what returns the dependency loader here.
    pub fn checkout(
        self: &Arc<Self>,
        full_classpath: Vec<PathBuf>,
        temp_dir: PathBuf,
    ) -> Result<Arc<TaskLoader>> {
        if self.is_closed() {
            return Err(LoaderError::PoolClosed);
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let idle = self.slot.lock().take();
        let dep = match idle {
            Some(idle) => {
                self.counters.slot_hits.fetch_add(1, Ordering::Relaxed);
                debug!(loader = %idle.label(), "reusing idle dependency loader");
                idle
            }
            None => {
                self.counters.fresh_creates.fetch_add(1, Ordering::Relaxed);
                let dep = Arc::new(DependencyLoader::new(
                    format!("dependency-{seq}"),
                    self.dependency_classpath.clone(),
                    self.parent.clone(),
                    self.options.clone(),
                ));
                debug!(loader = %dep.label(), "created dependency loader");
                dep
            }
        };
        dep.setup(temp_dir.clone(), full_classpath.clone());

        let task = Arc::new(TaskLoader::new(
            format!("task-{seq}"),
            full_classpath,
            dep.clone(),
            Arc::clone(self),
            temp_dir,
            self.options.clone(),
        ));
        dep.set_descendant(Arc::downgrade(&task));
        self.counters.checkouts.fetch_add(1, Ordering::Relaxed);
        Ok(task)
    }

    /// Return a dependency loader at task end.
    ///
    /// Dirty loaders and returns into a closed pool are closed instead of
    /// cached. Otherwise the loader takes the slot; a displaced previous
    /// occupant is closed (last returned wins). The closed flag is
    /// re-checked after installation so a racing [`close`](Self::close)
    /// cannot leave a live loader stranded in the slot.
    pub(crate) fn checkin(&self, dep: Arc<DependencyLoader>) {
        if dep.is_dirty() {
            self.counters
                .dirty_invalidations
                .fetch_add(1, Ordering::Relaxed);
            debug!(loader = %dep.label(), "discarding dirty dependency loader");
            dep.close();
            return;
        }
        if self.is_closed() {
            dep.close();
            return;
        }

        let displaced = self.slot.lock().replace(dep.clone());
        if let Some(previous) = displaced {
            if !Arc::ptr_eq(&previous, &dep) {
                self.counters.displaced.fetch_add(1, Ordering::Relaxed);
                debug!(loader = %previous.label(), "displaced idle dependency loader");
                previous.close();
            }
        }

        if self.is_closed() {
            if let Some(stranded) = self.slot.lock().take() {
                stranded.close();
            }
        }
    }

    /// Close the pool: later checkouts fail and later checkins close their
    /// argument. The idle occupant, if any, is closed now.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closing loader pool");
        }
        if let Some(idle) = self.slot.lock().take() {
            idle.close();
        }
    }
}
