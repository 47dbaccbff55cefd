//! Layered class-loading engine for running user code inside a build
//! process.
//!
//! The engine keeps the rarely changing dependency classpath loaded and
//! cached between task invocations while reloading the frequently changing
//! project classes for every task, and it stages native libraries into
//! task-owned temp directories with process-exit cleanup.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────┐
//!                  │    parent loader      │  host classes
//!                  └──────────▲───────────┘
//!                             │ delegate
//!                  ┌──────────┴───────────┐
//!        ┌──keep──►│   DependencyLoader    │  dependency classpath,
//!        │         │  (cached in the pool) │  cached while clean
//!        │         └──────▲─────────┬─────┘
//!   ┌────┴─────┐  delegate│         │ reverse edge
//!   │LoaderPool │         │         │ (dirties the loader)
//!   └────▲─────┘  ┌───────┴─────────▼─────┐
//!        │        │      TaskLoader        │  dynamic classpath,
//!        └─check──│     (one per task)     │  rebuilt every task
//!          in     └───────────────────────┘
//! ```
//!
//! One pool exists per (dependency classpath, parent) identity and caches at
//! most one idle [`DependencyLoader`]. A checkout configures that loader for
//! the task (staging directory, resource sub-loader over the task's full
//! classpath) and wraps it in a fresh [`TaskLoader`]; closing the task
//! loader returns the dependency loader, which is cached again only if no
//! reverse-edge lookup captured a task-layer class in the meantime.
//!
//! Closed loaders never serve from their primary classpath again: lookups
//! that arrive late (background threads leaking past task end) are answered
//! by a [`ZombieLoader`] rebuilt over the same entries, with a one-shot
//! warning through the configured [`LogSink`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use strata_loader::{ClassLoader, LoaderOptions, LoaderPool, PathClassLoader};
//!
//! let parent: Arc<dyn ClassLoader> =
//!     Arc::new(PathClassLoader::new("system", vec![], None));
//! let pool = LoaderPool::new(
//!     vec![PathBuf::from("out/deps")],
//!     parent,
//!     LoaderOptions::default(),
//! );
//!
//! let task = pool.checkout(
//!     vec![PathBuf::from("out/deps"), PathBuf::from("out/app")],
//!     PathBuf::from("/tmp/task-1"),
//! )?;
//! let class = task.load_class("app.Main")?;
//! // ... run the task ...
//! task.close();
//! # Ok::<(), strata_loader::LoaderError>(())
//! ```

pub mod config;

mod class;
mod dependency;
mod error;
mod lock;
mod managed;
mod native;
mod pool;
mod task;
mod zombie;

pub use class::{
    class_file_path, ClassLoader, LoadedClass, LoaderId, PathClassLoader, CLASS_FILE_SUFFIX,
};
pub use dependency::DependencyLoader;
pub use error::{LoaderError, Result};
pub use lock::ClassLoadingLock;
pub use managed::{LoaderOptions, LogSink, ManagedLoader, TracingSink};
pub use native::{platform_library_name, NativeLibraryRegistry, NativeStager};
pub use pool::{LoaderPool, PoolStats};
pub use task::TaskLoader;
pub use zombie::ZombieLoader;
