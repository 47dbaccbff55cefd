//! Native library staging subsystem.
//!
//! The runtime binds a native library to its file path for the lifetime of
//! the loader that requested it, but task temp directories come and go. So
//! every loader *stages* libraries: the requested logical name is resolved
//! against a search path, the file is copied into the loader's current temp
//! directory, and the copy is tracked by a process-wide registry whose exit
//! hook deletes whatever is still staged when the process ends.
//!
//! ```text
//!  find_library("foo")
//!        │
//!        ▼
//!  ┌──────────────┐   search path    ┌─────────────────────────┐
//!  │ NativeStager │ ───────────────► │ /opt/libs/libfoo.so     │
//!  │  (per loader)│                  └─────────────────────────┘
//!  └──────┬───────┘                              │ copy
//!         │ register                             ▼
//!  ┌──────▼──────────────────┐       ┌─────────────────────────┐
//!  │ NativeLibraryRegistry   │       │ {temp_dir}/libfoo.so    │
//!  │  (process-wide + hook)  │       └─────────────────────────┘
//!  └─────────────────────────┘
//! ```

mod registry;
mod stager;

pub use registry::NativeLibraryRegistry;
pub use stager::{platform_library_name, NativeStager};
