/*!
# Galaxy 3D Scene Sync

Incremental synchronization of a host scene graph into a native render
backend.

Each frame, the engine compares the source scene against what it already
mirrored and issues the minimal set of backend calls: realize, move, rebind,
hide or remove. Geometry shared by several objects is uploaded once; the
first object realized for a geometry becomes its prototype and the others
become instances of it.

## Architecture

- **SceneGraphProvider**: read access to the source scene (keys, transforms,
  dirty flags, duplicator output, materials, environment)
- **RenderBackend**: the native renderer the scene is mirrored into
- **SyncEngine**: geometry cache, prototype/instance state machine, material
  reassignment, duplicator reconciliation and the per-frame driver
- **SettingsDiffer**: caller-driven diff of nested settings trees, used for
  the environment section
*/

// Internal modules
mod error;
pub mod log;
pub mod keys;
pub mod backend;
pub mod source;
pub mod geometry;
pub mod sync;
pub mod settings;

#[cfg(test)]
mod test_fixtures;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result, SkipReason, SkippedObject};

    // Engine
    pub use crate::sync::SyncEngine;

    // Backend trait
    pub use crate::backend::RenderBackend;

    // Logging sub-module (types and entry points, NOT macros)
    pub mod log {
        pub use crate::log::{
            Logger, LogEntry, LogSeverity, DefaultLogger, set_logger, reset_logger,
            log, log_detailed,
        };
    }

    // Identity keys
    pub mod keys {
        pub use crate::keys::*;
    }

    // Backend sub-module
    pub mod backend {
        pub use crate::backend::*;
    }

    // Source scene sub-module
    pub mod source {
        pub use crate::source::*;
    }

    // Geometry sub-module
    pub mod geometry {
        pub use crate::geometry::*;
    }

    // Synchronization sub-module
    pub mod sync {
        pub use crate::sync::*;
    }

    // Settings sub-module
    pub mod settings {
        pub use crate::settings::*;
    }
}

// Re-export math library at crate root
pub use glam;
