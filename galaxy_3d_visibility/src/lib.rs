/*!
# Galaxy 3D Visibility

Spatial index and per-frame visibility core for the Galaxy 3D engine.

Placed objects are registered into loose octrees (one outdoor tree and one
private tree per indoor vis-area). Every frame the scheduler walks the trees
front to back, fans culling out to rayon tasks, resolves LOD with dissolve
hysteresis and hands the visible set to a render submission collaborator,
sorted nearest first.

## Architecture

- **Scene**: facade owning everything below, bound to its creating thread
- **SpatialIndex / Octree**: object registry and arena octrees
- **TempDataPool**: transient per-object render state with frame-based GC
- **PhysicsAreaTracker**: dirty physics areas and per-object proxies
- **VisibilityScheduler**: frame lifecycle, cull queues, LOD resolution

Draw submission, occlusion, vis-area graphs and streaming are collaborators
reached through traits (`RenderSubmission`, `OcclusionTester`,
`VisAreaGraph`, `StreamingSink`).
*/

// Internal modules
mod error;
mod engine;
mod context;
pub mod config;
pub mod log;
pub mod camera;
pub mod scene;
pub mod visibility;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging sink
    pub use crate::engine::Engine;

    // Explicit replacement for engine globals
    pub use crate::config::SceneConfig;
    pub use crate::context::SceneContext;

    // Facade
    pub use crate::scene::{Scene, SceneStats};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    pub mod camera {
        pub use crate::camera::*;
    }

    pub mod scene {
        pub use crate::scene::*;
    }

    pub mod visibility {
        pub use crate::visibility::*;
    }
}

// Re-export math library at crate root
pub use glam;
