//! Visibility module
//!
//! Per-frame culling: LOD selection with dissolve hysteresis, bounded cull
//! queues, the traversal task group and the scheduler driving them.

mod collaborators;
mod cull_queue;
mod lod;
mod task_group;
mod visibility_scheduler;

pub use collaborators::{NoOcclusion, OcclusionTester, RenderSubmission, StreamingSink};
pub use cull_queue::CullQueue;
pub use lod::{resolve_lod, select_lod, DissolveState, LodResolution};
pub use task_group::TaskGroup;
pub use visibility_scheduler::{CullRequest, CullResult, FramePhase, FrameStats, VisibilityScheduler};
