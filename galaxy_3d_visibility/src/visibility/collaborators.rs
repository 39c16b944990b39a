/// Collaborator traits consumed by the visibility pipeline.
///
/// Draw submission, occlusion and streaming live outside the core and are
/// reached only through these traits.

use std::sync::Arc;
use crate::scene::{BoundedObject, AABB};
use super::lod::LodResolution;

/// Receives visible objects, front to back, on the owner thread
pub trait RenderSubmission {
    fn submit(&mut self, object: &Arc<dyn BoundedObject>, lod: LodResolution, distance: f32, sort_key: u32);
}

/// Occlusion backend (coverage buffer, portals, ...). Called from workers.
pub trait OcclusionTester: Send + Sync {
    /// `true` when the box may be visible
    fn test_aabb(&self, bbox: &AABB, distance: f32) -> bool;
}

/// Occlusion disabled: everything is visible
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOcclusion;

impl OcclusionTester for NoOcclusion {
    fn test_aabb(&self, _bbox: &AABB, _distance: f32) -> bool {
        true
    }
}

/// Receives streaming priority updates
pub trait StreamingSink {
    /// `importance` is 1.0 for objects near or in front of the camera
    fn update_priority(&mut self, object: &Arc<dyn BoundedObject>, distance: f32, importance: f32);
}
