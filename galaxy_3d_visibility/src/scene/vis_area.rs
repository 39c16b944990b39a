/// Vis-area graph collaborator.
///
/// Indoor areas and their portals are owned elsewhere. The core only asks
/// which area contains a point and which areas are visible from the camera;
/// each area gets its own private octree.

use glam::Vec3;
use super::aabb::AABB;

/// Identifier of an indoor vis-area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisAreaId(pub u32);

/// Portal/vis-area graph consumed by registration and traversal
pub trait VisAreaGraph: Send + Sync {
    /// Area containing `point`, `None` outdoors
    fn area_containing(&self, point: Vec3) -> Option<VisAreaId>;

    /// Cheap containment check against a known area
    fn is_point_inside(&self, area: VisAreaId, point: Vec3) -> bool;

    /// Bounds used to create the area's octree root
    fn area_bounds(&self, area: VisAreaId) -> AABB;

    /// Areas to traverse this frame
    fn visible_areas(&self, camera_position: Vec3) -> Vec<VisAreaId> {
        self.area_containing(camera_position).into_iter().collect()
    }

    /// Whether the outdoor tree is visible this frame
    fn outdoor_visible(&self, _camera_position: Vec3) -> bool {
        true
    }
}

/// Outdoor-only world: no vis-areas at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVisAreas;

impl VisAreaGraph for NoVisAreas {
    fn area_containing(&self, _point: Vec3) -> Option<VisAreaId> {
        None
    }

    fn is_point_inside(&self, _area: VisAreaId, _point: Vec3) -> bool {
        false
    }

    fn area_bounds(&self, _area: VisAreaId) -> AABB {
        AABB::EMPTY
    }

    fn visible_areas(&self, _camera_position: Vec3) -> Vec<VisAreaId> {
        Vec::new()
    }
}
