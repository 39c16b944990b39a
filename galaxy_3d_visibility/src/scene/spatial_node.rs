/// SpatialNode: one cell of an arena octree.
///
/// Nodes live in a `SlotMap<NodeKey, SpatialNode>` owned by their `Octree`.
/// Parent and children are keys into the same arena. Objects are referenced
/// by `ObjectKey`; each object records `(node, list, index)` so it can be
/// unlinked with a swap-remove.
///
/// Aggregated data (objects box, flags, max view distance) only grows on
/// insert. `Octree::cleanup` recomputes it exactly.

use glam::Vec3;
use slotmap::new_key_type;
use crate::config::SceneConfig;
use super::aabb::AABB;
use super::bounded_object::{ObjectList, RenderFlags, RenderKind};
use super::spatial_index::ObjectKey;

new_key_type! {
    /// Key of a node inside its octree arena
    pub struct NodeKey;
}

/// Shadow caster registered in a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CasterEntry {
    pub object: ObjectKey,
    pub max_cast_distance: f32,
    pub kind: RenderKind,
}

/// Octree node
#[derive(Debug)]
pub struct SpatialNode {
    pub(crate) center: Vec3,
    pub(crate) half_extents: Vec3,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: [Option<NodeKey>; 8],
    pub(crate) lists: [Vec<ObjectKey>; ObjectList::COUNT],
    pub(crate) objects_box: AABB,
    pub(crate) render_flags: RenderFlags,
    pub(crate) max_view_dist: f32,
    pub(crate) has_lights: bool,
    pub(crate) casters: Vec<CasterEntry>,
    /// Already queued in the octree's pending-empty list
    pub(crate) pending_release: bool,
}

impl SpatialNode {
    pub(crate) fn new(center: Vec3, half_extents: Vec3, parent: Option<NodeKey>) -> Self {
        Self {
            center,
            half_extents,
            parent,
            children: [None; 8],
            lists: [Vec::new(), Vec::new()],
            objects_box: AABB::EMPTY,
            render_flags: RenderFlags::empty(),
            max_view_dist: 0.0,
            has_lights: false,
            casters: Vec::new(),
            pending_release: false,
        }
    }

    // ===== GETTERS =====

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    /// Cell box (not the objects box)
    pub fn node_box(&self) -> AABB {
        AABB::from_center_half_extents(self.center, self.half_extents)
    }

    /// Union of every object box ever inserted at or below this node
    pub fn objects_box(&self) -> &AABB {
        &self.objects_box
    }

    pub fn render_flags(&self) -> RenderFlags {
        self.render_flags
    }

    pub fn max_view_distance(&self) -> f32 {
        self.max_view_dist
    }

    pub fn has_lights(&self) -> bool {
        self.has_lights
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.children.iter().flatten().copied()
    }

    pub fn objects(&self, list: ObjectList) -> &[ObjectKey] {
        &self.lists[list.index()]
    }

    pub fn casters(&self) -> &[CasterEntry] {
        &self.casters
    }

    pub fn object_count(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    pub fn has_objects(&self) -> bool {
        self.lists.iter().any(|list| !list.is_empty())
    }

    pub fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    /// No objects and no children
    pub fn is_empty(&self) -> bool {
        !self.has_objects() && !self.has_children()
    }

    // ===== GEOMETRY =====

    /// Squared half diagonal of the cell
    pub fn node_radius_sq(&self) -> f32 {
        self.half_extents.length_squared()
    }

    /// Cells split while their edge is larger than `node_min_size`
    pub fn can_split(&self, node_min_size: f32) -> bool {
        self.half_extents.x * 2.0 > node_min_size
    }

    /// Octant of `point`: x selects bit 2, y bit 1, z bit 0 (set when above center)
    pub fn octant_of(&self, point: Vec3) -> usize {
        ((point.x > self.center.x) as usize) << 2
            | ((point.y > self.center.y) as usize) << 1
            | (point.z > self.center.z) as usize
    }

    /// Center and half extents of the child cell at `octant`
    pub fn child_cell(&self, octant: usize) -> (Vec3, Vec3) {
        let half = self.half_extents * 0.5;
        let sign = |bit: usize| if octant & bit != 0 { 1.0 } else { -1.0 };
        let offset = Vec3::new(sign(4) * half.x, sign(2) * half.y, sign(1) * half.z);
        (self.center + offset, half)
    }

    /// Whether an object with these bounds still belongs exactly here.
    ///
    /// Fails when the center left the cell (root excepted), when the objects
    /// box no longer contains the object, when the object is big enough to
    /// belong to an ancestor (root excepted), or small enough to sink into a
    /// child.
    pub fn is_right_node(&self, bbox: &AABB, radius_sq: f32, config: &SceneConfig) -> bool {
        let is_root = self.parent.is_none();

        if !is_root && !self.node_box().contains_point(bbox.center()) {
            return false;
        }
        if !self.objects_box.contains(bbox) {
            return false;
        }

        let ratio = config.object_to_node_size_ratio;
        let rated = self.node_radius_sq() * ratio * ratio;
        if !is_root && radius_sq > rated * 4.0 {
            return false;
        }
        if self.can_split(config.node_min_size) && radius_sq < rated {
            return false;
        }
        true
    }
}

#[cfg(test)]
#[path = "spatial_node_tests.rs"]
mod tests;
