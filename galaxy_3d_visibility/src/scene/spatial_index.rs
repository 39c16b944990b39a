/// SpatialIndex: object registry plus the outdoor and vis-area octrees.
///
/// Every registered object gets an `ObjectEntry` caching what traversal
/// reads (bounds, radius², view distance, kind, flags) and a weak home
/// back-reference (tree, node, list, index). Objects flagged
/// ALWAYS_VISIBLE bypass the trees and sit in a flat list.
///
/// Identity is the `Arc` data pointer: re-registering the same `Arc` is
/// an update, never a duplicate.

use std::sync::Arc;
use glam::Vec3;
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use crate::camera::Frustum;
use crate::context::SceneContext;
use crate::error::{Error, Result};
use crate::visibility::StreamingSink;
use super::aabb::AABB;
use super::bounded_object::{BoundedObject, ObjectList, RenderFlags, RenderKind};
use super::octree::{ObjectCountFilter, Octree, TreeId};
use super::spatial_node::NodeKey;
use super::temp_data_pool::{TempDataPool, TempSlot};
use super::vis_area::{VisAreaGraph, VisAreaId};

new_key_type! {
    /// Handle of a registered object
    pub struct ObjectKey;
}

pub(crate) type ObjectArena = SlotMap<ObjectKey, ObjectEntry>;

/// Objects closer than this are always streamed at full importance
const STREAMING_NEAR_DISTANCE: f32 = 4.0;
const STREAMING_BEHIND_IMPORTANCE: f32 = 0.8;

/// Where an object currently lives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectHome {
    Detached,
    AlwaysVisible { index: usize },
    Node {
        tree: TreeId,
        node: NodeKey,
        list: ObjectList,
        index: usize,
    },
}

/// Result of `register_object`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First registration
    Inserted,
    /// Fast accept: the object stays in its node
    Unchanged,
    /// Unlinked and inserted again
    Rehomed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Placement {
    AlwaysVisible,
    Tree(TreeId),
}

// ===== OBJECT ENTRY =====

/// Per-object data cached at registration
pub struct ObjectEntry {
    pub(crate) object: Arc<dyn BoundedObject>,
    pub(crate) bbox: AABB,
    pub(crate) radius_sq: f32,
    pub(crate) max_view_dist: f32,
    pub(crate) kind: RenderKind,
    pub(crate) flags: RenderFlags,
    pub(crate) home: ObjectHome,
    pub(crate) temp_slot: Arc<TempSlot>,
}

impl ObjectEntry {
    pub(crate) fn new(object: Arc<dyn BoundedObject>) -> Self {
        let bbox = object.bounds();
        Self {
            bbox,
            radius_sq: bbox.radius_sq(),
            max_view_dist: object.max_view_distance(),
            kind: object.render_kind(),
            flags: object.render_flags(),
            home: ObjectHome::Detached,
            temp_slot: Arc::new(TempSlot::new()),
            object,
        }
    }

    fn refresh(&mut self, bbox: AABB) {
        self.bbox = bbox;
        self.radius_sq = bbox.radius_sq();
        self.max_view_dist = self.object.max_view_distance();
        self.kind = self.object.render_kind();
        self.flags = self.object.render_flags();
    }

    pub fn object(&self) -> &Arc<dyn BoundedObject> {
        &self.object
    }

    pub fn bbox(&self) -> &AABB {
        &self.bbox
    }

    pub fn radius_sq(&self) -> f32 {
        self.radius_sq
    }

    pub fn max_view_distance(&self) -> f32 {
        self.max_view_dist
    }

    pub fn kind(&self) -> RenderKind {
        self.kind
    }

    pub fn flags(&self) -> RenderFlags {
        self.flags
    }

    pub fn home(&self) -> ObjectHome {
        self.home
    }

    pub fn temp_slot(&self) -> &Arc<TempSlot> {
        &self.temp_slot
    }
}

fn identity_of(object: &Arc<dyn BoundedObject>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

/// Content check applied before any insertion
fn check_content(bbox: &AABB, max_view_dist: f32, max_extent: f32) -> std::result::Result<(), String> {
    if !bbox.min.is_finite() || !bbox.max.is_finite() {
        return Err(format!("non-finite bounds {:?}", bbox));
    }
    if bbox.min.cmpgt(bbox.max).any() {
        return Err(format!("inverted bounds {:?}", bbox));
    }
    if bbox.size().max_element() > max_extent {
        return Err(format!("extent {} above limit {}", bbox.size().max_element(), max_extent));
    }
    if !max_view_dist.is_finite() || max_view_dist < 0.0 {
        return Err(format!("invalid max view distance {}", max_view_dist));
    }
    Ok(())
}

// ===== SPATIAL INDEX =====

pub struct SpatialIndex {
    context: Arc<SceneContext>,
    pool: Arc<TempDataPool>,
    vis_areas: Arc<dyn VisAreaGraph>,
    objects: ObjectArena,
    identity: FxHashMap<usize, ObjectKey>,
    outdoor: Octree,
    areas: FxHashMap<VisAreaId, Octree>,
    always_visible: Vec<ObjectKey>,
    rejected: usize,
}

impl SpatialIndex {
    pub fn new(context: Arc<SceneContext>, pool: Arc<TempDataPool>, vis_areas: Arc<dyn VisAreaGraph>) -> Self {
        let world_bounds = context.config().world_bounds;
        Self {
            context,
            pool,
            vis_areas,
            objects: SlotMap::with_key(),
            identity: FxHashMap::default(),
            outdoor: Octree::new(TreeId::Outdoor, world_bounds),
            areas: FxHashMap::default(),
            always_visible: Vec::new(),
            rejected: 0,
        }
    }

    // ===== REGISTRATION =====

    /// Register a new object or re-home a known one.
    ///
    /// Invalid content is rejected; a known object that turned invalid is
    /// unregistered as well.
    pub fn register(&mut self, object: Arc<dyn BoundedObject>) -> Result<(ObjectKey, RegisterOutcome)> {
        let bbox = object.bounds();
        let existing = self.identity.get(&identity_of(&object)).copied();

        if let Err(reason) = check_content(&bbox, object.max_view_distance(), self.context.config().max_object_extent) {
            self.rejected += 1;
            crate::engine_error!(
                "galaxy3d::SpatialIndex",
                "Rejected object '{}': {}",
                object.name(),
                reason
            );
            if let Some(key) = existing {
                self.remove_key(key);
            }
            return Err(Error::InvalidBounds(format!("{}: {}", object.name(), reason)));
        }

        match existing {
            Some(key) => Ok((key, self.update_existing(key, bbox))),
            None => {
                let id = identity_of(&object);
                let key = self.objects.insert(ObjectEntry::new(object));
                self.identity.insert(id, key);
                let placement = self.placement_for(key);
                self.place(key, placement);
                Ok((key, RegisterOutcome::Inserted))
            }
        }
    }

    fn update_existing(&mut self, key: ObjectKey, bbox: AABB) -> RegisterOutcome {
        let old_kind = self.objects[key].kind;
        self.objects[key].refresh(bbox);
        self.pool.update_phys_proxy(&self.objects[key].temp_slot, bbox);

        let entry = &self.objects[key];
        let placement = self.placement_for(key);
        let config = self.context.config();

        let accept = match (entry.home, placement) {
            (ObjectHome::AlwaysVisible { .. }, Placement::AlwaysVisible) => true,
            (ObjectHome::Node { tree, node, .. }, Placement::Tree(target)) => {
                tree == target
                    && old_kind == entry.kind
                    && self
                        .tree(tree)
                        .is_some_and(|octree| octree.is_right_node(node, &entry.bbox, entry.radius_sq, config))
            }
            _ => false,
        };

        if accept {
            if let ObjectHome::Node { tree, .. } = entry.home {
                match tree {
                    TreeId::Outdoor => self.outdoor.refresh_in_place(&self.objects, key, config),
                    TreeId::Area(area) => {
                        if let Some(octree) = self.areas.get_mut(&area) {
                            octree.refresh_in_place(&self.objects, key, config);
                        }
                    }
                }
            }
            return RegisterOutcome::Unchanged;
        }

        self.detach(key);
        self.place(key, placement);
        RegisterOutcome::Rehomed
    }

    /// Tree (or always-visible list) the object belongs to with its current data.
    ///
    /// An object already inside a vis-area stays there while the area still
    /// contains its center; otherwise the graph is asked. Outdoor objects that
    /// remain outdoors keep their membership.
    fn placement_for(&self, key: ObjectKey) -> Placement {
        let entry = &self.objects[key];
        if entry.flags.contains(RenderFlags::ALWAYS_VISIBLE) {
            return Placement::AlwaysVisible;
        }
        if entry.flags.contains(RenderFlags::OUTDOOR_ONLY) {
            return Placement::Tree(TreeId::Outdoor);
        }

        let center = entry.bbox.center();
        if let ObjectHome::Node { tree: TreeId::Area(area), .. } = entry.home {
            if self.vis_areas.is_point_inside(area, center) {
                return Placement::Tree(TreeId::Area(area));
            }
        }
        match self.vis_areas.area_containing(center) {
            Some(area) => Placement::Tree(TreeId::Area(area)),
            None => Placement::Tree(TreeId::Outdoor),
        }
    }

    fn place(&mut self, key: ObjectKey, placement: Placement) {
        let config = self.context.config();
        match placement {
            Placement::AlwaysVisible => {
                let index = self.always_visible.len();
                self.always_visible.push(key);
                self.objects[key].home = ObjectHome::AlwaysVisible { index };
            }
            Placement::Tree(TreeId::Outdoor) => {
                self.outdoor.insert(&mut self.objects, key, config);
            }
            Placement::Tree(TreeId::Area(area)) => {
                let bounds = self.vis_areas.area_bounds(area);
                if !bounds.is_valid() {
                    crate::engine_warn!(
                        "galaxy3d::SpatialIndex",
                        "Vis-area {:?} has invalid bounds {:?}, placing '{}' outdoors",
                        area,
                        bounds,
                        self.objects[key].object.name()
                    );
                    self.outdoor.insert(&mut self.objects, key, config);
                    return;
                }
                let octree = self
                    .areas
                    .entry(area)
                    .or_insert_with(|| Octree::new(TreeId::Area(area), bounds));
                octree.insert(&mut self.objects, key, config);
            }
        }
    }

    /// Unlink from the current home, keeping the entry
    fn detach(&mut self, key: ObjectKey) {
        match self.objects[key].home {
            ObjectHome::Detached => {}
            ObjectHome::AlwaysVisible { index } => {
                debug_assert_eq!(self.always_visible.get(index), Some(&key));
                self.always_visible.swap_remove(index);
                if let Some(&moved) = self.always_visible.get(index) {
                    self.objects[moved].home = ObjectHome::AlwaysVisible { index };
                }
                self.objects[key].home = ObjectHome::Detached;
            }
            ObjectHome::Node { tree: TreeId::Outdoor, .. } => {
                self.outdoor.remove(&mut self.objects, key);
            }
            ObjectHome::Node { tree: TreeId::Area(area), .. } => {
                if let Some(octree) = self.areas.get_mut(&area) {
                    octree.remove(&mut self.objects, key);
                }
            }
        }
    }

    fn remove_key(&mut self, key: ObjectKey) -> Option<Arc<dyn BoundedObject>> {
        self.detach(key);
        let entry = self.objects.remove(key)?;
        self.identity.remove(&identity_of(&entry.object));
        self.pool.release_slot(&entry.temp_slot);
        Some(entry.object)
    }

    /// Remove an object and release its temp record
    pub fn unregister(&mut self, object: &Arc<dyn BoundedObject>) -> bool {
        match self.identity.get(&identity_of(object)).copied() {
            Some(key) => self.remove_key(key).is_some(),
            None => false,
        }
    }

    /// Unregister every object carrying any flag of `mask`
    pub fn unregister_by_flags(&mut self, mask: RenderFlags) -> usize {
        let keys: Vec<ObjectKey> = self
            .objects
            .iter()
            .filter(|(_, entry)| entry.flags.intersects(mask))
            .map(|(key, _)| key)
            .collect();
        keys.into_iter().filter(|key| self.remove_key(*key).is_some()).count()
    }

    /// Collect objects (all, or those intersecting `area`), optionally
    /// unregistering them
    pub fn move_objects_into_list(&mut self, area: Option<&AABB>, remove: bool) -> Vec<Arc<dyn BoundedObject>> {
        let mut keys = Vec::new();
        for octree in self.trees() {
            octree.collect_all(&self.objects, area, &mut keys);
        }
        keys.extend(
            self.always_visible
                .iter()
                .copied()
                .filter(|key| area.map_or(true, |bbox| self.objects[*key].bbox.intersects(bbox))),
        );

        if remove {
            keys.into_iter().filter_map(|key| self.remove_key(key)).collect()
        } else {
            keys.into_iter().map(|key| self.objects[key].object.clone()).collect()
        }
    }

    // ===== MAINTENANCE =====

    /// Recompute aggregates of every tree and queue empty nodes
    pub fn cleanup_trees(&mut self) {
        self.outdoor.cleanup(&self.objects);
        for octree in self.areas.values_mut() {
            octree.cleanup(&self.objects);
        }
    }

    /// Release queued empty nodes, then drop vis-area trees left without objects
    pub fn release_empty_nodes(&mut self) -> usize {
        let released = self.outdoor.release_empty_nodes()
            + self.areas.values_mut().map(Octree::release_empty_nodes).sum::<usize>();

        let areas_before = self.areas.len();
        self.areas.retain(|_, octree| !octree.is_empty());
        if self.areas.len() < areas_before {
            crate::engine_debug!(
                "galaxy3d::SpatialIndex",
                "Dropped {} empty vis-area trees, {} remain",
                areas_before - self.areas.len(),
                self.areas.len()
            );
        }
        released
    }

    // ===== QUERIES =====

    fn trees(&self) -> impl Iterator<Item = &Octree> + '_ {
        std::iter::once(&self.outdoor).chain(self.areas.values())
    }

    fn resolve(&self, keys: Vec<ObjectKey>) -> Vec<Arc<dyn BoundedObject>> {
        keys.into_iter().map(|key| self.objects[key].object.clone()).collect()
    }

    pub fn objects_in_box(&self, bbox: &AABB, kind: Option<RenderKind>) -> Vec<Arc<dyn BoundedObject>> {
        let mut keys = Vec::new();
        for octree in self.trees() {
            octree.collect_in_box(&self.objects, bbox, kind, &mut keys);
        }
        keys.extend(self.always_visible.iter().copied().filter(|key| {
            let entry = &self.objects[*key];
            kind.map_or(true, |k| entry.kind == k) && entry.bbox.intersects(bbox)
        }));
        self.resolve(keys)
    }

    pub fn objects_by_flags(&self, mask: RenderFlags) -> Vec<Arc<dyn BoundedObject>> {
        let mut keys = Vec::new();
        for octree in self.trees() {
            octree.collect_by_flags(&self.objects, mask, &mut keys);
        }
        keys.extend(
            self.always_visible
                .iter()
                .copied()
                .filter(|key| self.objects[*key].flags.intersects(mask)),
        );
        self.resolve(keys)
    }

    pub fn is_object_type_in_box(&self, kind: RenderKind, bbox: &AABB) -> bool {
        self.trees().any(|octree| octree.any_of_kind_in_box(&self.objects, kind, bbox))
            || self.always_visible.iter().any(|key| {
                let entry = &self.objects[*key];
                entry.kind == kind && entry.bbox.intersects(bbox)
            })
    }

    pub fn objects_count(&self, filter: ObjectCountFilter) -> usize {
        let in_trees: usize = self.trees().map(|octree| octree.count(filter)).sum();
        match filter {
            ObjectCountFilter::Main => in_trees + self.always_visible.len(),
            ObjectCountFilter::Casters => in_trees,
        }
    }

    pub fn shadow_casters_box(&self, within: Option<&AABB>) -> AABB {
        let mut bbox = AABB::EMPTY;
        for octree in self.trees() {
            octree.shadow_casters_box(&self.objects, within, &mut bbox);
        }
        bbox
    }

    pub fn collect_shadow_casters(&self, frustum: &Frustum, eye: Vec3) -> Vec<Arc<dyn BoundedObject>> {
        let mut keys = Vec::new();
        for octree in self.trees() {
            octree.collect_shadow_casters(&self.objects, frustum, eye, &mut keys);
        }
        self.resolve(keys)
    }

    /// Deepest node containing `bbox`, in the tree owning its center
    pub fn find_node_containing_box(&self, bbox: &AABB) -> Option<(TreeId, NodeKey)> {
        let octree = match self.vis_areas.area_containing(bbox.center()) {
            Some(area) => self.areas.get(&area)?,
            None => &self.outdoor,
        };
        octree
            .find_node_containing_box(bbox)
            .map(|node| (octree.id(), node))
    }

    /// Report streaming candidates nearest-first.
    ///
    /// An object is reported while `distance <= max_view_distance + prediction`.
    pub fn update_streaming_priority(
        &self,
        eye: Vec3,
        forward: Vec3,
        prediction_distance: f32,
        sink: &mut dyn StreamingSink,
    ) -> usize {
        let mut reported = 0;
        for octree in self.trees() {
            octree.walk_front_to_back(eye, |_, node| {
                if node.objects_box.is_reset()
                    || node.objects_box.distance_to_point(eye) > node.max_view_dist + prediction_distance
                {
                    return false;
                }
                for list in &node.lists {
                    for key in list {
                        let entry = &self.objects[*key];
                        let distance = entry.bbox.distance_to_point(eye);
                        if distance > entry.max_view_dist + prediction_distance {
                            continue;
                        }
                        let in_front = (entry.bbox.center() - eye).dot(forward) > 0.0;
                        let importance = if distance < STREAMING_NEAR_DISTANCE || in_front {
                            1.0
                        } else {
                            STREAMING_BEHIND_IMPORTANCE
                        };
                        sink.update_priority(&entry.object, distance, importance);
                        reported += 1;
                    }
                }
                true
            });
        }
        reported
    }

    // ===== ACCESSORS =====

    pub fn key_of(&self, object: &Arc<dyn BoundedObject>) -> Option<ObjectKey> {
        self.identity.get(&identity_of(object)).copied()
    }

    pub fn entry(&self, key: ObjectKey) -> Option<&ObjectEntry> {
        self.objects.get(key)
    }

    pub fn home_of(&self, object: &Arc<dyn BoundedObject>) -> Option<ObjectHome> {
        self.key_of(object).map(|key| self.objects[key].home)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn outdoor(&self) -> &Octree {
        &self.outdoor
    }

    pub fn tree(&self, id: TreeId) -> Option<&Octree> {
        match id {
            TreeId::Outdoor => Some(&self.outdoor),
            TreeId::Area(area) => self.areas.get(&area),
        }
    }

    pub fn vis_areas(&self) -> &Arc<dyn VisAreaGraph> {
        &self.vis_areas
    }

    pub fn always_visible(&self) -> &[ObjectKey] {
        &self.always_visible
    }

    /// Objects rejected for invalid content since creation
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }
}

#[cfg(test)]
#[path = "spatial_index_tests.rs"]
mod tests;
