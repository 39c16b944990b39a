/// Octree: arena of `SpatialNode`s with size-proportional placement.
///
/// Objects sink toward the leaves while they are small relative to the
/// node (`radius² < (node_radius * ratio)²`) and the node may still split.
/// Large objects stay near the root. There is no fixed depth limit.
///
/// Removal never destroys nodes. Emptied nodes are queued and released in
/// a batch by `release_empty_nodes`, which runs outside traversal.

use glam::Vec3;
use slotmap::SlotMap;
use crate::camera::Frustum;
use crate::config::SceneConfig;
use super::aabb::AABB;
use super::bounded_object::{ObjectList, RenderFlags, RenderKind};
use super::spatial_index::{ObjectArena, ObjectHome, ObjectKey};
use super::spatial_node::{CasterEntry, NodeKey, SpatialNode};
use super::vis_area::VisAreaId;

/// Child visit order relative to the octant holding the camera
const FRONT_TO_BACK: [usize; 8] = [0, 1, 2, 4, 3, 5, 6, 7];

/// Which tree an object lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeId {
    Outdoor,
    Area(VisAreaId),
}

/// What `Octree::count` counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectCountFilter {
    /// Objects linked into node lists
    Main,
    /// Entries of the shadow caster lists
    Casters,
}

/// One octree: the outdoor world or a single vis-area
pub struct Octree {
    id: TreeId,
    bounds: AABB,
    nodes: SlotMap<NodeKey, SpatialNode>,
    root: Option<NodeKey>,
    pending_empty: Vec<NodeKey>,
}

impl Octree {
    pub fn new(id: TreeId, bounds: AABB) -> Self {
        Self {
            id,
            bounds,
            nodes: SlotMap::with_key(),
            root: None,
            pending_empty: Vec::new(),
        }
    }

    // ===== GETTERS =====

    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Box the root is built from
    pub fn bounds(&self) -> &AABB {
        &self.bounds
    }

    pub fn root(&self) -> Option<NodeKey> {
        self.root
    }

    pub fn node(&self, key: NodeKey) -> Option<&SpatialNode> {
        self.nodes.get(key)
    }

    /// No objects anywhere: the root, if built, holds nothing and has no children
    pub fn is_empty(&self) -> bool {
        self.root
            .and_then(|root| self.nodes.get(root))
            .map_or(true, SpatialNode::is_empty)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn pending_empty_count(&self) -> usize {
        self.pending_empty.len()
    }

    /// Number of ancestors of `key` (root = 0)
    pub fn depth_of(&self, key: NodeKey) -> Option<usize> {
        let mut depth = 0;
        let mut current = self.nodes.get(key)?.parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes.get(parent)?.parent;
        }
        Some(depth)
    }

    // ===== INSERTION =====

    fn ensure_root(&mut self) -> NodeKey {
        if let Some(root) = self.root {
            return root;
        }
        let root = self.nodes.insert(SpatialNode::new(
            self.bounds.center(),
            self.bounds.half_extents(),
            None,
        ));
        crate::engine_debug!(
            "galaxy3d::Octree",
            "Created {:?} root {:?}",
            self.id,
            self.bounds
        );
        self.root = Some(root);
        root
    }

    fn child_or_create(&mut self, parent: NodeKey, octant: usize) -> NodeKey {
        if let Some(child) = self.nodes[parent].children[octant] {
            return child;
        }
        let (center, half) = self.nodes[parent].child_cell(octant);
        let child = self.nodes.insert(SpatialNode::new(center, half, Some(parent)));
        self.nodes[parent].children[octant] = Some(child);
        child
    }

    /// Place an object, aggregating its data into every node on the way down
    pub(crate) fn insert(&mut self, objects: &mut ObjectArena, key: ObjectKey, config: &SceneConfig) -> NodeKey {
        let entry = &objects[key];
        let bbox = entry.bbox;
        let radius_sq = entry.radius_sq;
        let max_view_dist = entry.max_view_dist;
        let flags = entry.flags;
        let is_light = entry.kind.is_light();

        let center = bbox.center();
        let ratio_sq = config.object_to_node_size_ratio * config.object_to_node_size_ratio;
        let mut current = self.ensure_root();

        loop {
            let node = &mut self.nodes[current];
            node.objects_box.add(&bbox);
            node.max_view_dist = node.max_view_dist.max(max_view_dist);
            node.render_flags |= flags;
            node.has_lights |= is_light;

            if node.can_split(config.node_min_size) && radius_sq < node.node_radius_sq() * ratio_sq {
                let octant = node.octant_of(center);
                current = self.child_or_create(current, octant);
            } else {
                break;
            }
        }

        self.link(objects, key, current, config);
        current
    }

    /// Append the object to the node's list and register it as a caster
    fn link(&mut self, objects: &mut ObjectArena, key: ObjectKey, node_key: NodeKey, config: &SceneConfig) {
        let entry = &mut objects[key];
        let list = entry.kind.list();
        let node = &mut self.nodes[node_key];
        let objects_in_list = &mut node.lists[list.index()];
        debug_assert!(!objects_in_list.contains(&key), "object linked twice into one node");

        let index = objects_in_list.len();
        objects_in_list.push(key);
        entry.home = ObjectHome::Node {
            tree: self.id,
            node: node_key,
            list,
            index,
        };

        if let Some(max_cast_distance) = caster_distance(entry.flags, entry.kind, entry.max_view_dist, config) {
            let caster = CasterEntry {
                object: key,
                max_cast_distance,
                kind: entry.kind,
            };
            self.add_caster(node_key, caster);
        }
    }

    fn add_caster(&mut self, node_key: NodeKey, caster: CasterEntry) {
        self.nodes[node_key].casters.push(caster);

        let mut current = Some(node_key);
        while let Some(key) = current {
            let node = &mut self.nodes[key];
            if node.render_flags.contains(RenderFlags::CASTER_BITS) {
                break;
            }
            node.render_flags |= RenderFlags::CASTER_BITS;
            current = node.parent;
        }
    }

    fn remove_caster(&mut self, node_key: NodeKey, key: ObjectKey) {
        let casters = &mut self.nodes[node_key].casters;
        if let Some(position) = casters.iter().position(|caster| caster.object == key) {
            casters.swap_remove(position);
        }
    }

    // ===== REMOVAL =====

    /// Unlink an object from its node. The node is queued if it became empty.
    pub(crate) fn remove(&mut self, objects: &mut ObjectArena, key: ObjectKey) -> bool {
        let ObjectHome::Node { tree, node: node_key, list, index } = objects[key].home else {
            return false;
        };
        debug_assert_eq!(tree, self.id);
        let Some(node) = self.nodes.get_mut(node_key) else {
            return false;
        };

        let objects_in_list = &mut node.lists[list.index()];
        debug_assert_eq!(objects_in_list.get(index), Some(&key), "stale list index");
        objects_in_list.swap_remove(index);

        // The former tail now sits at `index`
        if let Some(&moved) = objects_in_list.get(index) {
            debug_assert_ne!(moved, key);
            if let ObjectHome::Node { index: moved_index, .. } = &mut objects[moved].home {
                *moved_index = index;
            }
        }

        self.remove_caster(node_key, key);
        objects[key].home = ObjectHome::Detached;
        self.queue_if_empty(node_key);
        true
    }

    fn queue_if_empty(&mut self, key: NodeKey) {
        let node = &mut self.nodes[key];
        if node.is_empty() && node.parent.is_some() && !node.pending_release {
            node.pending_release = true;
            self.pending_empty.push(key);
        }
    }

    /// Destroy queued empty nodes, smallest first. Parents emptied by the
    /// release are queued and released in the same call. The root stays.
    pub(crate) fn release_empty_nodes(&mut self) -> usize {
        let mut released = 0;

        while !self.pending_empty.is_empty() {
            let mut batch = std::mem::take(&mut self.pending_empty);
            batch.retain(|key| self.nodes.contains_key(*key));
            batch.sort_by(|a, b| {
                self.nodes[*a].half_extents.x.total_cmp(&self.nodes[*b].half_extents.x)
            });

            for key in batch {
                let Some(node) = self.nodes.get_mut(key) else { continue };
                node.pending_release = false;
                if !node.is_empty() {
                    continue;
                }
                let Some(parent) = node.parent else { continue };

                self.nodes.remove(key);
                for child in self.nodes[parent].children.iter_mut() {
                    if *child == Some(key) {
                        *child = None;
                    }
                }
                released += 1;
                self.queue_if_empty(parent);
            }
        }

        if released > 0 {
            crate::engine_debug!(
                "galaxy3d::Octree",
                "{:?}: released {} empty nodes, {} remain",
                self.id,
                released,
                self.nodes.len()
            );
        }
        released
    }

    // ===== RE-HOMING =====

    /// Whether the object can stay in `node_key` with its new bounds
    pub(crate) fn is_right_node(&self, node_key: NodeKey, bbox: &AABB, radius_sq: f32, config: &SceneConfig) -> bool {
        self.nodes
            .get(node_key)
            .is_some_and(|node| node.is_right_node(bbox, radius_sq, config))
    }

    /// Fast-accept path: aggregate refreshed object data up the parent chain
    /// and rebuild the caster entry in place.
    pub(crate) fn refresh_in_place(&mut self, objects: &ObjectArena, key: ObjectKey, config: &SceneConfig) {
        let entry = &objects[key];
        let ObjectHome::Node { node: node_key, .. } = entry.home else {
            return;
        };

        let mut current = Some(node_key);
        while let Some(node_key) = current {
            let node = &mut self.nodes[node_key];
            node.objects_box.add(&entry.bbox);
            node.max_view_dist = node.max_view_dist.max(entry.max_view_dist);
            node.render_flags |= entry.flags;
            node.has_lights |= entry.kind.is_light();
            current = node.parent;
        }

        self.remove_caster(node_key, key);
        if let Some(max_cast_distance) = caster_distance(entry.flags, entry.kind, entry.max_view_dist, config) {
            let caster = CasterEntry {
                object: key,
                max_cast_distance,
                kind: entry.kind,
            };
            self.add_caster(node_key, caster);
        }
    }

    // ===== CLEANUP =====

    /// Recompute every aggregate bottom-up from the objects actually present
    /// and queue nodes found empty.
    pub(crate) fn cleanup(&mut self, objects: &ObjectArena) {
        if let Some(root) = self.root {
            self.recompute(objects, root);
        }
    }

    fn recompute(&mut self, objects: &ObjectArena, key: NodeKey) -> (AABB, f32, RenderFlags, bool) {
        let children: Vec<NodeKey> = self.nodes[key].children().collect();

        let mut objects_box = AABB::EMPTY;
        let mut max_view_dist = 0.0f32;
        let mut flags = RenderFlags::empty();
        let mut has_lights = false;

        let node = &self.nodes[key];
        for list in &node.lists {
            for object in list {
                let entry = &objects[*object];
                objects_box.add(&entry.bbox);
                max_view_dist = max_view_dist.max(entry.max_view_dist);
                flags |= entry.flags;
                has_lights |= entry.kind.is_light();
            }
        }
        if !node.casters.is_empty() {
            flags |= RenderFlags::CASTER_BITS;
        }

        for child in children {
            let (child_box, child_view, child_flags, child_lights) = self.recompute(objects, child);
            if !child_box.is_reset() {
                objects_box.add(&child_box);
            }
            max_view_dist = max_view_dist.max(child_view);
            flags |= child_flags;
            has_lights |= child_lights;
        }

        let node = &mut self.nodes[key];
        node.objects_box = objects_box;
        node.max_view_dist = max_view_dist;
        node.render_flags = flags;
        node.has_lights = has_lights;
        self.queue_if_empty(key);

        (objects_box, max_view_dist, flags, has_lights)
    }

    // ===== TRAVERSAL =====

    /// Depth-first walk, nearest children first. `visit` returns whether to
    /// descend into the node's children.
    pub fn walk_front_to_back<F>(&self, eye: Vec3, mut visit: F)
    where
        F: FnMut(NodeKey, &SpatialNode) -> bool,
    {
        let Some(root) = self.root else { return };
        let mut stack = vec![root];

        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if !visit(key, node) {
                continue;
            }
            let first = node.octant_of(eye);
            // Reversed so the nearest child is popped first
            for offset in FRONT_TO_BACK.iter().rev() {
                if let Some(child) = node.children[first ^ offset] {
                    stack.push(child);
                }
            }
        }
    }

    /// Visit every node whose objects box passes `filter`
    fn for_each_node<P, F>(&self, mut filter: P, mut visit: F)
    where
        P: FnMut(&SpatialNode) -> bool,
        F: FnMut(&SpatialNode),
    {
        let Some(root) = self.root else { return };
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if !filter(node) {
                continue;
            }
            visit(node);
            stack.extend(node.children());
        }
    }

    // ===== QUERIES =====

    /// Objects whose box intersects `bbox`, optionally of one kind
    pub(crate) fn collect_in_box(
        &self,
        objects: &ObjectArena,
        bbox: &AABB,
        kind: Option<RenderKind>,
        out: &mut Vec<ObjectKey>,
    ) {
        let single;
        let lists: &[ObjectList] = match kind {
            Some(kind) => {
                single = [kind.list()];
                &single
            }
            None => &ObjectList::ALL,
        };
        self.for_each_node(
            |node| node.objects_box.intersects(bbox),
            |node| {
                for list in lists {
                    for &key in node.objects(*list) {
                        let entry = &objects[key];
                        if kind.map_or(true, |k| entry.kind == k) && entry.bbox.intersects(bbox) {
                            out.push(key);
                        }
                    }
                }
            },
        );
    }

    /// Whether any object of `kind` intersects `bbox`
    pub(crate) fn any_of_kind_in_box(&self, objects: &ObjectArena, kind: RenderKind, bbox: &AABB) -> bool {
        let mut found = Vec::new();
        self.collect_in_box(objects, bbox, Some(kind), &mut found);
        !found.is_empty()
    }

    /// Objects carrying any flag of `mask`
    pub(crate) fn collect_by_flags(&self, objects: &ObjectArena, mask: RenderFlags, out: &mut Vec<ObjectKey>) {
        self.for_each_node(
            |node| node.render_flags.intersects(mask),
            |node| {
                for list in &node.lists {
                    out.extend(list.iter().copied().filter(|key| objects[*key].flags.intersects(mask)));
                }
            },
        );
    }

    /// Every object, optionally limited to those intersecting `area`
    pub(crate) fn collect_all(&self, objects: &ObjectArena, area: Option<&AABB>, out: &mut Vec<ObjectKey>) {
        match area {
            Some(bbox) => self.collect_in_box(objects, bbox, None, out),
            None => self.for_each_node(
                |_| true,
                |node| {
                    for list in &node.lists {
                        out.extend_from_slice(list);
                    }
                },
            ),
        }
    }

    pub fn count(&self, filter: ObjectCountFilter) -> usize {
        self.nodes
            .values()
            .map(|node| match filter {
                ObjectCountFilter::Main => node.object_count(),
                ObjectCountFilter::Casters => node.casters.len(),
            })
            .sum()
    }

    /// Union of caster boxes, optionally only those intersecting `within`
    pub(crate) fn shadow_casters_box(&self, objects: &ObjectArena, within: Option<&AABB>, out: &mut AABB) {
        self.for_each_node(
            |node| {
                node.render_flags.contains(RenderFlags::HAS_CAST_SHADOWS)
                    && within.map_or(true, |bbox| node.objects_box.intersects(bbox))
            },
            |node| {
                for caster in &node.casters {
                    let bbox = &objects[caster.object].bbox;
                    if within.map_or(true, |area| bbox.intersects(area)) {
                        out.add(bbox);
                    }
                }
            },
        );
    }

    /// Casters inside `frustum` whose cast range reaches `eye`
    pub(crate) fn collect_shadow_casters(
        &self,
        objects: &ObjectArena,
        frustum: &Frustum,
        eye: Vec3,
        out: &mut Vec<ObjectKey>,
    ) {
        self.for_each_node(
            |node| {
                node.render_flags.contains(RenderFlags::HAS_CAST_SHADOWS)
                    && frustum.intersects_aabb(&node.objects_box)
            },
            |node| {
                for caster in &node.casters {
                    let entry = &objects[caster.object];
                    let reach = caster.max_cast_distance + entry.radius_sq.sqrt();
                    if entry.bbox.center().distance_squared(eye) <= reach * reach
                        && frustum.intersects_aabb(&entry.bbox)
                    {
                        out.push(caster.object);
                    }
                }
            },
        );
    }

    /// Deepest existing node whose cell contains `bbox`
    pub fn find_node_containing_box(&self, bbox: &AABB) -> Option<NodeKey> {
        let mut current = self.root?;
        if !self.nodes[current].node_box().contains(bbox) {
            return None;
        }
        loop {
            let node = &self.nodes[current];
            let next = node.children[node.octant_of(bbox.center())]
                .filter(|child| self.nodes[*child].node_box().contains(bbox));
            match next {
                Some(child) => current = child,
                None => return Some(current),
            }
        }
    }
}

/// Cast distance when the object qualifies as a shadow caster
pub(crate) fn caster_distance(flags: RenderFlags, kind: RenderKind, max_view_dist: f32, config: &SceneConfig) -> Option<f32> {
    let eligible = flags.contains(RenderFlags::CASTS_SHADOWS)
        && !flags.intersects(RenderFlags::NON_CASTER)
        && !kind.is_light()
        && max_view_dist > config.min_shadow_caster_view_dist;
    eligible.then(|| max_view_dist * config.shadows_cast_view_dist_ratio)
}

#[cfg(test)]
#[path = "octree_tests.rs"]
mod tests;
