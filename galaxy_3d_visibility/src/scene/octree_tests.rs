use std::sync::Arc;
use glam::Mat4;
use crate::camera::Camera;
use crate::scene::{BoundedObject, ObjectEntry};
use super::*;

struct TestObject {
    bounds: AABB,
    view: f32,
    kind: RenderKind,
    flags: RenderFlags,
}

impl BoundedObject for TestObject {
    fn bounds(&self) -> AABB {
        self.bounds
    }

    fn max_view_distance(&self) -> f32 {
        self.view
    }

    fn render_kind(&self) -> RenderKind {
        self.kind
    }

    fn render_flags(&self) -> RenderFlags {
        self.flags
    }
}

struct Fixture {
    config: SceneConfig,
    objects: ObjectArena,
    octree: Octree,
}

impl Fixture {
    fn new() -> Self {
        Self {
            config: SceneConfig::default(),
            objects: SlotMap::with_key(),
            octree: Octree::new(TreeId::Outdoor, AABB::new(Vec3::ZERO, Vec3::splat(1024.0))),
        }
    }

    fn add_with(&mut self, bounds: AABB, kind: RenderKind, flags: RenderFlags, view: f32) -> ObjectKey {
        let object = Arc::new(TestObject { bounds, view, kind, flags });
        let key = self.objects.insert(ObjectEntry::new(object));
        self.octree.insert(&mut self.objects, key, &self.config);
        key
    }

    fn add(&mut self, bounds: AABB) -> ObjectKey {
        self.add_with(bounds, RenderKind::Mesh, RenderFlags::empty(), 100.0)
    }

    fn remove(&mut self, key: ObjectKey) -> bool {
        self.octree.remove(&mut self.objects, key)
    }

    fn home(&self, key: ObjectKey) -> (NodeKey, ObjectList, usize) {
        match self.objects[key].home {
            ObjectHome::Node { node, list, index, .. } => (node, list, index),
            other => panic!("object not in a node: {:?}", other),
        }
    }

    fn node_of(&self, key: ObjectKey) -> &SpatialNode {
        let (node, _, _) = self.home(key);
        self.octree.node(node).unwrap()
    }

    /// Home node followed by every ancestor
    fn chain(&self, key: ObjectKey) -> Vec<NodeKey> {
        let (node, _, _) = self.home(key);
        let mut chain = vec![node];
        while let Some(parent) = self.octree.node(*chain.last().unwrap()).unwrap().parent() {
            chain.push(parent);
        }
        chain
    }
}

fn unit_box_at(min: Vec3) -> AABB {
    AABB::new(min, min + Vec3::ONE)
}

// ============================================================================
// Placement
// ============================================================================

#[test]
fn test_unit_box_sinks_to_minimum_cell() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));

    let node = fixture.node_of(a);
    assert_eq!(node.half_extents(), Vec3::splat(4.0));
    assert_eq!(node.node_box(), AABB::new(Vec3::ZERO, Vec3::splat(8.0)));
    assert!(!node.can_split(fixture.config.node_min_size));

    let (home, _, _) = fixture.home(a);
    assert_eq!(fixture.octree.depth_of(home), Some(7));
    assert_eq!(fixture.octree.node_count(), 8);
}

#[test]
fn test_leaf_is_within_eight_radii() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));

    let radius = fixture.objects[a].radius_sq.sqrt();
    assert!(fixture.node_of(a).half_extents().x <= 8.0 * radius);
}

#[test]
fn test_large_object_stays_at_root() {
    let mut fixture = Fixture::new();
    let big = fixture.add(AABB::new(Vec3::splat(100.0), Vec3::splat(700.0)));

    let (home, list, index) = fixture.home(big);
    assert_eq!(Some(home), fixture.octree.root());
    assert_eq!(list, ObjectList::General);
    assert_eq!(index, 0);
    assert_eq!(fixture.octree.node_count(), 1);
}

#[test]
fn test_object_never_placed_above_a_splittable_fitting_node() {
    let mut fixture = Fixture::new();
    let positions = [
        Vec3::new(3.0, 900.0, 17.0),
        Vec3::new(511.0, 511.0, 511.0),
        Vec3::new(700.0, 20.0, 333.0),
        Vec3::new(1000.0, 1000.0, 1000.0),
    ];
    let config = fixture.config.clone();
    let ratio_sq = config.object_to_node_size_ratio * config.object_to_node_size_ratio;

    for min in positions {
        let key = fixture.add(AABB::new(min, min + Vec3::splat(2.0)));
        let radius_sq = fixture.objects[key].radius_sq;
        let node = fixture.node_of(key);
        // Either it could not split, or the object is too big for a child
        assert!(
            !node.can_split(config.node_min_size) || radius_sq >= node.node_radius_sq() * ratio_sq,
            "object at {:?} stopped early",
            min
        );
    }
}

#[test]
fn test_decals_use_their_own_list() {
    let mut fixture = Fixture::new();
    let decal = fixture.add_with(unit_box_at(Vec3::ZERO), RenderKind::Decal, RenderFlags::empty(), 50.0);

    let (_, list, index) = fixture.home(decal);
    assert_eq!(list, ObjectList::DecalsAndRoads);
    assert_eq!(index, 0);
    assert_eq!(fixture.node_of(decal).objects(ObjectList::General).len(), 0);
}

#[test]
fn test_box_monotonicity_after_inserts() {
    let mut fixture = Fixture::new();
    let mut keys = Vec::new();
    for i in 0..40 {
        let f = i as f32;
        let min = Vec3::new((f * 97.0) % 1000.0, (f * 31.0) % 1000.0, (f * 53.0) % 1000.0);
        let size = 1.0 + (i % 5) as f32 * 20.0;
        keys.push(fixture.add(AABB::new(min, min + Vec3::splat(size))));
    }

    for key in keys {
        let bbox = fixture.objects[key].bbox;
        for node in fixture.chain(key) {
            assert!(fixture.octree.node(node).unwrap().objects_box().contains(&bbox));
        }
    }
}

#[test]
fn test_aggregates_flags_and_view_distance_upward() {
    let mut fixture = Fixture::new();
    let light = fixture.add_with(unit_box_at(Vec3::splat(10.0)), RenderKind::Light, RenderFlags::GOOD_OCCLUDER, 250.0);

    for node in fixture.chain(light) {
        let node = fixture.octree.node(node).unwrap();
        assert!(node.render_flags().contains(RenderFlags::GOOD_OCCLUDER));
        assert_eq!(node.max_view_distance(), 250.0);
        assert!(node.has_lights());
    }
}

// ============================================================================
// Removal
// ============================================================================

#[test]
fn test_remove_patches_moved_neighbour_index() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));
    let b = fixture.add(unit_box_at(Vec3::splat(1.0)));
    let c = fixture.add(unit_box_at(Vec3::splat(2.0)));
    assert_eq!(fixture.home(a).0, fixture.home(c).0);

    assert!(fixture.remove(a));

    assert_eq!(fixture.objects[a].home, ObjectHome::Detached);
    let (node, _, c_index) = fixture.home(c);
    assert_eq!(c_index, 0);
    assert_eq!(fixture.home(b).2, 1);
    assert_eq!(fixture.octree.node(node).unwrap().objects(ObjectList::General), &[c, b]);
}

#[test]
fn test_remove_detached_object_is_noop() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));

    assert!(fixture.remove(a));
    assert!(!fixture.remove(a));
}

#[test]
fn test_release_empty_nodes_cascades_to_root() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));
    fixture.remove(a);

    assert_eq!(fixture.octree.pending_empty_count(), 1);
    assert_eq!(fixture.octree.release_empty_nodes(), 7);
    assert_eq!(fixture.octree.node_count(), 1);
    assert_eq!(fixture.octree.pending_empty_count(), 0);

    let root = fixture.octree.node(fixture.octree.root().unwrap()).unwrap();
    assert!(!root.has_children());
}

#[test]
fn test_release_skips_nodes_refilled_before_the_batch() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));
    fixture.remove(a);
    let again = fixture.add(unit_box_at(Vec3::ZERO));

    assert_eq!(fixture.octree.release_empty_nodes(), 0);
    assert_eq!(fixture.octree.node_count(), 8);
    assert_eq!(fixture.octree.pending_empty_count(), 0);
    assert_eq!(fixture.octree.depth_of(fixture.home(again).0), Some(7));
}

#[test]
fn test_release_keeps_siblings_alive() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));
    let b = fixture.add(unit_box_at(Vec3::splat(20.0)));
    fixture.remove(a);

    let released = fixture.octree.release_empty_nodes();

    assert!(released > 0);
    for node in fixture.chain(b) {
        assert!(fixture.octree.node(node).is_some());
    }
}

// ============================================================================
// Shadow casters
// ============================================================================

#[test]
fn test_caster_registered_and_propagated() {
    let mut fixture = Fixture::new();
    let caster = fixture.add_with(unit_box_at(Vec3::splat(40.0)), RenderKind::Mesh, RenderFlags::CASTS_SHADOWS, 100.0);

    let node = fixture.node_of(caster);
    assert_eq!(node.casters().len(), 1);
    assert_eq!(node.casters()[0].object, caster);
    assert_eq!(node.casters()[0].max_cast_distance, 80.0);

    for node in fixture.chain(caster) {
        assert!(fixture.octree.node(node).unwrap().render_flags().contains(RenderFlags::HAS_CAST_SHADOWS));
    }
    assert_eq!(fixture.octree.count(ObjectCountFilter::Casters), 1);
    assert_eq!(fixture.octree.count(ObjectCountFilter::Main), 1);
}

#[test]
fn test_non_casters_are_not_registered() {
    let mut fixture = Fixture::new();
    let hidden = RenderFlags::CASTS_SHADOWS | RenderFlags::HIDDEN;
    fixture.add_with(unit_box_at(Vec3::splat(40.0)), RenderKind::Mesh, hidden, 100.0);
    fixture.add_with(unit_box_at(Vec3::splat(60.0)), RenderKind::Light, RenderFlags::CASTS_SHADOWS, 100.0);
    fixture.add_with(unit_box_at(Vec3::splat(80.0)), RenderKind::Mesh, RenderFlags::CASTS_SHADOWS, 8.0);

    assert_eq!(fixture.octree.count(ObjectCountFilter::Casters), 0);
    assert_eq!(fixture.octree.count(ObjectCountFilter::Main), 3);
}

#[test]
fn test_caster_distance_rules() {
    let config = SceneConfig::default();
    assert_eq!(caster_distance(RenderFlags::CASTS_SHADOWS, RenderKind::Mesh, 50.0, &config), Some(40.0));
    assert_eq!(caster_distance(RenderFlags::empty(), RenderKind::Mesh, 50.0, &config), None);
    assert_eq!(caster_distance(RenderFlags::CASTS_SHADOWS, RenderKind::Mesh, 8.0, &config), None);
    assert_eq!(
        caster_distance(RenderFlags::CASTS_SHADOWS | RenderFlags::COLLISION_PROXY, RenderKind::Mesh, 50.0, &config),
        None
    );
}

#[test]
fn test_removing_caster_clears_its_entry() {
    let mut fixture = Fixture::new();
    let caster = fixture.add_with(unit_box_at(Vec3::splat(40.0)), RenderKind::Mesh, RenderFlags::CASTS_SHADOWS, 100.0);

    fixture.remove(caster);

    assert_eq!(fixture.octree.count(ObjectCountFilter::Casters), 0);
}

#[test]
fn test_shadow_casters_box_unions_caster_boxes() {
    let mut fixture = Fixture::new();
    fixture.add_with(unit_box_at(Vec3::splat(10.0)), RenderKind::Mesh, RenderFlags::CASTS_SHADOWS, 100.0);
    fixture.add_with(unit_box_at(Vec3::splat(500.0)), RenderKind::Mesh, RenderFlags::CASTS_SHADOWS, 100.0);
    fixture.add(unit_box_at(Vec3::splat(900.0)));

    let mut all = AABB::EMPTY;
    fixture.octree.shadow_casters_box(&fixture.objects, None, &mut all);
    assert_eq!(all, AABB::new(Vec3::splat(10.0), Vec3::splat(501.0)));

    let mut near = AABB::EMPTY;
    let within = AABB::new(Vec3::ZERO, Vec3::splat(100.0));
    fixture.octree.shadow_casters_box(&fixture.objects, Some(&within), &mut near);
    assert_eq!(near, unit_box_at(Vec3::splat(10.0)));
}

#[test]
fn test_collect_shadow_casters_respects_cast_reach() {
    let mut fixture = Fixture::new();
    let near = fixture.add_with(unit_box_at(Vec3::new(50.0, 50.0, 40.0)), RenderKind::Mesh, RenderFlags::CASTS_SHADOWS, 20.0);
    let far = fixture.add_with(unit_box_at(Vec3::new(50.0, 50.0, 400.0)), RenderKind::Mesh, RenderFlags::CASTS_SHADOWS, 20.0);

    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 2000.0);
    let camera = Camera::look_at(Vec3::new(50.5, 50.5, 1000.0), Vec3::new(50.5, 50.5, 0.0), projection);
    let eye = Vec3::new(50.5, 50.5, 30.0);

    let mut out = Vec::new();
    fixture.octree.collect_shadow_casters(&fixture.objects, camera.frustum(), eye, &mut out);

    assert_eq!(out, vec![near]);
    assert!(!out.contains(&far));
}

// ============================================================================
// Cleanup
// ============================================================================

#[test]
fn test_cleanup_shrinks_aggregates() {
    let mut fixture = Fixture::new();
    let big = fixture.add(AABB::new(Vec3::splat(100.0), Vec3::splat(700.0)));
    let small = fixture.add_with(unit_box_at(Vec3::ZERO), RenderKind::Mesh, RenderFlags::CASTS_SHADOWS, 900.0);
    fixture.remove(small);

    let root = fixture.octree.root().unwrap();
    assert!(fixture.octree.node(root).unwrap().objects_box().contains(&unit_box_at(Vec3::ZERO)));

    fixture.octree.cleanup(&fixture.objects);

    let node = fixture.octree.node(root).unwrap();
    assert_eq!(*node.objects_box(), fixture.objects[big].bbox);
    assert_eq!(node.max_view_distance(), 100.0);
    assert!(!node.render_flags().contains(RenderFlags::HAS_CAST_SHADOWS));
    assert_eq!(fixture.octree.pending_empty_count(), 1);
}

// ============================================================================
// Traversal and queries
// ============================================================================

#[test]
fn test_walk_visits_nearest_octant_first() {
    let mut fixture = Fixture::new();
    for octant in 0..8 {
        let pick = |bit: usize| if octant & bit != 0 { 900.0 } else { 100.0 };
        fixture.add(unit_box_at(Vec3::new(pick(4), pick(2), pick(1))));
    }
    let root = fixture.octree.root().unwrap();

    let mut first_level = Vec::new();
    fixture.octree.walk_front_to_back(Vec3::splat(10.0), |_, node| {
        if node.parent() == Some(root) {
            first_level.push(node.center());
        }
        true
    });

    assert_eq!(first_level.len(), 8);
    assert_eq!(first_level[0], Vec3::splat(256.0));
    assert_eq!(first_level[7], Vec3::splat(768.0));
}

#[test]
fn test_walk_stops_descending_when_visit_returns_false() {
    let mut fixture = Fixture::new();
    fixture.add(unit_box_at(Vec3::ZERO));

    let mut visited = 0;
    fixture.octree.walk_front_to_back(Vec3::ZERO, |_, _| {
        visited += 1;
        false
    });

    assert_eq!(visited, 1);
}

#[test]
fn test_collect_in_box_filters_kind_and_bounds() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));
    let road = fixture.add_with(unit_box_at(Vec3::splat(2.0)), RenderKind::Road, RenderFlags::empty(), 50.0);
    fixture.add(unit_box_at(Vec3::splat(600.0)));

    let area = AABB::new(Vec3::ZERO, Vec3::splat(10.0));
    let mut all = Vec::new();
    fixture.octree.collect_in_box(&fixture.objects, &area, None, &mut all);
    all.sort();
    let mut expected = vec![a, road];
    expected.sort();
    assert_eq!(all, expected);

    let mut roads = Vec::new();
    fixture.octree.collect_in_box(&fixture.objects, &area, Some(RenderKind::Road), &mut roads);
    assert_eq!(roads, vec![road]);

    assert!(fixture.octree.any_of_kind_in_box(&fixture.objects, RenderKind::Mesh, &area));
    assert!(!fixture.octree.any_of_kind_in_box(&fixture.objects, RenderKind::Light, &area));
}

#[test]
fn test_a_box_query_returns_a() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));

    let mut found = Vec::new();
    fixture.octree.collect_in_box(&fixture.objects, &unit_box_at(Vec3::ZERO), None, &mut found);

    assert_eq!(found, vec![a]);
}

#[test]
fn test_collect_by_flags() {
    let mut fixture = Fixture::new();
    let occluder = fixture.add_with(unit_box_at(Vec3::splat(5.0)), RenderKind::Mesh, RenderFlags::GOOD_OCCLUDER, 50.0);
    fixture.add(unit_box_at(Vec3::splat(300.0)));

    let mut out = Vec::new();
    fixture.octree.collect_by_flags(&fixture.objects, RenderFlags::GOOD_OCCLUDER, &mut out);

    assert_eq!(out, vec![occluder]);
}

#[test]
fn test_collect_all_without_area() {
    let mut fixture = Fixture::new();
    fixture.add(unit_box_at(Vec3::ZERO));
    fixture.add(unit_box_at(Vec3::splat(500.0)));
    fixture.add(AABB::new(Vec3::splat(100.0), Vec3::splat(700.0)));

    let mut out = Vec::new();
    fixture.octree.collect_all(&fixture.objects, None, &mut out);

    assert_eq!(out.len(), 3);
}

#[test]
fn test_find_node_containing_box() {
    let mut fixture = Fixture::new();
    let a = fixture.add(unit_box_at(Vec3::ZERO));

    assert_eq!(fixture.octree.find_node_containing_box(&unit_box_at(Vec3::ZERO)), Some(fixture.home(a).0));

    let straddling = AABB::new(Vec3::splat(500.0), Vec3::splat(520.0));
    assert_eq!(fixture.octree.find_node_containing_box(&straddling), fixture.octree.root());

    let outside = AABB::new(Vec3::splat(2000.0), Vec3::splat(2001.0));
    assert_eq!(fixture.octree.find_node_containing_box(&outside), None);
}

#[test]
fn test_empty_tree_has_no_root() {
    let fixture = Fixture::new();
    assert!(fixture.octree.root().is_none());
    assert_eq!(fixture.octree.find_node_containing_box(&unit_box_at(Vec3::ZERO)), None);
    assert_eq!(fixture.octree.count(ObjectCountFilter::Main), 0);
}
