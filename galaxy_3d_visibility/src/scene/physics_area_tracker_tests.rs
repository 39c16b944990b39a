use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use glam::Vec3;
use crate::config::SceneConfig;
use crate::context::SceneContext;
use crate::scene::bounded_object::{RenderFlags, RenderKind};
use crate::scene::temp_data_pool::TempDataPool;
use super::*;

struct Subscriber {
    bounds: AABB,
    mask: PhysicsMedium,
    notified: AtomicUsize,
}

impl Subscriber {
    fn new(center: Vec3, mask: PhysicsMedium) -> Arc<Self> {
        Arc::new(Self {
            bounds: AABB::from_center_half_extents(center, Vec3::ONE),
            mask,
            notified: AtomicUsize::new(0),
        })
    }

    fn notified(&self) -> usize {
        self.notified.load(Ordering::SeqCst)
    }
}

impl BoundedObject for Subscriber {
    fn bounds(&self) -> AABB {
        self.bounds
    }
    fn max_view_distance(&self) -> f32 {
        100.0
    }
    fn render_kind(&self) -> RenderKind {
        RenderKind::Vegetation
    }
    fn render_flags(&self) -> RenderFlags {
        RenderFlags::empty()
    }
    fn phys_area_mask(&self) -> PhysicsMedium {
        self.mask
    }
    fn on_phys_area_change(&self) {
        self.notified.fetch_add(1, Ordering::SeqCst);
    }
}

fn create_context() -> Arc<SceneContext> {
    Arc::new(SceneContext::new(SceneConfig::default()).unwrap())
}

fn cube(center: Vec3, half: f32) -> AABB {
    AABB::from_center_half_extents(center, Vec3::splat(half))
}

fn subscribe(tracker: &PhysicsAreaTracker, subscriber: &Arc<Subscriber>) -> ProxyId {
    tracker.create_proxy(
        subscriber.clone(),
        Arc::new(TempSlot::new()),
        subscriber.bounds,
        subscriber.mask,
    )
}

// ============================================================================
// Dirty list
// ============================================================================

#[test]
fn test_mark_dirty_merges_overlapping_areas() {
    let tracker = PhysicsAreaTracker::new(create_context());

    tracker.mark_dirty(cube(Vec3::ZERO, 5.0), PhysicsMedium::AIR);
    tracker.mark_dirty(cube(Vec3::new(2.0, 0.0, 0.0), 5.0), PhysicsMedium::AIR);

    let dirty = tracker.dirty_areas();
    assert_eq!(dirty.len(), 1);
    assert_eq!(dirty[0].bounds, AABB::new(Vec3::new(-5.0, -5.0, -5.0), Vec3::new(7.0, 5.0, 5.0)));
}

#[test]
fn test_mark_dirty_keeps_distant_areas_apart() {
    let tracker = PhysicsAreaTracker::new(create_context());

    tracker.mark_dirty(cube(Vec3::ZERO, 1.0), PhysicsMedium::AIR);
    tracker.mark_dirty(cube(Vec3::splat(100.0), 1.0), PhysicsMedium::AIR);

    assert_eq!(tracker.dirty_areas().len(), 2);
}

#[test]
fn test_mark_dirty_never_merges_different_media() {
    let tracker = PhysicsAreaTracker::new(create_context());

    tracker.mark_dirty(cube(Vec3::ZERO, 5.0), PhysicsMedium::AIR);
    tracker.mark_dirty(cube(Vec3::ZERO, 5.0), PhysicsMedium::WATER);

    assert_eq!(tracker.dirty_areas().len(), 2);
}

#[test]
fn test_global_wind_covers_everything() {
    let tracker = PhysicsAreaTracker::new(create_context());
    let far = Subscriber::new(Vec3::splat(50_000.0), PhysicsMedium::AIR);
    subscribe(&tracker, &far);

    tracker.mark_global_wind_dirty();

    assert_eq!(tracker.update(), 1);
    assert_eq!(far.notified(), 1);
}

// ============================================================================
// Update
// ============================================================================

#[test]
fn test_update_notifies_overlapping_subscriber_once() {
    let tracker = PhysicsAreaTracker::new(create_context());
    let subscriber = Subscriber::new(Vec3::ZERO, PhysicsMedium::AIR);
    subscribe(&tracker, &subscriber);

    tracker.mark_dirty(cube(Vec3::ZERO, 5.0), PhysicsMedium::AIR);
    tracker.mark_dirty(cube(Vec3::splat(0.5), 4.0), PhysicsMedium::AIR);

    assert_eq!(tracker.update(), 1);
    assert_eq!(subscriber.notified(), 1);
    assert!(tracker.dirty_areas().is_empty());

    assert_eq!(tracker.update(), 0);
    assert_eq!(subscriber.notified(), 1);
}

#[test]
fn test_update_filters_by_medium_and_overlap() {
    let tracker = PhysicsAreaTracker::new(create_context());
    let water = Subscriber::new(Vec3::ZERO, PhysicsMedium::WATER);
    let far = Subscriber::new(Vec3::splat(500.0), PhysicsMedium::AIR);
    subscribe(&tracker, &water);
    subscribe(&tracker, &far);

    tracker.mark_dirty(cube(Vec3::ZERO, 5.0), PhysicsMedium::AIR);

    assert_eq!(tracker.update(), 0);
    assert_eq!(water.notified(), 0);
    assert_eq!(far.notified(), 0);
}

#[test]
fn test_update_proxy_moves_subscriber() {
    let tracker = PhysicsAreaTracker::new(create_context());
    let subscriber = Subscriber::new(Vec3::splat(500.0), PhysicsMedium::AIR);
    let id = subscribe(&tracker, &subscriber);

    assert!(tracker.update_proxy(id, cube(Vec3::ZERO, 1.0)));
    tracker.mark_dirty(cube(Vec3::ZERO, 5.0), PhysicsMedium::AIR);

    assert_eq!(tracker.update(), 1);
}

#[test]
fn test_reset_proxy_stops_notifications() {
    let tracker = PhysicsAreaTracker::new(create_context());
    let subscriber = Subscriber::new(Vec3::ZERO, PhysicsMedium::AIR);
    let id = subscribe(&tracker, &subscriber);

    tracker.reset_proxy(id);
    tracker.mark_dirty(cube(Vec3::ZERO, 5.0), PhysicsMedium::AIR);

    assert_eq!(tracker.update(), 0);
    assert!(!tracker.update_proxy(id, cube(Vec3::ZERO, 1.0)));
}

#[test]
fn test_air_change_invalidates_cached_wind() {
    let context = create_context();
    let tracker = Arc::new(PhysicsAreaTracker::new(context.clone()));
    let pool = TempDataPool::new(context, tracker.clone());
    let subscriber = Subscriber::new(Vec3::ZERO, PhysicsMedium::AIR);
    let object: Arc<dyn BoundedObject> = subscriber.clone();
    let slot = Arc::new(TempSlot::new());

    let record = pool.acquire(&slot, &object);
    record.user().wind_current = true;

    tracker.mark_dirty(cube(Vec3::ZERO, 5.0), PhysicsMedium::AIR);
    tracker.update();

    assert!(!record.user().wind_current);
}

// ============================================================================
// Garbage collection
// ============================================================================

#[test]
fn test_gc_repoints_moved_proxies() {
    let context = create_context();
    let tracker = Arc::new(PhysicsAreaTracker::new(context.clone()));
    let pool = TempDataPool::new(context, tracker.clone());

    let subscribers: Vec<Arc<Subscriber>> = (0..3)
        .map(|i| Subscriber::new(Vec3::new(i as f32 * 100.0, 0.0, 0.0), PhysicsMedium::AIR))
        .collect();
    let slots: Vec<Arc<TempSlot>> = (0..3).map(|_| Arc::new(TempSlot::new())).collect();
    for (subscriber, slot) in subscribers.iter().zip(&slots) {
        let object: Arc<dyn BoundedObject> = subscriber.clone();
        pool.acquire(slot, &object);
    }

    pool.release_slot(&slots[0]);
    assert_eq!(tracker.garbage_collect(), 1);
    assert_eq!(tracker.proxy_count(), 2);

    // The last proxy moved into slot 0; the middle one kept its index
    assert_eq!(slots[2].get().unwrap().phys_proxy(), Some(ProxyId(0)));
    assert_eq!(slots[1].get().unwrap().phys_proxy(), Some(ProxyId(1)));

    // Updating through the patched id reaches the right proxy
    let patched = slots[2].get().unwrap().phys_proxy().unwrap();
    assert!(tracker.update_proxy(patched, cube(Vec3::splat(-300.0), 1.0)));
    tracker.mark_dirty(cube(Vec3::splat(-300.0), 5.0), PhysicsMedium::AIR);
    tracker.update();
    assert_eq!(subscribers[2].notified(), 1);
    assert_eq!(subscribers[1].notified(), 0);
}

#[test]
fn test_gc_without_reset_proxies_is_noop() {
    let tracker = PhysicsAreaTracker::new(create_context());
    subscribe(&tracker, &Subscriber::new(Vec3::ZERO, PhysicsMedium::AIR));

    assert_eq!(tracker.garbage_collect(), 0);
    assert_eq!(tracker.proxy_count(), 1);
}
