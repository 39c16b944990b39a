/// PhysicsAreaTracker: coalesces physics "area changed" events.
///
/// Producers (physics callbacks, any thread) mark dirty boxes. Once per
/// frame the owner thread runs `update`, which notifies every subscribed
/// object whose proxy overlaps a dirty box of a matching medium, then
/// clears the dirty list.
///
/// Proxies live in a dense array. Their index is stored in the owning
/// object's temp record, so compaction must patch that index.

use std::sync::Arc;
use bitflags::bitflags;
use glam::Vec3;
use parking_lot::Mutex;
use crate::context::SceneContext;
use super::aabb::AABB;
use super::bounded_object::BoundedObject;
use super::temp_data_pool::TempSlot;

/// Half extent of the dirty area raised by a global wind change
const GLOBAL_WIND_EXTENT: f32 = 1.0e7;

bitflags! {
    /// Physical media an area change can affect
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PhysicsMedium: u32 {
        const AIR   = 1 << 0;
        const WATER = 1 << 1;
    }
}

/// Index of a proxy in the tracker's dense proxy array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyId(pub u32);

/// Box + media that changed since the last update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirtyArea {
    pub bounds: AABB,
    pub mask: PhysicsMedium,
}

struct AreaProxy {
    /// `None` once reset; compacted by `garbage_collect`
    object: Option<Arc<dyn BoundedObject>>,
    slot: Option<Arc<TempSlot>>,
    bounds: AABB,
    mask: PhysicsMedium,
}

struct TrackerState {
    dirty: Vec<DirtyArea>,
    proxies: Vec<AreaProxy>,
}

/// Dirty-area list plus subscriber proxies, behind one mutex
pub struct PhysicsAreaTracker {
    context: Arc<SceneContext>,
    state: Mutex<TrackerState>,
}

impl PhysicsAreaTracker {
    pub fn new(context: Arc<SceneContext>) -> Self {
        Self {
            context,
            state: Mutex::new(TrackerState {
                dirty: Vec::new(),
                proxies: Vec::new(),
            }),
        }
    }

    /// Record a changed area. Callable from any thread.
    ///
    /// Merges into an existing record of the same mask when the union is
    /// not larger than `phys_area_merge_threshold` times the summed volumes.
    pub fn mark_dirty(&self, bounds: AABB, mask: PhysicsMedium) {
        let threshold = self.context.config().phys_area_merge_threshold;
        let mut state = self.state.lock();

        for area in state.dirty.iter_mut() {
            if area.mask != mask {
                continue;
            }
            let union = area.bounds.union(&bounds);
            if union.volume() <= (area.bounds.volume() + bounds.volume()) * threshold {
                crate::engine_trace!(
                    "galaxy3d::PhysicsAreaTracker",
                    "Merged dirty area {:?} into {:?}",
                    bounds,
                    area.bounds
                );
                area.bounds = union;
                return;
            }
        }

        state.dirty.push(DirtyArea { bounds, mask });
    }

    /// Global wind changed: everything subscribed to air is dirty
    pub fn mark_global_wind_dirty(&self) {
        self.mark_dirty(
            AABB::from_center_half_extents(Vec3::ZERO, Vec3::splat(GLOBAL_WIND_EXTENT)),
            PhysicsMedium::AIR,
        );
    }

    /// Subscribe an object. The caller stores the id in the object's temp record.
    pub fn create_proxy(
        &self,
        object: Arc<dyn BoundedObject>,
        slot: Arc<TempSlot>,
        bounds: AABB,
        mask: PhysicsMedium,
    ) -> ProxyId {
        let mut state = self.state.lock();
        let id = ProxyId(state.proxies.len() as u32);
        state.proxies.push(AreaProxy {
            object: Some(object),
            slot: Some(slot),
            bounds,
            mask,
        });
        id
    }

    /// Refresh the cached bounds of a live proxy
    pub fn update_proxy(&self, id: ProxyId, bounds: AABB) -> bool {
        let mut state = self.state.lock();
        match state.proxies.get_mut(id.0 as usize) {
            Some(proxy) if proxy.object.is_some() => {
                proxy.bounds = bounds;
                true
            }
            _ => false,
        }
    }

    /// Unsubscribe. The slot is compacted away by the next `garbage_collect`.
    pub fn reset_proxy(&self, id: ProxyId) {
        let mut state = self.state.lock();
        if let Some(proxy) = state.proxies.get_mut(id.0 as usize) {
            proxy.object = None;
            proxy.slot = None;
        }
    }

    /// Notify subscribers of this frame's dirty areas. Owner thread only.
    ///
    /// Each overlapping object is notified once, outside the lock, however
    /// many dirty areas it overlaps.
    pub fn update(&self) -> usize {
        self.context.ensure_owner_thread("PhysicsAreaTracker::update");

        let notified = {
            let mut state = self.state.lock();
            if state.dirty.is_empty() {
                return 0;
            }
            let dirty = std::mem::take(&mut state.dirty);
            let mut notified: Vec<Arc<dyn BoundedObject>> = Vec::new();

            for proxy in &state.proxies {
                let Some(object) = &proxy.object else { continue };
                let hit = dirty
                    .iter()
                    .find(|area| proxy.mask.intersects(area.mask) && proxy.bounds.intersects(&area.bounds));
                let Some(area) = hit else { continue };

                if area.mask.contains(PhysicsMedium::AIR) {
                    if let Some(record) = proxy.slot.as_ref().and_then(|slot| slot.get()) {
                        record.user().wind_current = false;
                    }
                }
                notified.push(object.clone());
            }
            notified
        };

        for object in &notified {
            object.on_phys_area_change();
        }
        notified.len()
    }

    /// Compact reset proxies. Owner thread only; no traversal tasks may be in flight.
    pub fn garbage_collect(&self) -> usize {
        self.context.ensure_owner_thread("PhysicsAreaTracker::garbage_collect");

        let mut state = self.state.lock();
        let mut removed = 0;
        let mut i = 0;
        while i < state.proxies.len() {
            if state.proxies[i].object.is_some() {
                i += 1;
                continue;
            }
            state.proxies.swap_remove(i);
            removed += 1;

            // The former tail now lives at i: repoint its owner
            if let Some(moved) = state.proxies.get(i) {
                if let Some(record) = moved.slot.as_ref().and_then(|slot| slot.get()) {
                    record.set_phys_proxy(Some(ProxyId(i as u32)));
                }
            }
        }

        if removed > 0 {
            crate::engine_trace!(
                "galaxy3d::PhysicsAreaTracker",
                "GC removed {} proxies, {} remain",
                removed,
                state.proxies.len()
            );
        }
        removed
    }

    // ===== INSPECTION =====

    pub fn dirty_areas(&self) -> Vec<DirtyArea> {
        self.state.lock().dirty.clone()
    }

    /// Proxy slots, including reset ones awaiting compaction
    pub fn proxy_count(&self) -> usize {
        self.state.lock().proxies.len()
    }

    /// Subscriber of a live proxy
    pub fn proxy_object(&self, id: ProxyId) -> Option<Arc<dyn BoundedObject>> {
        self.state.lock().proxies.get(id.0 as usize).and_then(|proxy| proxy.object.clone())
    }

    pub fn live_proxy_count(&self) -> usize {
        self.state.lock().proxies.iter().filter(|p| p.object.is_some()).count()
    }
}

#[cfg(test)]
#[path = "physics_area_tracker_tests.rs"]
mod tests;
