/// TempDataPool: transient per-object render state.
///
/// A `TempRecord` is created the first time an object passes visibility and
/// lives until the object is unregistered or the record goes unused for
/// `temp_data_max_frames` frames.
///
/// Threading:
/// - `acquire` may race between traversal workers and the owner thread. The
///   published slot is checked without the pool lock first, then again under
///   it.
/// - `release` and `garbage_collect` are owner-thread only; violating this
///   panics.
///
/// Publication order inside `acquire`: the GC frame-info entry and the
/// physics proxy are written before the record becomes visible through the
/// object's `TempSlot`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use parking_lot::{Mutex, MutexGuard, RwLock};
use slotmap::{new_key_type, SlotMap};
use crate::context::SceneContext;
use crate::visibility::DissolveState;
use super::aabb::AABB;
use super::bounded_object::BoundedObject;
use super::physics_area_tracker::{PhysicsAreaTracker, ProxyId};

new_key_type! {
    /// Generation-checked handle of a live temp record
    pub struct TempKey;
}

const NO_PROXY: u32 = u32::MAX;

/// Scratch state carried between frames for one object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TempUserData {
    /// LOD cross-fade state
    pub dissolve: DissolveState,
    /// LOD requested by the last visibility pass
    pub wanted_lod: u8,
    /// Cached wind sample is still valid (cleared by air-area changes)
    pub wind_current: bool,
    /// Current bending amplitude derived from wind
    pub bending: f32,
    /// Clip volume the object was last rendered in
    pub clip_volume: Option<u32>,
    pub last_visible_frame: u32,
}

// ===== TEMP RECORD =====

/// One pooled record
#[derive(Debug)]
pub struct TempRecord {
    key: TempKey,
    created_frame: u32,
    last_used_frame: AtomicU32,
    phys_proxy: AtomicU32,
    user: Mutex<TempUserData>,
}

impl TempRecord {
    fn new(key: TempKey, frame: u32) -> Self {
        Self {
            key,
            created_frame: frame,
            last_used_frame: AtomicU32::new(frame),
            phys_proxy: AtomicU32::new(NO_PROXY),
            user: Mutex::new(TempUserData::default()),
        }
    }

    fn reset(&mut self, key: TempKey, frame: u32) {
        self.key = key;
        self.created_frame = frame;
        *self.last_used_frame.get_mut() = frame;
        *self.phys_proxy.get_mut() = NO_PROXY;
        *self.user.get_mut() = TempUserData::default();
    }

    pub fn key(&self) -> TempKey {
        self.key
    }

    pub fn created_frame(&self) -> u32 {
        self.created_frame
    }

    pub fn last_used_frame(&self) -> u32 {
        self.last_used_frame.load(Ordering::Relaxed)
    }

    /// Mark the record as used in `frame`
    pub fn touch(&self, frame: u32) {
        self.last_used_frame.fetch_max(frame, Ordering::Relaxed);
    }

    /// Index of the object's physics-area proxy
    pub fn phys_proxy(&self) -> Option<ProxyId> {
        match self.phys_proxy.load(Ordering::Acquire) {
            NO_PROXY => None,
            index => Some(ProxyId(index)),
        }
    }

    pub(crate) fn set_phys_proxy(&self, proxy: Option<ProxyId>) {
        let raw = proxy.map_or(NO_PROXY, |id| id.0);
        self.phys_proxy.store(raw, Ordering::Release);
    }

    /// Lock the scratch block. Hold it briefly; never across pool calls.
    pub fn user(&self) -> MutexGuard<'_, TempUserData> {
        self.user.lock()
    }
}

// ===== TEMP SLOT =====

/// Object-side slot the pool publishes a record into
#[derive(Debug, Default)]
pub struct TempSlot {
    record: RwLock<Option<Arc<TempRecord>>>,
}

impl TempSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published record, if any
    pub fn get(&self) -> Option<Arc<TempRecord>> {
        self.record.read().clone()
    }

    pub fn is_null(&self) -> bool {
        self.record.read().is_none()
    }

    fn publish(&self, record: Arc<TempRecord>) {
        let mut slot = self.record.write();
        debug_assert!(slot.is_none(), "TempSlot published twice");
        *slot = Some(record);
    }

    fn clear(&self) -> Option<Arc<TempRecord>> {
        self.record.write().take()
    }
}

// ===== POOL =====

struct UsedEntry {
    record: Arc<TempRecord>,
    owner: Arc<TempSlot>,
    frame_info: usize,
}

#[derive(Debug, Clone, Copy)]
struct FrameInfo {
    key: TempKey,
    valid: bool,
}

struct PoolState {
    used: SlotMap<TempKey, UsedEntry>,
    free: Vec<Arc<TempRecord>>,
    frame_info: Vec<FrameInfo>,
}

/// Pool of per-object temp records with a frame-based collector
pub struct TempDataPool {
    context: Arc<SceneContext>,
    tracker: Arc<PhysicsAreaTracker>,
    state: Mutex<PoolState>,
}

impl TempDataPool {
    pub fn new(context: Arc<SceneContext>, tracker: Arc<PhysicsAreaTracker>) -> Self {
        Self {
            context,
            tracker,
            state: Mutex::new(PoolState {
                used: SlotMap::with_key(),
                free: Vec::new(),
                frame_info: Vec::new(),
            }),
        }
    }

    /// Return the object's record, creating and publishing it if needed.
    ///
    /// Safe to call from traversal workers.
    pub fn acquire(&self, slot: &Arc<TempSlot>, object: &Arc<dyn BoundedObject>) -> Arc<TempRecord> {
        let frame = self.context.frame_id();

        if let Some(record) = slot.get() {
            record.touch(frame);
            return record;
        }

        let mut state = self.state.lock();

        // Another thread may have published while we waited for the lock
        if let Some(record) = slot.get() {
            record.touch(frame);
            return record;
        }

        let frame_info = state.frame_info.len();
        let recycled = state.free.pop();
        let key = state.used.insert_with_key(|key| UsedEntry {
            record: Self::recycle(recycled, key, frame),
            owner: slot.clone(),
            frame_info,
        });
        state.frame_info.push(FrameInfo { key, valid: true });
        let record = state.used[key].record.clone();

        let mask = object.phys_area_mask();
        if !mask.is_empty() {
            let proxy = self.tracker.create_proxy(object.clone(), slot.clone(), object.bounds(), mask);
            record.set_phys_proxy(Some(proxy));
        }

        slot.publish(record.clone());
        record
    }

    fn recycle(recycled: Option<Arc<TempRecord>>, key: TempKey, frame: u32) -> Arc<TempRecord> {
        if let Some(mut record) = recycled {
            if let Some(inner) = Arc::get_mut(&mut record) {
                inner.reset(key, frame);
                return record;
            }
        }
        // Fresh allocation when a stale reader still holds the recycled record
        Arc::new(TempRecord::new(key, frame))
    }

    /// Release a live record. Owner thread only.
    ///
    /// Aborts off the owner thread.
    ///
    /// # Panics
    ///
    /// When `key` is not live (double release).
    pub fn release(&self, key: TempKey) {
        self.context.ensure_owner_thread("TempDataPool::release");
        let mut state = self.state.lock();
        self.release_locked(&mut state, key);
    }

    /// Push new bounds to the physics proxy of the record published in `slot`
    pub fn update_phys_proxy(&self, slot: &TempSlot, bounds: AABB) -> bool {
        slot.get()
            .and_then(|record| record.phys_proxy())
            .is_some_and(|proxy| self.tracker.update_proxy(proxy, bounds))
    }

    /// Release whatever record is published in `slot`
    pub fn release_slot(&self, slot: &TempSlot) -> bool {
        match slot.get() {
            Some(record) => {
                self.release(record.key());
                true
            }
            None => false,
        }
    }

    fn release_locked(&self, state: &mut PoolState, key: TempKey) {
        let Some(entry) = state.used.remove(key) else {
            crate::engine_error!(
                "galaxy3d::TempDataPool",
                "Release of unknown or already released record {:?}",
                key
            );
            panic!("TempDataPool: double release of {:?}", key);
        };

        if let Some(proxy) = entry.record.phys_proxy() {
            self.tracker.reset_proxy(proxy);
            entry.record.set_phys_proxy(None);
        }
        if let Some(info) = state.frame_info.get_mut(entry.frame_info) {
            debug_assert_eq!(info.key, key);
            info.valid = false;
        }

        let cleared = entry.owner.clear();
        debug_assert!(cleared.map_or(true, |r| r.key() == key));
        state.free.push(entry.record);
    }

    /// Release stale records (or all of them with `force_all`). Owner thread only.
    ///
    /// A forced pass must only run once no traversal task can still hold a
    /// record; `Scene::free_all_temp_data` joins the frame's tasks first.
    pub fn garbage_collect(&self, force_all: bool) -> usize {
        self.context.ensure_owner_thread("TempDataPool::garbage_collect");

        let frame = self.context.frame_id();
        let cutoff = frame.saturating_sub(self.context.config().temp_data_max_frames);
        let mut state = self.state.lock();
        let total = state.used.len();
        let mut released = 0;

        if force_all {
            let keys: Vec<TempKey> = state.used.keys().collect();
            for key in keys {
                self.release_locked(&mut state, key);
                released += 1;
            }
            state.frame_info.clear();
        } else {
            let mut i = 0;
            while i < state.frame_info.len() {
                let info = state.frame_info[i];
                let keep = info.valid
                    && state
                        .used
                        .get(info.key)
                        .is_some_and(|entry| entry.record.last_used_frame() >= cutoff);
                if keep {
                    i += 1;
                    continue;
                }

                if info.valid && state.used.contains_key(info.key) {
                    self.release_locked(&mut state, info.key);
                    released += 1;
                }

                // Move the tail into the gap and re-examine slot i
                state.frame_info.swap_remove(i);
                if let Some(moved) = state.frame_info.get(i).copied() {
                    if let Some(entry) = state.used.get_mut(moved.key) {
                        entry.frame_info = i;
                    }
                }
            }
        }

        if released > 0 {
            crate::engine_trace!(
                "galaxy3d::TempDataPool",
                "GC frame {}: released {} of {} records (force_all={})",
                frame,
                released,
                total,
                force_all
            );
        }
        released
    }

    // ===== INSPECTION =====

    pub fn used_count(&self) -> usize {
        self.state.lock().used.len()
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Length of the GC table (live records plus released, uncompacted entries)
    pub fn frame_info_len(&self) -> usize {
        self.state.lock().frame_info.len()
    }

    pub fn is_live(&self, key: TempKey) -> bool {
        self.state.lock().used.contains_key(key)
    }

    /// Whether the released record `key` sits in the free list
    pub fn is_free(&self, key: TempKey) -> bool {
        self.state.lock().free.iter().any(|record| record.key() == key)
    }
}

#[cfg(test)]
#[path = "temp_data_pool_tests.rs"]
mod tests;
