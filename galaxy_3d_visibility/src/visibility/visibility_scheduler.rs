/// VisibilityScheduler: per-frame culling pipeline.
///
/// `begin_frame` walks the active trees front to back on the calling thread
/// and spawns one task per surviving node. Tasks test the node's objects and
/// either resolve them (worker-safe kinds) into the result queue or hand
/// them to the owner thread through the request queue. `drain` and
/// `end_frame` sort what arrived and forward it to the render submission.
///
/// Lock order: index (read) → pool → tracker → temp record user data.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use glam::Vec3;
use parking_lot::RwLock;
use rdst::{RadixKey, RadixSort};
use crate::camera::{Camera, Frustum};
use crate::context::SceneContext;
use crate::scene::{
    BoundedObject, NodeKey, ObjectKey, ObjectList, RenderFlags, SpatialIndex, TempDataPool, TempSlot,
    TreeId, AABB,
};
use super::collaborators::{OcclusionTester, RenderSubmission};
use super::cull_queue::CullQueue;
use super::lod::{resolve_lod, LodResolution};
use super::task_group::TaskGroup;

/// Scheduler state within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Dispatching,
    Draining,
}

/// Candidate handed to the owner thread for resolution
pub struct CullRequest {
    pub object: Arc<dyn BoundedObject>,
    pub key: ObjectKey,
    pub bbox: AABB,
    pub flags: RenderFlags,
    pub distance: f32,
    pub sort_key: u32,
    pub temp_slot: Arc<TempSlot>,
}

/// Resolved candidate ready for submission
pub struct CullResult {
    pub object: Arc<dyn BoundedObject>,
    pub key: ObjectKey,
    pub distance: f32,
    pub sort_key: u32,
    pub lod: LodResolution,
}

/// Counters of one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_id: u32,
    pub nodes_visited: usize,
    pub nodes_occluded: usize,
    pub tasks_spawned: usize,
    /// Objects that passed the frustum and view distance tests
    pub candidates: usize,
    pub occlusion_culled: usize,
    pub always_visible: usize,
    pub submitted: usize,
    pub dropped_requests: usize,
    pub dropped_results: usize,
    /// Queued candidates discarded because their object was unregistered
    pub removed_mid_frame: usize,
}

#[derive(Default)]
struct FrameCounters {
    candidates: AtomicUsize,
    occlusion_culled: AtomicUsize,
}

impl FrameCounters {
    fn reset(&self) {
        self.candidates.store(0, Ordering::Relaxed);
        self.occlusion_culled.store(0, Ordering::Relaxed);
    }
}

/// Camera data frozen for the duration of a frame
struct FrameView {
    frame_id: u32,
    frustum: Frustum,
    position: Vec3,
    zoom_factor: f32,
}

impl FrameView {
    fn from_camera(camera: &Camera, frame_id: u32) -> Self {
        Self {
            frame_id,
            frustum: *camera.frustum(),
            position: camera.position(),
            zoom_factor: camera.zoom_factor(),
        }
    }

    fn distance_to(&self, bbox: &AABB) -> f32 {
        bbox.distance_to_point(self.position) * self.zoom_factor
    }
}

/// Everything a traversal task reads, shared by the tasks of a frame
struct FrameShared {
    context: Arc<SceneContext>,
    index: Arc<RwLock<SpatialIndex>>,
    pool: Arc<TempDataPool>,
    occlusion: Arc<dyn OcclusionTester>,
    requests: Arc<CullQueue<CullRequest>>,
    results: Arc<CullQueue<CullResult>>,
    counters: Arc<FrameCounters>,
    view: FrameView,
}

/// Entry sorted by distance bits; non-negative floats order like their bits
#[derive(Debug, Clone, Copy)]
struct SortEntry {
    key: u32,
    index: u32,
}

impl RadixKey for SortEntry {
    const LEVELS: usize = 4;

    #[inline]
    fn get_level(&self, level: usize) -> u8 {
        (self.key >> (level * 8)) as u8
    }
}

/// Acquire the temp record and resolve LOD with its dissolve state
fn resolve_candidate(
    context: &SceneContext,
    pool: &TempDataPool,
    object: &Arc<dyn BoundedObject>,
    slot: &Arc<TempSlot>,
    bbox: &AABB,
    distance: f32,
) -> LodResolution {
    let record = pool.acquire(slot, object);
    let mut user = record.user();
    let lod = resolve_lod(context.config(), object.as_ref(), bbox, distance, Some(&mut user.dissolve));
    user.wanted_lod = lod.next_lod.unwrap_or(lod.lod);
    user.last_visible_frame = context.frame_id();
    lod
}

fn traverse_node(shared: &FrameShared, tree: TreeId, node: NodeKey) {
    let index = shared.index.read();
    let Some(node) = index.tree(tree).and_then(|octree| octree.node(node)) else {
        return;
    };
    let view = &shared.view;

    for list in ObjectList::ALL {
        for key in node.objects(list) {
            let Some(entry) = index.entry(*key) else { continue };
            if entry.flags().contains(RenderFlags::HIDDEN) || !view.frustum.intersects_aabb(entry.bbox()) {
                continue;
            }
            let distance = view.distance_to(entry.bbox());
            if distance > entry.max_view_distance() {
                continue;
            }
            shared.counters.candidates.fetch_add(1, Ordering::Relaxed);
            let sort_key = distance.to_bits();

            if !entry.kind().is_worker_safe() {
                shared.requests.push(
                    CullRequest {
                        object: entry.object().clone(),
                        key: *key,
                        bbox: *entry.bbox(),
                        flags: entry.flags(),
                        distance,
                        sort_key,
                        temp_slot: entry.temp_slot().clone(),
                    },
                    view.frame_id,
                );
                continue;
            }

            if !entry.flags().contains(RenderFlags::SKIP_OCCLUSION)
                && !shared.occlusion.test_aabb(entry.bbox(), distance)
            {
                shared.counters.occlusion_culled.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let lod = resolve_candidate(
                &shared.context,
                &shared.pool,
                entry.object(),
                entry.temp_slot(),
                entry.bbox(),
                distance,
            );
            shared.results.push(
                CullResult {
                    object: entry.object().clone(),
                    key: *key,
                    distance,
                    sort_key,
                    lod,
                },
                view.frame_id,
            );
        }
    }
}

// ===== SCHEDULER =====

pub struct VisibilityScheduler {
    context: Arc<SceneContext>,
    index: Arc<RwLock<SpatialIndex>>,
    pool: Arc<TempDataPool>,
    occlusion: Arc<dyn OcclusionTester>,
    requests: Arc<CullQueue<CullRequest>>,
    results: Arc<CullQueue<CullResult>>,
    counters: Arc<FrameCounters>,
    tasks: TaskGroup,
    phase: FramePhase,
    /// Shared data of the frame in flight
    frame: Option<Arc<FrameShared>>,
    always_visible_pending: bool,
    /// Stats of the frame in flight
    current: FrameStats,
    /// Stats of the last completed frame
    last: FrameStats,
    batch: Vec<CullResult>,
    sort_scratch: Vec<SortEntry>,
}

impl VisibilityScheduler {
    pub fn new(
        context: Arc<SceneContext>,
        index: Arc<RwLock<SpatialIndex>>,
        pool: Arc<TempDataPool>,
        occlusion: Arc<dyn OcclusionTester>,
    ) -> Self {
        let config = context.config();
        let requests = Arc::new(CullQueue::new("cull_requests", config.cull_queue_capacity));
        let results = Arc::new(CullQueue::new("cull_results", config.result_queue_capacity));
        let tasks = TaskGroup::new(!config.worker_jobs);
        Self {
            context,
            index,
            pool,
            occlusion,
            requests,
            results,
            counters: Arc::new(FrameCounters::default()),
            tasks,
            phase: FramePhase::Idle,
            frame: None,
            always_visible_pending: false,
            current: FrameStats::default(),
            last: FrameStats::default(),
            batch: Vec::new(),
            sort_scratch: Vec::new(),
        }
    }

    // ===== FRAME LIFECYCLE =====

    /// Start a frame: join the previous one, bump the frame id and dispatch
    /// one traversal task per visible node. Returns the number of tasks.
    pub fn begin_frame(&mut self, camera: &Camera) -> usize {
        self.context.ensure_owner_thread("VisibilityScheduler::begin_frame");
        self.tasks.join();

        if self.phase != FramePhase::Idle {
            let stale = self.discard_queued();
            crate::engine_warn!(
                "galaxy3d::VisibilityScheduler",
                "begin_frame while frame {} was {:?}, discarded {} queued candidates",
                self.current.frame_id,
                self.phase,
                stale
            );
        }

        let frame_id = self.context.advance_frame();
        self.phase = FramePhase::Dispatching;
        self.counters.reset();
        self.requests.take_frame_dropped();
        self.results.take_frame_dropped();
        self.current = FrameStats {
            frame_id,
            ..FrameStats::default()
        };

        let view = FrameView::from_camera(camera, frame_id);
        let nodes = self.visible_nodes(&view);

        let shared = Arc::new(FrameShared {
            context: self.context.clone(),
            index: self.index.clone(),
            pool: self.pool.clone(),
            occlusion: self.occlusion.clone(),
            requests: self.requests.clone(),
            results: self.results.clone(),
            counters: self.counters.clone(),
            view,
        });
        for (tree, node) in nodes {
            let shared = shared.clone();
            self.tasks.spawn(move || traverse_node(&shared, tree, node));
        }
        self.frame = Some(shared);

        self.current.tasks_spawned = self.tasks.spawned();
        self.always_visible_pending = true;
        self.phase = FramePhase::Draining;
        self.current.tasks_spawned
    }

    /// Submit everything that arrived so far, nearest first
    pub fn drain(&mut self, sink: &mut dyn RenderSubmission) -> usize {
        self.context.ensure_owner_thread("VisibilityScheduler::drain");
        if self.phase != FramePhase::Draining {
            return 0;
        }

        let mut batch = std::mem::take(&mut self.batch);
        if self.always_visible_pending {
            self.always_visible_pending = false;
            self.resolve_always_visible(&mut batch);
        }

        // Objects unregistered since traversal queued them are dropped here,
        // before their temp record could be acquired again or submitted
        let index = self.index.clone();
        {
            let index = index.read();
            while let Some(request) = self.requests.pop() {
                if index.entry(request.key).is_none() {
                    self.current.removed_mid_frame += 1;
                    continue;
                }
                if let Some(result) = self.resolve_request(request) {
                    batch.push(result);
                }
            }
            self.results.drain_into(&mut batch);
            let queued = batch.len();
            batch.retain(|result| index.entry(result.key).is_some());
            self.current.removed_mid_frame += queued - batch.len();
        }

        let submitted = self.submit_sorted(&mut batch, sink);
        self.batch = batch;
        self.current.submitted += submitted;
        submitted
    }

    /// Join the frame's tasks, drain the remainder and return to `Idle`
    pub fn end_frame(&mut self, sink: &mut dyn RenderSubmission) -> FrameStats {
        self.context.ensure_owner_thread("VisibilityScheduler::end_frame");
        if self.phase == FramePhase::Idle {
            return self.last;
        }

        self.tasks.join();
        self.drain(sink);

        let stats = &mut self.current;
        stats.candidates += self.counters.candidates.load(Ordering::Relaxed);
        stats.occlusion_culled += self.counters.occlusion_culled.load(Ordering::Relaxed);
        stats.dropped_requests = self.requests.take_frame_dropped();
        stats.dropped_results = self.results.take_frame_dropped();

        if stats.dropped_requests > 0 || stats.dropped_results > 0 {
            crate::engine_warn!(
                "galaxy3d::VisibilityScheduler",
                "Frame {} dropped {} requests and {} results on full queues",
                stats.frame_id,
                stats.dropped_requests,
                stats.dropped_results
            );
        }

        self.phase = FramePhase::Idle;
        self.frame = None;
        self.last = self.current;
        self.last
    }

    /// Block until the current frame's tasks finished, without draining
    pub fn wait_for_tasks(&mut self) {
        self.tasks.join();
    }

    // ===== DISPATCH =====

    /// Nodes of the active trees worth a task, nearest first
    fn visible_nodes(&mut self, view: &FrameView) -> Vec<(TreeId, NodeKey)> {
        let index = self.index.read();
        let vis_areas = index.vis_areas().clone();
        let mut trees = Vec::new();
        if vis_areas.outdoor_visible(view.position) {
            trees.push(TreeId::Outdoor);
        }
        trees.extend(vis_areas.visible_areas(view.position).into_iter().map(TreeId::Area));

        let node_occlusion = self.context.config().node_occlusion;
        let occlusion = self.occlusion.as_ref();
        let stats = &mut self.current;
        let mut nodes = Vec::new();

        for tree in trees {
            let Some(octree) = index.tree(tree) else { continue };
            octree.walk_front_to_back(view.position, |key, node| {
                let objects_box = node.objects_box();
                if objects_box.is_reset() || !view.frustum.intersects_aabb(objects_box) {
                    return false;
                }
                let distance = view.distance_to(objects_box);
                if distance > node.max_view_distance() {
                    return false;
                }
                if node_occlusion
                    && node.parent().is_some()
                    && !objects_box.contains_point(view.position)
                    && !occlusion.test_aabb(objects_box, distance)
                {
                    stats.nodes_occluded += 1;
                    return false;
                }
                stats.nodes_visited += 1;
                if node.has_objects() {
                    nodes.push((tree, key));
                }
                true
            });
        }
        nodes
    }

    // ===== OWNER-THREAD RESOLUTION =====

    fn resolve_request(&mut self, request: CullRequest) -> Option<CullResult> {
        if !request.flags.contains(RenderFlags::SKIP_OCCLUSION)
            && !self.occlusion.test_aabb(&request.bbox, request.distance)
        {
            self.current.occlusion_culled += 1;
            return None;
        }
        let lod = resolve_candidate(
            &self.context,
            &self.pool,
            &request.object,
            &request.temp_slot,
            &request.bbox,
            request.distance,
        );
        Some(CullResult {
            object: request.object,
            key: request.key,
            distance: request.distance,
            sort_key: request.sort_key,
            lod,
        })
    }

    fn resolve_always_visible(&mut self, batch: &mut Vec<CullResult>) {
        let Some(frame) = self.frame.clone() else { return };
        let index = self.index.read();
        for key in index.always_visible() {
            let Some(entry) = index.entry(*key) else { continue };
            if entry.flags().contains(RenderFlags::HIDDEN) {
                continue;
            }
            let distance = frame.view.distance_to(entry.bbox());
            let lod = resolve_candidate(
                &self.context,
                &self.pool,
                entry.object(),
                entry.temp_slot(),
                entry.bbox(),
                distance,
            );
            batch.push(CullResult {
                object: entry.object().clone(),
                key: *key,
                distance,
                sort_key: distance.to_bits(),
                lod,
            });
            self.current.always_visible += 1;
        }
    }

    fn submit_sorted(&mut self, batch: &mut Vec<CullResult>, sink: &mut dyn RenderSubmission) -> usize {
        if batch.is_empty() {
            return 0;
        }
        self.sort_scratch.clear();
        self.sort_scratch.extend(batch.iter().enumerate().map(|(index, result)| SortEntry {
            key: result.sort_key,
            index: index as u32,
        }));
        self.sort_scratch.radix_sort_unstable();

        for entry in &self.sort_scratch {
            let result = &batch[entry.index as usize];
            sink.submit(&result.object, result.lod, result.distance, result.sort_key);
        }
        let submitted = batch.len();
        batch.clear();
        submitted
    }

    fn discard_queued(&mut self) -> usize {
        let mut discarded = 0;
        while self.requests.pop().is_some() {
            discarded += 1;
        }
        while self.results.pop().is_some() {
            discarded += 1;
        }
        discarded
    }

    // ===== ACCESSORS =====

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Stats of the last completed frame
    pub fn last_stats(&self) -> FrameStats {
        self.last
    }

    pub fn requests(&self) -> &CullQueue<CullRequest> {
        &self.requests
    }

    pub fn results(&self) -> &CullQueue<CullResult> {
        &self.results
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending()
    }
}

#[cfg(test)]
#[path = "visibility_scheduler_tests.rs"]
mod tests;
