/// Scene: facade over the spatial index, temp data, physics areas and the
/// visibility scheduler.
///
/// A scene is bound to the thread that created it. Registration, the frame
/// lifecycle, release and garbage collection run there; traversal tasks only
/// read the index.

use std::sync::Arc;
use glam::Vec3;
use parking_lot::RwLock;
use crate::camera::{Camera, Frustum};
use crate::config::SceneConfig;
use crate::context::SceneContext;
use crate::engine_bail;
use crate::error::{Error, Result};
use crate::visibility::{
    FramePhase, FrameStats, NoOcclusion, OcclusionTester, RenderSubmission, StreamingSink,
    VisibilityScheduler,
};
use super::aabb::AABB;
use super::bounded_object::{BoundedObject, RenderFlags, RenderKind};
use super::octree::{ObjectCountFilter, TreeId};
use super::physics_area_tracker::{PhysicsAreaTracker, PhysicsMedium};
use super::spatial_index::{ObjectHome, RegisterOutcome, SpatialIndex};
use super::spatial_node::NodeKey;
use super::temp_data_pool::TempDataPool;
use super::vis_area::{NoVisAreas, VisAreaGraph};

/// Snapshot of scene bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub objects: usize,
    pub always_visible: usize,
    pub outdoor_nodes: usize,
    pub temp_records_used: usize,
    pub temp_records_free: usize,
    pub phys_proxies: usize,
    /// Objects rejected for invalid content since creation
    pub rejected_objects: usize,
    pub last_frame: FrameStats,
}

pub struct Scene {
    context: Arc<SceneContext>,
    tracker: Arc<PhysicsAreaTracker>,
    pool: Arc<TempDataPool>,
    index: Arc<RwLock<SpatialIndex>>,
    scheduler: VisibilityScheduler,
}

impl Scene {
    /// Outdoor-only scene without occlusion
    pub fn new(config: SceneConfig) -> Result<Self> {
        Self::with_collaborators(config, Arc::new(NoVisAreas), Arc::new(NoOcclusion))
    }

    /// Create a scene bound to the calling thread
    ///
    /// # Arguments
    ///
    /// * `config` - Validated before anything is built
    /// * `vis_areas` - Indoor area graph (`NoVisAreas` for outdoor-only worlds)
    /// * `occlusion` - Occlusion backend queried by traversal tasks
    pub fn with_collaborators(
        config: SceneConfig,
        vis_areas: Arc<dyn VisAreaGraph>,
        occlusion: Arc<dyn OcclusionTester>,
    ) -> Result<Self> {
        let context = Arc::new(SceneContext::new(config)?);
        let tracker = Arc::new(PhysicsAreaTracker::new(context.clone()));
        let pool = Arc::new(TempDataPool::new(context.clone(), tracker.clone()));
        let index = Arc::new(RwLock::new(SpatialIndex::new(context.clone(), pool.clone(), vis_areas)));
        let scheduler = VisibilityScheduler::new(context.clone(), index.clone(), pool.clone(), occlusion);

        crate::engine_info!(
            "galaxy3d::Scene",
            "Scene created, world bounds {:?}, worker jobs {}",
            context.config().world_bounds,
            context.config().worker_jobs
        );

        Ok(Self {
            context,
            tracker,
            pool,
            index,
            scheduler,
        })
    }

    // ===== REGISTRATION =====

    /// Insert an object, or re-home it when it is already registered.
    ///
    /// Invalid bounds are rejected with `Error::InvalidBounds`; a registered
    /// object whose bounds turned invalid is unregistered.
    pub fn register_object(&mut self, object: Arc<dyn BoundedObject>) -> Result<RegisterOutcome> {
        self.context.ensure_owner_thread("Scene::register_object");
        let (_, outcome) = self.index.write().register(object)?;
        Ok(outcome)
    }

    /// Remove an object and release its temp data. Returns false when unknown.
    pub fn unregister_object(&mut self, object: &Arc<dyn BoundedObject>) -> bool {
        self.context.ensure_owner_thread("Scene::unregister_object");
        self.index.write().unregister(object)
    }

    /// Unregister every object carrying any flag of `mask`
    pub fn unregister_objects_by_flags(&mut self, mask: RenderFlags) -> usize {
        self.context.ensure_owner_thread("Scene::unregister_objects_by_flags");
        self.index.write().unregister_by_flags(mask)
    }

    /// Collect objects (all, or those intersecting `area`), optionally
    /// unregistering them
    pub fn move_objects_into_list(&mut self, area: Option<&AABB>, remove: bool) -> Vec<Arc<dyn BoundedObject>> {
        self.context.ensure_owner_thread("Scene::move_objects_into_list");
        self.index.write().move_objects_into_list(area, remove)
    }

    pub fn object_home(&self, object: &Arc<dyn BoundedObject>) -> Result<ObjectHome> {
        self.index
            .read()
            .home_of(object)
            .ok_or_else(|| Error::UnknownObject(object.name().to_string()))
    }

    pub fn contains_object(&self, object: &Arc<dyn BoundedObject>) -> bool {
        self.index.read().key_of(object).is_some()
    }

    // ===== QUERIES =====

    pub fn objects_in_box(&self, bbox: &AABB, kind: Option<RenderKind>) -> Vec<Arc<dyn BoundedObject>> {
        self.index.read().objects_in_box(bbox, kind)
    }

    pub fn objects_by_flags(&self, mask: RenderFlags) -> Vec<Arc<dyn BoundedObject>> {
        self.index.read().objects_by_flags(mask)
    }

    pub fn is_object_type_in_box(&self, kind: RenderKind, bbox: &AABB) -> bool {
        self.index.read().is_object_type_in_box(kind, bbox)
    }

    pub fn objects_count(&self, filter: ObjectCountFilter) -> usize {
        self.index.read().objects_count(filter)
    }

    /// Union of the shadow casters' boxes, optionally restricted to `within`
    pub fn shadow_casters_box(&self, within: Option<&AABB>) -> AABB {
        self.index.read().shadow_casters_box(within)
    }

    pub fn collect_shadow_casters(&self, frustum: &Frustum, eye: Vec3) -> Vec<Arc<dyn BoundedObject>> {
        self.index.read().collect_shadow_casters(frustum, eye)
    }

    pub fn find_node_containing_box(&self, bbox: &AABB) -> Option<(TreeId, NodeKey)> {
        self.index.read().find_node_containing_box(bbox)
    }

    /// Report streaming candidates around `camera`, nearest first
    pub fn update_streaming_priority(
        &self,
        camera: &Camera,
        prediction_distance: f32,
        sink: &mut dyn StreamingSink,
    ) -> usize {
        self.index
            .read()
            .update_streaming_priority(camera.position(), camera.forward(), prediction_distance, sink)
    }

    // ===== MAINTENANCE =====

    /// Recompute node aggregates bottom-up and queue empty nodes
    pub fn cleanup_tree(&mut self) {
        self.context.ensure_owner_thread("Scene::cleanup_tree");
        self.index.write().cleanup_trees();
    }

    pub fn release_empty_nodes(&mut self) -> usize {
        self.context.ensure_owner_thread("Scene::release_empty_nodes");
        self.index.write().release_empty_nodes()
    }

    /// Release every temp record. Not allowed while a frame is in flight.
    pub fn free_all_temp_data(&mut self) -> Result<usize> {
        self.context.ensure_owner_thread("Scene::free_all_temp_data");
        if self.scheduler.phase() != FramePhase::Idle {
            engine_bail!(
                "galaxy3d::Scene",
                "free_all_temp_data called during frame {} ({:?})",
                self.context.frame_id(),
                self.scheduler.phase()
            );
        }
        self.scheduler.wait_for_tasks();
        let released = self.pool.garbage_collect(true);
        self.tracker.garbage_collect();
        Ok(released)
    }

    // ===== PHYSICS AREAS =====

    /// Physics callback: an area changed. Callable from any thread.
    pub fn on_phys_area_changed(&self, bounds: AABB, mask: PhysicsMedium) {
        self.tracker.mark_dirty(bounds, mask);
    }

    pub fn mark_global_wind_dirty(&self) {
        self.tracker.mark_global_wind_dirty();
    }

    // ===== FRAME LIFECYCLE =====

    /// Deliver pending physics notifications and dispatch traversal.
    /// Returns the number of traversal tasks.
    pub fn begin_frame(&mut self, camera: &Camera) -> usize {
        self.context.ensure_owner_thread("Scene::begin_frame");
        self.tracker.update();
        self.scheduler.begin_frame(camera)
    }

    /// Submit what traversal produced so far
    pub fn drain(&mut self, sink: &mut dyn RenderSubmission) -> usize {
        self.scheduler.drain(sink)
    }

    /// Finish the frame, then run the deferred maintenance: empty node
    /// release, temp record GC and physics proxy compaction.
    pub fn end_frame(&mut self, sink: &mut dyn RenderSubmission) -> FrameStats {
        let stats = self.scheduler.end_frame(sink);

        let released_nodes = self.index.write().release_empty_nodes();
        let released_records = self.pool.garbage_collect(false);
        let compacted = self.tracker.garbage_collect();
        if released_nodes + released_records + compacted > 0 {
            crate::engine_trace!(
                "galaxy3d::Scene",
                "Frame {} maintenance: {} nodes, {} temp records, {} proxies released",
                stats.frame_id,
                released_nodes,
                released_records,
                compacted
            );
        }
        stats
    }

    // ===== ACCESSORS =====

    pub fn context(&self) -> &Arc<SceneContext> {
        &self.context
    }

    pub fn config(&self) -> &SceneConfig {
        self.context.config()
    }

    pub fn frame_id(&self) -> u32 {
        self.context.frame_id()
    }

    pub fn phase(&self) -> FramePhase {
        self.scheduler.phase()
    }

    pub fn temp_data_pool(&self) -> &Arc<TempDataPool> {
        &self.pool
    }

    pub fn physics_area_tracker(&self) -> &Arc<PhysicsAreaTracker> {
        &self.tracker
    }

    /// Shared spatial index. Hold the guard briefly: traversal tasks and
    /// registration lock it too.
    pub fn spatial_index(&self) -> &Arc<RwLock<SpatialIndex>> {
        &self.index
    }

    pub fn scheduler(&self) -> &VisibilityScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> SceneStats {
        let index = self.index.read();
        SceneStats {
            objects: index.len(),
            always_visible: index.always_visible().len(),
            outdoor_nodes: index.outdoor().node_count(),
            temp_records_used: self.pool.used_count(),
            temp_records_free: self.pool.free_count(),
            phys_proxies: self.tracker.live_proxy_count(),
            rejected_objects: index.rejected_count(),
            last_frame: self.scheduler.last_stats(),
        }
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
