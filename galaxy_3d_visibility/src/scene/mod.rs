//! Scene module
//!
//! Spatial index (outdoor and vis-area octrees), transient per-object data,
//! physics area tracking and the `Scene` facade tying them to the
//! visibility scheduler.

mod aabb;
mod bounded_object;
mod octree;
mod physics_area_tracker;
mod scene;
mod spatial_index;
mod spatial_node;
mod temp_data_pool;
mod vis_area;

pub use aabb::AABB;
pub use bounded_object::{BoundedObject, LodInfo, ObjectList, RenderFlags, RenderKind, MAX_LODS};
pub use octree::{ObjectCountFilter, Octree, TreeId};
pub use physics_area_tracker::{DirtyArea, PhysicsAreaTracker, PhysicsMedium, ProxyId};
pub use scene::{Scene, SceneStats};
pub use spatial_index::{ObjectEntry, ObjectHome, ObjectKey, RegisterOutcome, SpatialIndex};
pub use spatial_node::{CasterEntry, NodeKey, SpatialNode};
pub use temp_data_pool::{TempDataPool, TempKey, TempRecord, TempSlot, TempUserData};
pub use vis_area::{NoVisAreas, VisAreaGraph, VisAreaId};
