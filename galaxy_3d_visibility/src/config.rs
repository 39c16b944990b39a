//! Scene configuration
//!
//! Tuning values consumed by the octree, the temp-data pool, the physics
//! area tracker and the visibility scheduler. Built once, validated, then
//! frozen inside a `SceneContext`.

use glam::Vec3;
use crate::error::{Error, Result};
use crate::scene::AABB;

/// Configuration for a scene's spatial index and visibility pipeline
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// Bounds of the outdoor octree root
    pub world_bounds: AABB,

    /// A node only splits while its edge length is larger than this
    pub node_min_size: f32,

    /// Objects sink into a child while `radius < node_radius * ratio`
    pub object_to_node_size_ratio: f32,

    /// Objects with a smaller max view distance never cast shadows
    pub min_shadow_caster_view_dist: f32,

    /// Caster max distance = max view distance * this ratio
    pub shadows_cast_view_dist_ratio: f32,

    /// Registration rejects bounds with any extent above this
    pub max_object_extent: f32,

    /// Temp records unused for this many frames are collected
    pub temp_data_max_frames: u32,

    /// Dirty areas merge while `union_volume <= (v1 + v2) * threshold`
    pub phys_area_merge_threshold: f32,

    /// Capacity of the main-thread cull request queue
    pub cull_queue_capacity: usize,

    /// Capacity of the worker result queue
    pub result_queue_capacity: usize,

    /// Global LOD ratio (larger keeps finer LODs further out)
    pub lod_ratio: f32,

    /// Radius clamp used by distance-based LOD selection
    pub lod_comp_max_size: f32,

    /// Enable dissolve hysteresis between LODs
    pub dissolve_enabled: bool,

    /// Distance the camera must travel to commit a LOD change
    pub dissolve_dist_band: f32,

    /// Dispatch node traversal on the rayon pool (false: inline on the caller)
    pub worker_jobs: bool,

    /// Run occlusion tests on octree nodes, not only on objects
    pub node_occlusion: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            world_bounds: AABB::new(Vec3::ZERO, Vec3::splat(4096.0)),
            node_min_size: 8.0,
            object_to_node_size_ratio: 1.0 / 8.0,
            min_shadow_caster_view_dist: 8.0,
            shadows_cast_view_dist_ratio: 0.8,
            max_object_extent: 1.0e5,
            temp_data_max_frames: 300,
            phys_area_merge_threshold: 2.0,
            cull_queue_capacity: 4096,
            result_queue_capacity: 4096,
            lod_ratio: 6.0,
            lod_comp_max_size: 6.0,
            dissolve_enabled: true,
            dissolve_dist_band: 3.0,
            worker_jobs: true,
            node_occlusion: true,
        }
    }
}

impl SceneConfig {
    /// Check every field for a usable range
    pub fn validate(&self) -> Result<()> {
        if !self.world_bounds.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "world_bounds {:?} is not a finite, non-inverted box",
                self.world_bounds
            )));
        }
        let positive = [
            ("node_min_size", self.node_min_size),
            ("object_to_node_size_ratio", self.object_to_node_size_ratio),
            ("max_object_extent", self.max_object_extent),
            ("phys_area_merge_threshold", self.phys_area_merge_threshold),
            ("lod_ratio", self.lod_ratio),
            ("lod_comp_max_size", self.lod_comp_max_size),
            ("dissolve_dist_band", self.dissolve_dist_band),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfig(format!("{} must be > 0 (got {})", name, value)));
            }
        }
        if self.object_to_node_size_ratio > 1.0 {
            return Err(Error::InvalidConfig(format!(
                "object_to_node_size_ratio must be <= 1 (got {})",
                self.object_to_node_size_ratio
            )));
        }
        if !(self.shadows_cast_view_dist_ratio.is_finite() && self.shadows_cast_view_dist_ratio >= 0.0) {
            return Err(Error::InvalidConfig("shadows_cast_view_dist_ratio must be >= 0".to_string()));
        }
        if self.cull_queue_capacity == 0 || self.result_queue_capacity == 0 {
            return Err(Error::InvalidConfig("cull queue capacities must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
