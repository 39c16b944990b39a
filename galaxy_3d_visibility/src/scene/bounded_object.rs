/// BoundedObject: the contract every placed object exposes to the core.
///
/// Objects are owned by the caller and shared with the core as
/// `Arc<dyn BoundedObject>`. The core only reads them, except for the
/// `on_phys_area_change` notification.

use bitflags::bitflags;
use super::aabb::AABB;
use super::physics_area_tracker::PhysicsMedium;

/// Maximum number of LODs an object can describe
pub const MAX_LODS: usize = 6;

// ===== RENDER KIND =====

/// Closed set of object kinds known to the visibility core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKind {
    Mesh,
    Vegetation,
    Light,
    Decal,
    Road,
    FogVolume,
    WaterVolume,
    Cloud,
    VolumeObject,
    Particles,
}

impl RenderKind {
    pub const ALL: [RenderKind; 10] = [
        RenderKind::Mesh,
        RenderKind::Vegetation,
        RenderKind::Light,
        RenderKind::Decal,
        RenderKind::Road,
        RenderKind::FogVolume,
        RenderKind::WaterVolume,
        RenderKind::Cloud,
        RenderKind::VolumeObject,
        RenderKind::Particles,
    ];

    /// Per-node list this kind is linked into
    pub const fn list(self) -> ObjectList {
        match self {
            RenderKind::Decal | RenderKind::Road => ObjectList::DecalsAndRoads,
            _ => ObjectList::General,
        }
    }

    /// Whether LOD/dissolve resolution may run on a traversal worker.
    ///
    /// The volume kinds update renderer-side state while being resolved and
    /// are handed to the main thread through the cull request queue.
    pub const fn is_worker_safe(self) -> bool {
        matches!(
            self,
            RenderKind::Mesh
                | RenderKind::Vegetation
                | RenderKind::Light
                | RenderKind::Decal
                | RenderKind::Road
        )
    }

    pub const fn is_light(self) -> bool {
        matches!(self, RenderKind::Light)
    }
}

/// Per-node object lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectList {
    General = 0,
    DecalsAndRoads = 1,
}

impl ObjectList {
    pub const COUNT: usize = 2;
    pub const ALL: [ObjectList; 2] = [ObjectList::General, ObjectList::DecalsAndRoads];

    pub const fn index(self) -> usize {
        self as usize
    }
}

// ===== RENDER FLAGS =====

bitflags! {
    /// Per-object render flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderFlags: u32 {
        /// Bypasses the octree; resolved every frame
        const ALWAYS_VISIBLE    = 1 << 0;
        const CASTS_SHADOWS     = 1 << 1;
        /// Set on nodes whose subtree contains at least one caster
        const HAS_CAST_SHADOWS  = 1 << 2;
        /// Never registered into a vis-area tree
        const OUTDOOR_ONLY      = 1 << 3;
        const HIDDEN            = 1 << 4;
        const GOOD_OCCLUDER     = 1 << 5;
        const COLLISION_PROXY   = 1 << 6;
        const RAYCAST_PROXY     = 1 << 7;
        const STATIC_INSTANCING = 1 << 8;
        /// Skip the occlusion test (always considered unoccluded)
        const SKIP_OCCLUSION    = 1 << 9;
    }
}

impl RenderFlags {
    /// Flags that disqualify an object from the shadow caster lists
    pub const NON_CASTER: RenderFlags = RenderFlags::HIDDEN
        .union(RenderFlags::COLLISION_PROXY)
        .union(RenderFlags::RAYCAST_PROXY)
        .union(RenderFlags::STATIC_INSTANCING);

    pub const CASTER_BITS: RenderFlags = RenderFlags::CASTS_SHADOWS.union(RenderFlags::HAS_CAST_SHADOWS);
}

// ===== LOD INFO =====

/// LOD description of an object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodInfo {
    /// Number of available LODs (at least 1)
    pub lod_count: u8,
    /// Finest LOD the object may use
    pub min_lod: u8,
    /// Per-object LOD ratio, normalized (1.0 = neutral)
    pub lod_ratio_norm: f32,
    /// Distance at which LOD `i + 1` starts, from face-area analysis.
    /// Only the first `lod_count - 1` entries are read.
    pub lod_distances: Option<[f32; MAX_LODS]>,
    /// Ignore `lod_distances` and use the bounding-box formula
    pub bbox_lod_only: bool,
}

impl Default for LodInfo {
    fn default() -> Self {
        Self {
            lod_count: 1,
            min_lod: 0,
            lod_ratio_norm: 1.0,
            lod_distances: None,
            bbox_lod_only: false,
        }
    }
}

// ===== BOUNDED OBJECT =====

/// Capability trait of a placed object
pub trait BoundedObject: Send + Sync {
    /// World-space bounds
    fn bounds(&self) -> AABB;

    /// Distance beyond which the object is never drawn
    fn max_view_distance(&self) -> f32;

    fn render_kind(&self) -> RenderKind;

    fn render_flags(&self) -> RenderFlags;

    /// LOD description; `None` renders LOD 0 only
    fn lod_info(&self) -> Option<LodInfo> {
        None
    }

    /// Physics media this object wants area-change notifications for
    fn phys_area_mask(&self) -> PhysicsMedium {
        PhysicsMedium::empty()
    }

    /// A physics area overlapping the object changed
    fn on_phys_area_change(&self) {}

    /// Name used in diagnostics
    fn name(&self) -> &str {
        "<unnamed>"
    }
}

#[cfg(test)]
#[path = "bounded_object_tests.rs"]
mod tests;
