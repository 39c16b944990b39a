/// Frustum: six clipping planes used by traversal and shadow queries.
///
/// A point P is inside when `plane.signed_distance(P) >= 0` for every plane.
/// Box tests use the p-vertex / n-vertex corners and are conservative:
/// they may report a box as visible when it is not, never the reverse.

use glam::{Mat4, Vec3, Vec4};
use crate::scene::AABB;

/// 3-way box classification used for hierarchical culling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumTest {
    Outside,
    Inside,
    /// Straddles at least one plane
    Partial,
}

/// Plane `normal . p + d = 0`, normal pointing into the visible volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    fn from_row(row: Vec4) -> Self {
        let normal = row.truncate();
        let len = normal.length();
        if len > 0.0 {
            Self { normal: normal / len, d: row.w / len }
        } else {
            Self { normal, d: row.w }
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    /// Box corner furthest along the normal
    fn p_vertex(&self, aabb: &AABB) -> Vec3 {
        Vec3::select(self.normal.cmpge(Vec3::ZERO), aabb.max, aabb.min)
    }

    /// Box corner furthest against the normal
    fn n_vertex(&self, aabb: &AABB) -> Vec3 {
        Vec3::select(self.normal.cmpge(Vec3::ZERO), aabb.min, aabb.max)
    }
}

/// View volume: left, right, bottom, top, near, far
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Gribb & Hartmann plane extraction. Works for perspective and
    /// orthographic projections with a [0, 1] or [-1, 1] depth range
    /// (the near plane is conservative for the latter).
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        Self {
            planes: [
                Plane::from_row(r3 + r0),
                Plane::from_row(r3 - r0),
                Plane::from_row(r3 + r1),
                Plane::from_row(r3 - r1),
                Plane::from_row(r3 + r2),
                Plane::from_row(r3 - r2),
            ],
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(point) >= 0.0)
    }

    /// Whether the box is (potentially) visible
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(plane.p_vertex(aabb)) >= 0.0)
    }

    pub fn classify_aabb(&self, aabb: &AABB) -> FrustumTest {
        let mut result = FrustumTest::Inside;
        for plane in &self.planes {
            if plane.signed_distance(plane.p_vertex(aabb)) < 0.0 {
                return FrustumTest::Outside;
            }
            if plane.signed_distance(plane.n_vertex(aabb)) < 0.0 {
                result = FrustumTest::Partial;
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "frustum_tests.rs"]
mod tests;
