/// Camera: per-frame view snapshot handed to `Scene::begin_frame`.
///
/// Owned by the caller. Only the derived values traversal needs are
/// computed here (world position, forward axis, frustum).

use glam::{Mat4, Vec3};
use super::frustum::Frustum;

#[derive(Debug, Clone)]
pub struct Camera {
    view_matrix: Mat4,
    projection_matrix: Mat4,
    position: Vec3,
    forward: Vec3,
    frustum: Frustum,
    zoom_factor: f32,
}

impl Camera {
    /// Build from view and projection matrices. Zoom factor defaults to 1.
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        let world = view.inverse();
        Self {
            view_matrix: view,
            projection_matrix: projection,
            position: world.w_axis.truncate(),
            forward: -world.z_axis.truncate().normalize_or_zero(),
            frustum: Frustum::from_view_projection(&(projection * view)),
            zoom_factor: 1.0,
        }
    }

    /// Convenience for tests and tools: right-handed look-at camera
    pub fn look_at(eye: Vec3, target: Vec3, projection: Mat4) -> Self {
        Self::new(Mat4::look_at_rh(eye, target, Vec3::Y), projection)
    }

    /// Scale applied to every view distance (narrow FOV keeps objects longer)
    pub fn with_zoom_factor(mut self, zoom_factor: f32) -> Self {
        self.zoom_factor = zoom_factor;
        self
    }

    // ===== GETTERS =====

    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix
    }

    /// Eye position in world space
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit view direction in world space
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn zoom_factor(&self) -> f32 {
        self.zoom_factor
    }

    // ===== SETTERS =====

    /// Replace both matrices and recompute the derived values
    pub fn set_view_projection(&mut self, view: Mat4, projection: Mat4) {
        let zoom_factor = self.zoom_factor;
        *self = Self::new(view, projection).with_zoom_factor(zoom_factor);
    }

    pub fn set_zoom_factor(&mut self, zoom_factor: f32) {
        self.zoom_factor = zoom_factor;
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
