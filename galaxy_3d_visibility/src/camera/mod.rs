//! Camera module: view snapshot and frustum.
//!
//! Cameras are owned and driven by the caller; the scene only reads the
//! snapshot passed to `begin_frame`.

mod camera;
mod frustum;

pub use camera::Camera;
pub use frustum::{Frustum, FrustumTest, Plane};
