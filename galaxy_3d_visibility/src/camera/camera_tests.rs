use glam::{Mat4, Vec3};
use super::*;

fn projection() -> Mat4 {
    Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0)
}

fn assert_vec3_near(a: Vec3, b: Vec3) {
    assert!((a - b).length() < 1e-4, "{:?} != {:?}", a, b);
}

#[test]
fn test_look_at_derives_position_and_forward() {
    let camera = Camera::look_at(Vec3::new(1.0, 2.0, 10.0), Vec3::new(1.0, 2.0, 0.0), projection());

    assert_vec3_near(camera.position(), Vec3::new(1.0, 2.0, 10.0));
    assert_vec3_near(camera.forward(), Vec3::new(0.0, 0.0, -1.0));
    assert_eq!(camera.zoom_factor(), 1.0);
}

#[test]
fn test_frustum_matches_matrices() {
    let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, projection());

    assert!(camera.frustum().contains_point(Vec3::ZERO));
    assert!(!camera.frustum().contains_point(Vec3::new(0.0, 0.0, 20.0)));
    assert_eq!(
        *camera.frustum(),
        Frustum::from_view_projection(&camera.view_projection_matrix())
    );
}

#[test]
fn test_set_view_projection_keeps_zoom() {
    let mut camera = Camera::look_at(Vec3::ZERO, Vec3::NEG_Z, projection()).with_zoom_factor(0.5);

    camera.set_view_projection(Mat4::look_at_rh(Vec3::X, Vec3::ZERO, Vec3::Y), projection());

    assert_eq!(camera.zoom_factor(), 0.5);
    assert_vec3_near(camera.position(), Vec3::X);
    assert_vec3_near(camera.forward(), Vec3::NEG_X);
}
