//! Camera, projection and the orbit controller.
//!
//! [`Camera`] is a look-at camera, [`Projection`] holds the perspective
//! parameters and caches its matrix, and [`OrbitControls`] rotates, pans and
//! dollies the camera around a target with optional inertial damping.

use std::f32::consts::PI;

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3, Zero, perspective};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use crate::config::CameraConfig;

/// Converts OpenGL clip space (z in -1..1) to wgpu's (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

const EPS: f32 = 0.000_001;

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    pub fn new(position: impl Into<Point3<f32>>, target: impl Into<Point3<f32>>) -> Self {
        Self {
            position: position.into(),
            target: target.into(),
            up: Vector3::unit_y(),
        }
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    /// Camera-space x axis (screen right) in world coordinates.
    pub fn right(&self) -> Vector3<f32> {
        let forward = (self.target - self.position).normalize();
        forward.cross(self.up).normalize()
    }

    /// Camera-space y axis (screen up) in world coordinates.
    pub fn screen_up(&self) -> Vector3<f32> {
        let forward = (self.target - self.position).normalize();
        self.right().cross(forward).normalize()
    }
}

impl From<&CameraConfig> for Camera {
    fn from(config: &CameraConfig) -> Self {
        Camera::new(config.position, config.target)
    }
}

#[derive(Clone, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
    matrix: Matrix4<f32>,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        let mut projection = Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
            matrix: Matrix4::zero(),
        };
        projection.update_projection_matrix();
        projection
    }

    pub fn from_config(config: &CameraConfig, width: u32, height: u32) -> Self {
        Self::new(
            width,
            height,
            cgmath::Deg(config.fovy),
            config.znear,
            config.zfar,
        )
    }

    /// Sets the aspect ratio from the new surface size and recomputes the
    /// matrix. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
        self.update_projection_matrix();
    }

    pub fn update_projection_matrix(&mut self) {
        self.matrix =
            OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar);
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fovy(&self) -> Rad<f32> {
        self.fovy
    }

    pub fn znear(&self) -> f32 {
        self.znear
    }

    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        self.matrix
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_position: [0.0; 4],
            view_proj: cgmath::Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that moves the camera in response to input and is advanced
/// once per frame.
pub trait CameraControls {
    /// Feeds a window event. Returns `true` if the event was used.
    fn handle_window_event(
        &mut self,
        event: &WindowEvent,
        camera: &Camera,
        projection: &Projection,
    ) -> bool;

    /// Tells the controller how large the drawing surface is.
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Applies pending motion to the camera. Returns `true` if it moved.
    fn update(&mut self, camera: &mut Camera) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Drag {
    None,
    Rotate,
    Pan,
}

/// Spherical coordinates around the y axis, `theta` measured from +z
/// towards +x and `phi` from +y.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Spherical {
    radius: f32,
    theta: f32,
    phi: f32,
}

impl Spherical {
    fn from_offset(offset: Vector3<f32>) -> Self {
        let radius = offset.magnitude();
        if radius == 0.0 {
            return Self::default();
        }
        Self {
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    fn to_offset(self) -> Vector3<f32> {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vector3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

/**
 * Orbits the camera around `target`.
 *
 * Left drag rotates, right drag pans in screen space, the wheel dollies.
 * Input only accumulates deltas; [`CameraControls::update`] applies them.
 * With damping enabled each update applies `damping_factor` of the pending
 * rotation and pan and keeps the rest for later frames, so the camera
 * glides to a stop instead of halting abruptly.
 */
#[derive(Clone, Debug)]
pub struct OrbitControls {
    pub target: Point3<f32>,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_rotate: bool,
    pub rotate_speed: f32,
    pub enable_zoom: bool,
    pub zoom_speed: f32,
    pub enable_pan: bool,
    pub pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    spherical_delta: Spherical,
    scale: f32,
    pan_offset: Vector3<f32>,
    drag: Drag,
    cursor: Option<(f64, f64)>,
    viewport: (u32, u32),
}

impl OrbitControls {
    pub fn new(target: impl Into<Point3<f32>>) -> Self {
        Self {
            target: target.into(),
            enable_damping: false,
            damping_factor: 0.05,
            enable_rotate: true,
            rotate_speed: 1.0,
            enable_zoom: true,
            zoom_speed: 1.0,
            enable_pan: true,
            pan_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            spherical_delta: Spherical::default(),
            scale: 1.0,
            pan_offset: Vector3::zero(),
            drag: Drag::None,
            cursor: None,
            viewport: (1, 1),
        }
    }

    /// Damped controls as the viewer sets them up.
    pub fn damped(target: impl Into<Point3<f32>>, damping_factor: f32) -> Self {
        Self {
            enable_damping: true,
            damping_factor,
            ..Self::new(target)
        }
    }

    fn client_height(&self) -> f32 {
        self.viewport.1.max(1) as f32
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.spherical_delta.theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.spherical_delta.phi -= angle;
    }

    /// Moves the target along the camera's screen axes by a world distance.
    pub fn pan(&mut self, right: f32, up: f32, camera: &Camera) {
        self.pan_offset += camera.right() * -right;
        self.pan_offset += camera.screen_up() * up;
    }

    /// Scale < 1 moves the camera closer.
    pub fn dolly(&mut self, scale: f32) {
        self.scale *= scale;
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    pub fn pointer_down(&mut self, button: MouseButton) {
        self.drag = match button {
            MouseButton::Left if self.enable_rotate => Drag::Rotate,
            MouseButton::Right if self.enable_pan => Drag::Pan,
            _ => Drag::None,
        };
    }

    pub fn pointer_up(&mut self) {
        self.drag = Drag::None;
    }

    /// Handles cursor motion to `position` (physical pixels).
    pub fn pointer_move(&mut self, position: (f64, f64), camera: &Camera, projection: &Projection) {
        let previous = self.cursor.replace(position);
        let Some((px, py)) = previous else {
            return;
        };
        let dx = (position.0 - px) as f32;
        let dy = (position.1 - py) as f32;
        match self.drag {
            Drag::Rotate => {
                let height = self.client_height();
                self.rotate_left(2.0 * PI * dx * self.rotate_speed / height);
                self.rotate_up(2.0 * PI * dy * self.rotate_speed / height);
            }
            Drag::Pan => {
                // Half of the fov is center to top of screen
                let distance = (camera.position - self.target).magnitude();
                let target_distance = distance * (projection.fovy().0 / 2.0).tan();
                let height = self.client_height();
                self.pan(
                    2.0 * dx * self.pan_speed * target_distance / height,
                    2.0 * dy * self.pan_speed * target_distance / height,
                    camera,
                );
            }
            Drag::None => {}
        }
    }

    /// `lines` > 0 means the wheel was turned away from the user (zoom in).
    pub fn wheel(&mut self, lines: f32) {
        if !self.enable_zoom || lines == 0.0 {
            return;
        }
        if lines > 0.0 {
            self.dolly(self.zoom_scale());
        } else {
            self.dolly(1.0 / self.zoom_scale());
        }
    }
}

impl CameraControls for OrbitControls {
    fn handle_window_event(
        &mut self,
        event: &WindowEvent,
        camera: &Camera,
        projection: &Projection,
    ) -> bool {
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                match state {
                    ElementState::Pressed => self.pointer_down(*button),
                    ElementState::Released => self.pointer_up(),
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.pointer_move((position.x, position.y), camera, projection);
                self.drag != Drag::None
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.pointer_up();
                false
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };
                self.wheel(lines);
                true
            }
            _ => false,
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn update(&mut self, camera: &mut Camera) -> bool {
        let offset = camera.position - self.target;
        let mut spherical = Spherical::from_offset(offset);

        if self.enable_damping {
            spherical.theta += self.spherical_delta.theta * self.damping_factor;
            spherical.phi += self.spherical_delta.phi * self.damping_factor;
        } else {
            spherical.theta += self.spherical_delta.theta;
            spherical.phi += self.spherical_delta.phi;
        }

        // Keep away from the poles where look-at degenerates
        let min_phi = self.min_polar_angle.max(EPS);
        let max_phi = self.max_polar_angle.min(PI - EPS);
        spherical.phi = spherical.phi.clamp(min_phi, max_phi);

        spherical.radius = (spherical.radius * self.scale).clamp(self.min_distance, self.max_distance);

        if self.enable_damping {
            self.target += self.pan_offset * self.damping_factor;
        } else {
            self.target += self.pan_offset;
        }

        let previous = camera.position;
        camera.position = self.target + spherical.to_offset();
        camera.target = self.target;

        if self.enable_damping {
            let decay = 1.0 - self.damping_factor;
            self.spherical_delta.theta *= decay;
            self.spherical_delta.phi *= decay;
            self.pan_offset *= decay;
        } else {
            self.spherical_delta = Spherical::default();
            self.pan_offset = Vector3::zero();
        }
        self.scale = 1.0;

        (camera.position - previous).magnitude2() > EPS
    }
}

#[cfg(test)]
mod tests {
    use cgmath::EuclideanSpace;

    use super::*;

    fn setup() -> (Camera, Projection, OrbitControls) {
        let config = CameraConfig::default();
        let camera = Camera::from(&config);
        let projection = Projection::from_config(&config, 800, 600);
        let mut controls = OrbitControls::damped(Point3::origin(), 0.05);
        controls.set_viewport(800, 600);
        (camera, projection, controls)
    }

    #[test]
    fn resize_sets_aspect() {
        let (_, mut projection, _) = setup();
        projection.resize(1920, 1080);
        assert!((projection.aspect() - 1920.0 / 1080.0).abs() < 1e-6);
        let before = projection.calc_matrix();
        projection.resize(0, 1080);
        assert_eq!(projection.calc_matrix(), before);
    }

    #[test]
    fn idle_controls_keep_camera_still() {
        let (mut camera, _, mut controls) = setup();
        let start = camera.clone();
        for _ in 0..10 {
            assert!(!controls.update(&mut camera));
        }
        assert!((camera.position - start.position).magnitude() < 1e-5);
    }

    #[test]
    fn damping_spreads_rotation_over_frames() {
        let (mut camera, _, mut controls) = setup();
        controls.rotate_left(0.5);

        controls.update(&mut camera);
        let first = Spherical::from_offset(camera.position - controls.target).theta;
        assert!((first - -0.5 * 0.05).abs() < 1e-4, "{first}");

        for _ in 0..1000 {
            controls.update(&mut camera);
        }
        let settled = Spherical::from_offset(camera.position - controls.target).theta;
        assert!((settled - -0.5).abs() < 1e-3, "{settled}");
        // Distance to the target is preserved by rotation
        assert!(((camera.position - controls.target).magnitude() - 5.0).abs() < 1e-3);
    }

    #[test]
    fn undamped_rotation_applies_at_once() {
        let (mut camera, _, _) = setup();
        let mut controls = OrbitControls::new(Point3::origin());
        controls.rotate_left(-PI / 2.0);
        assert!(controls.update(&mut camera));
        assert!((camera.position - Point3::new(5.0, 0.0, 0.0)).magnitude() < 1e-4);
        assert!(!controls.update(&mut camera));
    }

    #[test]
    fn polar_angle_is_clamped() {
        let (mut camera, _, _) = setup();
        let mut controls = OrbitControls::new(Point3::origin());
        controls.rotate_up(10.0);
        controls.update(&mut camera);
        assert!(camera.position.y <= 5.0 && camera.position.y > 4.99);
        assert!(camera.position.x.is_finite() && camera.position.z.is_finite());
    }

    #[test]
    fn wheel_dollies_towards_target() {
        let (mut camera, _, mut controls) = setup();
        controls.wheel(1.0);
        controls.update(&mut camera);
        assert!(((camera.position - controls.target).magnitude() - 5.0 * 0.95).abs() < 1e-4);
    }

    #[test]
    fn left_drag_rotates_and_right_drag_pans() {
        let (mut camera, projection, _) = setup();
        let mut controls = OrbitControls::new(Point3::origin());
        controls.set_viewport(800, 600);

        controls.pointer_down(MouseButton::Left);
        controls.pointer_move((100.0, 100.0), &camera, &projection);
        controls.pointer_move((130.0, 100.0), &camera, &projection);
        controls.pointer_up();
        controls.update(&mut camera);
        assert!(camera.position.x < 0.0, "{:?}", camera.position);

        let target_before = controls.target;
        controls.pointer_down(MouseButton::Right);
        controls.pointer_move((140.0, 100.0), &camera, &projection);
        controls.pointer_up();
        controls.update(&mut camera);
        assert_ne!(controls.target, target_before);
        assert_eq!(camera.target, controls.target);
    }
}
