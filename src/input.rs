use pathtracer_shared::glam::{Mat3, Mat4, Quat, Vec3};
use pathtracer_shared::CameraUniform;
use winit::event::{ElementState, MouseButton};

/// Input handling state
#[derive(Default)]
pub struct InputState {
    mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle mouse input events
    pub fn handle_mouse_input(&mut self, button: MouseButton, button_state: ElementState) {
        if button == MouseButton::Left {
            self.mouse_pressed = button_state == ElementState::Pressed;
        }
    }

    /// Handle cursor movement and return camera rotation delta if mouse is pressed
    pub fn handle_cursor_moved(&mut self, position: winit::dpi::PhysicalPosition<f64>) -> Option<(f64, f64)> {
        let delta = match (self.mouse_pressed, self.last_mouse_pos) {
            (true, Some((x, y))) => Some((position.x - x, position.y - y)),
            _ => None,
        };
        self.last_mouse_pos = Some((position.x, position.y));
        delta
    }
}

/// Free-fly camera: yaw and pitch from mouse drags, WASD translation
///
/// Produces the camera-to-world transform the renderer's camera record is derived from.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraController {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraController {
    pub const ROTATE_SENSITIVITY: f32 = 0.005;
    pub const MOVE_SPEED: f32 = 0.1;
    pub const PITCH_CLAMP: f32 = 1.5;

    /// Controller reproducing `camera`'s position and view direction.
    pub fn from_uniform(camera: &CameraUniform) -> Self {
        let forward = camera.forward_vec();
        Self {
            position: camera.position_vec(),
            yaw: (-forward.x).atan2(-forward.z),
            pitch: forward.y.clamp(-1.0, 1.0).asin(),
            fov: camera.fov,
            near: camera.near,
            far: camera.far,
        }
    }

    /// Apply camera rotation based on mouse delta
    pub fn rotate(&mut self, delta_x: f64, delta_y: f64) {
        self.yaw -= delta_x as f32 * Self::ROTATE_SENSITIVITY;
        self.pitch = (self.pitch - delta_y as f32 * Self::ROTATE_SENSITIVITY).clamp(-Self::PITCH_CLAMP, Self::PITCH_CLAMP);
    }

    /// Apply camera movement along the view direction and its right axis
    pub fn translate(&mut self, forward: f32, right: f32) {
        let rotation = self.rotation();
        self.position += rotation * (-Vec3::Z) * forward * Self::MOVE_SPEED;
        self.position += rotation * Vec3::X * right * Self::MOVE_SPEED;
    }

    fn rotation(&self) -> Mat3 {
        Mat3::from_quat(Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch))
    }

    pub fn transform(&self) -> Mat4 {
        Mat4::from_rotation_translation(
            Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch),
            self.position,
        )
    }

    pub fn uniform(&self) -> CameraUniform {
        CameraUniform::from_transform(self.transform(), self.fov, self.near, self.far)
    }
}
