use std::f32::consts::{FRAC_PI_2, PI, TAU};

use crate::coords::Vec3;
use crate::input::{InputFrame, InputState, Key};

/// Radians of rotation per logical pixel of pointer travel.
pub const LOOK_SENSITIVITY: f32 = PI / 500.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub position: Vec3,
    /// Distance from the eye to the virtual screen; larger is narrower.
    pub zoom: f32,
    /// World units per second.
    pub speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            zoom: 1.0,
            speed: 2.0,
        }
    }
}

/// Free-flying camera.
///
/// `rotation` is `(pitch, yaw, roll)` in radians. At zero rotation the
/// camera looks down `+z` with `+y` up; positive pitch looks down and
/// positive yaw turns left.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Vec3,
    pub zoom: f32,
    pub speed: f32,
}

impl Camera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            position: config.position,
            velocity: Vec3::zero(),
            rotation: Vec3::zero(),
            zoom: config.zoom,
            speed: config.speed,
        }
    }

    pub fn pitch(&self) -> f32 {
        self.rotation.x
    }

    pub fn yaw(&self) -> f32 {
        self.rotation.y
    }

    /// Horizontal direction the camera walks towards.
    pub fn forward(&self) -> Vec3 {
        let yaw = self.yaw();
        Vec3::new(-yaw.sin(), 0.0, yaw.cos())
    }

    pub fn right(&self) -> Vec3 {
        let yaw = self.yaw();
        Vec3::new(yaw.cos(), 0.0, yaw.sin())
    }

    /// Turns with this frame's pointer travel, then moves for `dt` seconds
    /// along the held movement keys.
    pub fn update(&mut self, input: &InputState, frame: &InputFrame, dt: f32) {
        let (dx, dy) = frame.pointer_delta;
        self.look(dx, dy);

        let axis = |plus: Key, minus: Key| {
            (input.key_down(plus) as i32 - input.key_down(minus) as i32) as f32
        };
        let ahead = axis(Key::W, Key::S);
        let side = axis(Key::D, Key::A);
        let up = axis(Key::Space, Key::Shift);

        self.velocity =
            (self.forward() * ahead + self.right() * side + Vec3::new(0.0, up, 0.0)).normalized();
        self.position += self.velocity * (dt * self.speed);
    }

    /// Applies a pointer movement of `(dx, dy)` logical pixels.
    pub fn look(&mut self, dx: f32, dy: f32) {
        let pitch = self.rotation.x + dy * LOOK_SENSITIVITY;
        let yaw = self.rotation.y - dx * LOOK_SENSITIVITY;
        self.rotation.x = pitch.clamp(-FRAC_PI_2, FRAC_PI_2);
        self.rotation.y = wrap_angle(yaw);
    }
}

/// Wraps `angle` into `[-PI, PI)`.
fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}
