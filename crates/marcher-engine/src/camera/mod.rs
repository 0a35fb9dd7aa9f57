//! First-person camera feeding the ray marcher's origin and orientation.

mod camera;

pub use camera::{Camera, CameraConfig, LOOK_SENSITIVITY};
