//! Small value types shared by the display, the camera and the device layer.
//!
//! World space (camera): left-handed, +X right, +Y up, the camera looks down
//! +Z at zero rotation. Viewport sizes are physical pixels.

mod color;
mod vec3;
mod viewport;

pub use color::ColorRgba;
pub use vec3::Vec3;
pub use viewport::Viewport;
