//! Marcher engine crate.
//!
//! A single-window ray-marching display: the window system, the wgpu-backed
//! graphics device, the resource handles built on it, and the display loop
//! that ties them together.

pub mod device;
pub mod window;
pub mod input;
pub mod time;

pub mod logging;
pub mod coords;
pub mod gfx;
pub mod resource;
pub mod camera;
pub mod display;
