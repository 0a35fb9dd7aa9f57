//! The window, its graphics device and the full-screen ray-marching quad.

mod config;
mod display;

pub use config::DisplayConfig;
pub use display::{ATTRIBUTE_NAMES, Display, DisplayState};
