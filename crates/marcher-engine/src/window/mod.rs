//! Native window and OS event pump.
//!
//! The display drives the loop itself, so the window system is polled once
//! per frame instead of owning `main` the way `EventLoop::run_app` would.

mod translate;
mod native;

pub use native::WinitWindow;

use crate::coords::Viewport;
use crate::input::{InputFrame, InputState};

/// Window configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    pub title: String,
    /// Inner size in logical pixels.
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Game Engine".to_string(),
            width: 700,
            height: 500,
        }
    }
}

/// Windowing service consumed by the display.
pub trait WindowSystem {
    /// Whether the OS, the user or the program asked the window to close.
    fn should_close(&self) -> bool;
    fn request_close(&mut self);

    /// Starts a new input frame and processes every pending OS event without blocking.
    fn poll_events(&mut self);

    /// Drawable size in physical pixels.
    fn framebuffer_size(&self) -> Viewport;

    fn input(&self) -> &InputState;
    /// Transitions collected by the last `poll_events`.
    fn input_frame(&self) -> &InputFrame;

    /// Latest size the window was resized to since the previous call.
    fn take_resize(&mut self) -> Option<Viewport>;

    /// Hides the window and releases it. Idempotent.
    fn destroy(&mut self);
}
