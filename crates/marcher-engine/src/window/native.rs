use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::coords::Viewport;
use crate::input::{InputFrame, InputState};

use super::translate::translate_window_event;
use super::{WindowConfig, WindowSystem};

/// Pumps before giving up on the platform delivering `resumed`.
const MAX_STARTUP_PUMPS: u32 = 100;

/// A single native window driven through winit's pump-events API.
///
/// Teardown order: release the graphics context sharing the window (see
/// [`WinitWindow::handle`]) first, then `destroy` hides the window and drops
/// the last handle. The event loop is dropped last, with the `WinitWindow`
/// itself; fields drop in declaration order.
pub struct WinitWindow {
    state: WindowState,
    event_loop: EventLoop<()>,
}

struct WindowState {
    config: WindowConfig,
    window: Option<Arc<Window>>,
    create_error: Option<String>,

    input_state: InputState,
    input_frame: InputFrame,
    pending_resize: Option<Viewport>,
    close_requested: bool,
}

impl WinitWindow {
    /// Creates the event loop and the window, centred on its monitor.
    pub fn open(config: WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut this = Self {
            event_loop,
            state: WindowState {
                config,
                window: None,
                create_error: None,
                input_state: InputState::default(),
                input_frame: InputFrame::default(),
                pending_resize: None,
                close_requested: false,
            },
        };

        // Windows can only be created from inside the loop, once it resumed.
        for _ in 0..MAX_STARTUP_PUMPS {
            let status = this
                .event_loop
                .pump_app_events(Some(Duration::from_millis(10)), &mut this.state);

            if let Some(err) = this.state.create_error.take() {
                return Err(anyhow!(err)).context("failed to create window");
            }
            if this.state.window.is_some() {
                // Resizes during creation are not interesting to the caller.
                this.state.pending_resize = None;
                return Ok(this);
            }
            if let PumpStatus::Exit(code) = status {
                anyhow::bail!("event loop exited with code {code} before the window was created");
            }
        }

        anyhow::bail!("window was not created after {MAX_STARTUP_PUMPS} event pumps")
    }

    /// Shared handle for the graphics context.
    pub fn handle(&self) -> Option<Arc<Window>> {
        self.state.window.clone()
    }
}

impl WindowState {
    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height))
            .with_visible(false);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create native window")?;

        if let Some(monitor) = window.current_monitor() {
            let area = monitor.size();
            let origin = monitor.position();
            let outer = window.outer_size();
            window.set_outer_position(PhysicalPosition::new(
                origin.x + (area.width as i32 - outer.width as i32) / 2,
                origin.y + (area.height as i32 - outer.height as i32) / 2,
            ));
        }
        window.set_visible(true);

        log::info!(
            "window '{}' created ({}x{} logical)",
            self.config.title,
            self.config.width,
            self.config.height
        );
        Ok(Arc::new(window))
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if self.window.is_some() || self.close_requested {
            return;
        }

        match self.create_window(event_loop) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                self.create_error = Some(format!("{e:#}"));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.clone() else {
            return;
        };

        if let Some(ev) = translate_window_event(&window, &event) {
            self.input_state.apply_event(&mut self.input_frame, ev);
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                log::info!("close requested by the window system");
                self.close_requested = true;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.pending_resize = Some(Viewport::new(size.width, size.height));
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = window.inner_size();
                self.pending_resize = Some(Viewport::new(size.width, size.height));
            }
            _ => {}
        }
    }
}

impl WindowSystem for WinitWindow {
    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn request_close(&mut self) {
        self.state.close_requested = true;
    }

    fn poll_events(&mut self) {
        self.state.input_frame.clear();

        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if let PumpStatus::Exit(code) = status {
            if !self.state.close_requested {
                log::info!("event loop exited with code {code}");
            }
            self.state.close_requested = true;
        }
    }

    fn framebuffer_size(&self) -> Viewport {
        self.state
            .window
            .as_ref()
            .map(|w| {
                let size = w.inner_size();
                Viewport::new(size.width, size.height)
            })
            .unwrap_or_default()
    }

    fn input(&self) -> &InputState {
        &self.state.input_state
    }

    fn input_frame(&self) -> &InputFrame {
        &self.state.input_frame
    }

    fn take_resize(&mut self) -> Option<Viewport> {
        self.state.pending_resize.take()
    }

    fn destroy(&mut self) {
        if let Some(window) = self.state.window.take() {
            window.set_visible(false);
            log::info!("window '{}' released", self.state.config.title);
        }
        self.state.close_requested = true;
    }
}
