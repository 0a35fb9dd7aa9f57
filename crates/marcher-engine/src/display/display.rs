use anyhow::{Context, Result};

use crate::camera::Camera;
use crate::coords::{ColorRgba, Viewport};
use crate::gfx::{GfxError, GraphicsDevice, ShaderStage, UniformValue, WgpuDevice};
use crate::input::Key;
use crate::resource::{Semantic, ShaderProgram, ShaderUnit, Texture, VertexArray, VertexBuffer};
use crate::time::FrameClock;
use crate::window::{WindowSystem, WinitWindow};

use super::config::DisplayConfig;

/// Vertex inputs of the display program, in slot order.
pub const ATTRIBUTE_NAMES: [&str; 2] = ["vertex_Position", "screen_Position"];

/// Two triangles covering clip space, as homogeneous positions.
#[rustfmt::skip]
const QUAD: [f32; 24] = [
    -1.0, -1.0, 0.0, 1.0,
     1.0, -1.0, 0.0, 1.0,
     1.0,  1.0, 0.0, 1.0,
    -1.0, -1.0, 0.0, 1.0,
     1.0,  1.0, 0.0, 1.0,
    -1.0,  1.0, 0.0, 1.0,
];
const QUAD_VERTICES: u32 = 6;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DisplayState {
    Ready,
    /// Close was observed; the owner should stop updating and clean up.
    Closing,
    Destroyed,
}

/// Owns the window, the graphics device and every resource drawn each frame.
///
/// Teardown happens in `cleanup` (or on drop): program, vertex array,
/// textures, the graphics device, then the window. The device is `None`
/// once released.
pub struct Display<W: WindowSystem, D: GraphicsDevice> {
    device: Option<D>,
    window: W,
    vertex_array: VertexArray,
    program: ShaderProgram,
    textures: Vec<Texture>,
    viewport: Viewport,
    camera: Camera,
    clock: FrameClock,
    clear_color: ColorRgba,
    state: DisplayState,
}

impl Display<WinitWindow, WgpuDevice> {
    /// Opens the native window and its wgpu context, then builds the display.
    pub fn open(config: DisplayConfig) -> Result<Self> {
        let window = WinitWindow::open(config.window.clone())?;
        let handle = window
            .handle()
            .context("window was released before the graphics context was created")?;
        let device = WgpuDevice::new(handle, config.gpu.clone())
            .context("failed to create the graphics context")?;

        Self::new(window, device, &config)
    }
}

impl<W: WindowSystem, D: GraphicsDevice> Display<W, D> {
    /// Builds the quad, the program and the textures on `device`.
    ///
    /// Anything created before a failure is released again.
    pub fn new(window: W, mut device: D, config: &DisplayConfig) -> Result<Self> {
        let camera = Camera::new(&config.camera);
        let mut vertex_array =
            build_quad(&mut device, camera.zoom).context("failed to build the screen quad")?;

        let mut program = match load_program(&mut device, config) {
            Ok(program) => program,
            Err(e) => {
                vertex_array.destroy(&mut device);
                return Err(e);
            }
        };

        let textures = match load_textures(&mut device, config) {
            Ok(textures) => textures,
            Err(e) => {
                program.destroy(&mut device);
                vertex_array.destroy(&mut device);
                return Err(e);
            }
        };

        let viewport = window.framebuffer_size();
        log::info!(
            "display ready: {}x{} with {} texture(s)",
            viewport.width,
            viewport.height,
            textures.len()
        );

        Ok(Self {
            device: Some(device),
            window,
            vertex_array,
            program,
            textures,
            viewport,
            camera,
            clock: FrameClock::new(),
            clear_color: config.clear_color,
            state: DisplayState::Ready,
        })
    }

    pub fn should_close(&self) -> bool {
        self.state != DisplayState::Ready || self.window.should_close()
    }

    /// Runs one frame: clear, draw, present, then poll and react to events.
    pub fn update(&mut self) -> Result<()> {
        anyhow::ensure!(
            self.state != DisplayState::Destroyed,
            "display updated after cleanup"
        );

        let time = self.clock.tick();

        // A minimised window has no surface to draw into.
        if !self.viewport.is_empty() {
            self.render_frame()?;
        }

        self.window.poll_events();

        if let Some(size) = self.window.take_resize() {
            self.resize(size);
        }
        if self.window.input_frame().key_pressed(Key::Escape) {
            log::info!("escape pressed");
            self.window.request_close();
        }
        self.camera
            .update(self.window.input(), self.window.input_frame(), time.dt);

        if self.state == DisplayState::Ready && self.window.should_close() {
            log::info!("display closing");
            self.state = DisplayState::Closing;
        }
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        let uniforms: [(&str, UniformValue); 4] = [
            ("screen_Width", (self.viewport.width as f32).into()),
            ("screen_Height", (self.viewport.height as f32).into()),
            ("camera_Position", self.camera.position.to_array().into()),
            ("camera_Rotation", self.camera.rotation.to_array().into()),
        ];
        let device = self
            .device
            .as_mut()
            .context("graphics device already released")?;

        device.clear(self.clear_color);

        self.program.activate(device);
        let drawn = draw_active(
            device,
            &self.program,
            &self.vertex_array,
            &self.textures,
            uniforms,
        );
        self.program.deactivate(device);
        drawn.context("failed to draw the frame")?;

        device.present().context("failed to present the frame")?;
        Ok(())
    }

    fn resize(&mut self, size: Viewport) {
        if size == self.viewport {
            return;
        }
        log::debug!("viewport resized to {}x{}", size.width, size.height);
        self.viewport = size;
        if size.is_empty() {
            return;
        }
        if let Some(device) = self.device.as_mut() {
            device.resize(size.width, size.height);
        }
    }

    /// Releases the program, the vertex array, the textures, the graphics
    /// device and finally the window. Idempotent.
    pub fn cleanup(&mut self) {
        if self.state == DisplayState::Destroyed {
            return;
        }

        if let Some(mut device) = self.device.take() {
            self.program.destroy(&mut device);
            self.vertex_array.destroy(&mut device);
            for texture in &mut self.textures {
                texture.destroy(&mut device);
            }
            drop(device);
            log::debug!("graphics device released");
        }
        self.window.destroy();

        self.state = DisplayState::Destroyed;
        log::info!("display cleaned up");
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    /// The graphics device, until `cleanup` releases it.
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }
}

impl<W: WindowSystem, D: GraphicsDevice> Drop for Display<W, D> {
    fn drop(&mut self) {
        if self.state != DisplayState::Destroyed {
            log::warn!("display dropped without cleanup");
            self.cleanup();
        }
    }
}

fn draw_active<D>(
    device: &mut D,
    program: &ShaderProgram,
    vertex_array: &VertexArray,
    textures: &[Texture],
    uniforms: [(&str, UniformValue); 4],
) -> Result<(), GfxError>
where
    D: GraphicsDevice + ?Sized,
{
    for (name, value) in uniforms {
        program.set_uniform(device, name, value)?;
    }
    for (unit, texture) in textures.iter().enumerate() {
        program.bind_texture(device, unit as u32, texture);
    }
    vertex_array.render(device)?;
    Ok(())
}

/// Quad positions plus, per vertex, the matching corner of the virtual
/// screen at distance `zoom` from the eye.
fn build_quad<D>(device: &mut D, zoom: f32) -> Result<VertexArray, GfxError>
where
    D: GraphicsDevice + ?Sized,
{
    let corners = screen_corners(zoom);
    let mut position =
        VertexBuffer::new(device, Some(Semantic::Position), &QUAD, 4, QUAD_VERTICES)?;
    let screen = match VertexBuffer::new(
        device,
        Some(Semantic::Custom("screen".into())),
        corners.as_slice(),
        3,
        QUAD_VERTICES,
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            position.destroy(device);
            return Err(e);
        }
    };

    VertexArray::new(device, vec![position, screen])
}

fn screen_corners(zoom: f32) -> Vec<f32> {
    QUAD.chunks_exact(4)
        .flat_map(|v| [v[0] * 0.5, v[1] * 0.5, zoom])
        .collect()
}

fn load_program<D>(device: &mut D, config: &DisplayConfig) -> Result<ShaderProgram>
where
    D: GraphicsDevice + ?Sized,
{
    let vertex_path = config.vertex_shader_path();
    let mut vertex = ShaderUnit::from_file(device, ShaderStage::Vertex, &vertex_path)
        .with_context(|| format!("failed to load vertex shader {}", vertex_path.display()))?;

    let fragment_path = config.fragment_shader_path();
    let fragment = match ShaderUnit::from_file(device, ShaderStage::Fragment, &fragment_path) {
        Ok(unit) => unit,
        Err(e) => {
            vertex.destroy(device);
            return Err(e).with_context(|| {
                format!("failed to load fragment shader {}", fragment_path.display())
            });
        }
    };

    ShaderProgram::link(device, vec![vertex, fragment], &ATTRIBUTE_NAMES)
        .context("failed to link the display program")
}

fn load_textures<D>(device: &mut D, config: &DisplayConfig) -> Result<Vec<Texture>>
where
    D: GraphicsDevice + ?Sized,
{
    let mut textures: Vec<Texture> = Vec::with_capacity(config.textures.len());
    for path in config.texture_paths() {
        match Texture::from_file(device, &path) {
            Ok(texture) => textures.push(texture),
            Err(e) => {
                for texture in &mut textures {
                    texture.destroy(device);
                }
                return Err(e)
                    .with_context(|| format!("failed to load texture {}", path.display()));
            }
        }
    }
    Ok(textures)
}
