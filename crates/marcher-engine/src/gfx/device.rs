use crate::coords::ColorRgba;

use super::error::GfxError;
use super::types::{
    BufferId, ProgramId, ShaderId, ShaderStage, TextureDesc, TextureId, Topology,
    UniformLocation, UniformValue, VertexArrayId, VertexFormat,
};

/// Graphics-device service consumed by the resource handles and the display.
///
/// The contract is call sequencing: objects are created, bound, fed and
/// deleted in the order the caller issues the calls. Binding state
/// (current vertex array, enabled attribute slots, current program, texture
/// units) is device state, exactly like a classic immediate-mode graphics API.
///
/// Frame protocol: `clear` and any number of `draw_arrays` record work for the
/// current frame; `present` submits it and shows the result.
pub trait GraphicsDevice {
    /// Allocates a buffer and uploads `contents` once.
    fn create_buffer(&mut self, label: &str, contents: &[u8]) -> Result<BufferId, GfxError>;
    fn delete_buffer(&mut self, buffer: BufferId);

    fn create_vertex_array(&mut self) -> Result<VertexArrayId, GfxError>;
    /// Binds `array` (or unbinds with `None`).
    fn bind_vertex_array(&mut self, array: Option<VertexArrayId>);
    /// Points attribute `slot` of the bound vertex array at `buffer`.
    fn vertex_attribute(
        &mut self,
        slot: u32,
        buffer: BufferId,
        format: VertexFormat,
    ) -> Result<(), GfxError>;
    fn enable_attribute(&mut self, slot: u32);
    fn disable_attribute(&mut self, slot: u32);
    fn delete_vertex_array(&mut self, array: VertexArrayId);

    /// Compiles one stage. Compiler diagnostics are returned as [`GfxError::Compile`].
    fn create_shader(
        &mut self,
        stage: ShaderStage,
        label: &str,
        source: &str,
    ) -> Result<ShaderId, GfxError>;
    fn delete_shader(&mut self, shader: ShaderId);

    fn create_program(&mut self, label: &str) -> Result<ProgramId, GfxError>;
    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) -> Result<(), GfxError>;
    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId);
    /// Binds the vertex input called `name` to attribute `slot`. Takes effect at link.
    fn bind_attribute_location(
        &mut self,
        program: ProgramId,
        slot: u32,
        name: &str,
    ) -> Result<(), GfxError>;
    fn link_program(&mut self, program: ProgramId) -> Result<(), GfxError>;
    fn validate_program(&mut self, program: ProgramId) -> Result<(), GfxError>;
    /// `None` when the linked program declares no uniform called `name`.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn use_program(&mut self, program: Option<ProgramId>);
    /// Sets a uniform of the program in use.
    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), GfxError>;
    fn delete_program(&mut self, program: ProgramId);

    /// Creates a 2D texture from tightly packed RGBA8 texels and builds its mip chain
    /// when `desc.sampler.mipmap` is set.
    fn create_texture(&mut self, desc: &TextureDesc<'_>, rgba: &[u8])
    -> Result<TextureId, GfxError>;
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);
    fn delete_texture(&mut self, texture: TextureId);

    /// Clears the framebuffer at the start of the current frame.
    fn clear(&mut self, color: ColorRgba);
    /// Draws `count` vertices starting at `first` from the bound vertex array
    /// through the program in use.
    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32)
    -> Result<(), GfxError>;
    /// Submits the recorded frame and swaps it onto the screen.
    fn present(&mut self) -> Result<(), GfxError>;
    /// Resizes the presentation surface (physical pixels).
    fn resize(&mut self, width: u32, height: u32);
}
