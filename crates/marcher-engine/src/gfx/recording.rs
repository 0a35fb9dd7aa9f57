//! Test doubles for the graphics and windowing services.
//!
//! Both append to one shared, ordered call log so a test can assert the exact
//! sequence a display frame or a resource teardown produces.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

use crate::coords::{ColorRgba, Viewport};
use crate::input::{InputEvent, InputFrame, InputState};
use crate::window::WindowSystem;

use super::device::GraphicsDevice;
use super::error::GfxError;
use super::reflect::ShaderReflection;
use super::types::{
    BufferId, ProgramId, ShaderId, ShaderStage, TextureDesc, TextureId, Topology,
    UniformLocation, UniformValue, VertexArrayId, VertexFormat, mip_level_count,
};

pub(crate) type CallLog = Rc<RefCell<Vec<Call>>>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateBuffer { id: u32, label: String, bytes: usize },
    DeleteBuffer(u32),
    CreateVertexArray(u32),
    BindVertexArray(Option<u32>),
    VertexAttribute { slot: u32, buffer: u32, format: VertexFormat },
    EnableAttribute(u32),
    DisableAttribute(u32),
    DeleteVertexArray(u32),
    CreateShader { id: u32, stage: ShaderStage },
    DeleteShader(u32),
    CreateProgram(u32),
    AttachShader { program: u32, shader: u32 },
    DetachShader { program: u32, shader: u32 },
    BindAttributeLocation { program: u32, slot: u32, name: String },
    LinkProgram(u32),
    ValidateProgram(u32),
    UseProgram(Option<u32>),
    SetUniform { location: u32, value: UniformValue },
    DeleteProgram(u32),
    CreateTexture { id: u32, width: u32, height: u32, levels: u32 },
    BindTexture { unit: u32, texture: Option<u32> },
    DeleteTexture(u32),
    Clear,
    DrawArrays { topology: Topology, first: u32, count: u32 },
    Present,
    Resize { width: u32, height: u32 },
    /// The device itself was dropped with `live` objects still allocated.
    ReleaseDevice { live: usize },

    PollEvents,
    DestroyWindow,
}

/// Graphics device that records calls instead of talking to a GPU.
///
/// Shader sources still go through naga, so compile errors and uniform
/// names behave like the real device.
pub(crate) struct RecordingDevice {
    log: CallLog,
    next_id: u32,
    live: BTreeSet<u32>,
    shader_uniforms: HashMap<u32, Vec<String>>,
    program_shaders: HashMap<u32, Vec<u32>>,
    program_uniforms: HashMap<u32, Vec<String>>,

    pub fail_link: bool,
    pub fail_validate: bool,
    pub fail_present: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::with_log(CallLog::default())
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            next_id: 0,
            live: BTreeSet::new(),
            shader_uniforms: HashMap::new(),
            program_shaders: HashMap::new(),
            program_uniforms: HashMap::new(),
            fail_link: false,
            fail_validate: false,
            fail_present: false,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.log.borrow_mut().clear();
    }

    /// Ids created and not deleted yet.
    pub fn live_objects(&self) -> usize {
        self.live.len()
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }

    fn create(&mut self) -> u32 {
        self.next_id += 1;
        self.live.insert(self.next_id);
        self.next_id
    }

    fn delete(&mut self, id: u32) {
        self.live.remove(&id);
    }
}

impl Drop for RecordingDevice {
    fn drop(&mut self) {
        // A test may still hold the log borrowed while its locals unwind.
        if let Ok(mut log) = self.log.try_borrow_mut() {
            log.push(Call::ReleaseDevice {
                live: self.live.len(),
            });
        }
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_buffer(&mut self, label: &str, contents: &[u8]) -> Result<BufferId, GfxError> {
        let id = self.create();
        self.record(Call::CreateBuffer {
            id,
            label: label.to_string(),
            bytes: contents.len(),
        });
        Ok(BufferId(id))
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.delete(buffer.0);
        self.record(Call::DeleteBuffer(buffer.0));
    }

    fn create_vertex_array(&mut self) -> Result<VertexArrayId, GfxError> {
        let id = self.create();
        self.record(Call::CreateVertexArray(id));
        Ok(VertexArrayId(id))
    }

    fn bind_vertex_array(&mut self, array: Option<VertexArrayId>) {
        self.record(Call::BindVertexArray(array.map(|a| a.0)));
    }

    fn vertex_attribute(
        &mut self,
        slot: u32,
        buffer: BufferId,
        format: VertexFormat,
    ) -> Result<(), GfxError> {
        self.record(Call::VertexAttribute {
            slot,
            buffer: buffer.0,
            format,
        });
        Ok(())
    }

    fn enable_attribute(&mut self, slot: u32) {
        self.record(Call::EnableAttribute(slot));
    }

    fn disable_attribute(&mut self, slot: u32) {
        self.record(Call::DisableAttribute(slot));
    }

    fn delete_vertex_array(&mut self, array: VertexArrayId) {
        self.delete(array.0);
        self.record(Call::DeleteVertexArray(array.0));
    }

    fn create_shader(
        &mut self,
        stage: ShaderStage,
        label: &str,
        source: &str,
    ) -> Result<ShaderId, GfxError> {
        let reflection = ShaderReflection::parse(stage, label, source)?;
        let id = self.create();
        let names = reflection
            .uniforms
            .map(|u| u.members.into_iter().map(|m| m.name).collect())
            .unwrap_or_default();
        self.shader_uniforms.insert(id, names);
        self.record(Call::CreateShader { id, stage });
        Ok(ShaderId(id))
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.delete(shader.0);
        self.record(Call::DeleteShader(shader.0));
    }

    fn create_program(&mut self, _label: &str) -> Result<ProgramId, GfxError> {
        let id = self.create();
        self.record(Call::CreateProgram(id));
        Ok(ProgramId(id))
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) -> Result<(), GfxError> {
        self.program_shaders.entry(program.0).or_default().push(shader.0);
        self.record(Call::AttachShader {
            program: program.0,
            shader: shader.0,
        });
        Ok(())
    }

    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(shaders) = self.program_shaders.get_mut(&program.0) {
            shaders.retain(|s| *s != shader.0);
        }
        self.record(Call::DetachShader {
            program: program.0,
            shader: shader.0,
        });
    }

    fn bind_attribute_location(
        &mut self,
        program: ProgramId,
        slot: u32,
        name: &str,
    ) -> Result<(), GfxError> {
        self.record(Call::BindAttributeLocation {
            program: program.0,
            slot,
            name: name.to_string(),
        });
        Ok(())
    }

    fn link_program(&mut self, program: ProgramId) -> Result<(), GfxError> {
        self.record(Call::LinkProgram(program.0));
        if self.fail_link {
            return Err(GfxError::Link {
                label: format!("#{}", program.0),
                details: "link failure requested by test".into(),
            });
        }

        let mut names: Vec<String> = Vec::new();
        for shader in self.program_shaders.get(&program.0).into_iter().flatten() {
            for name in self.shader_uniforms.get(shader).into_iter().flatten() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        self.program_uniforms.insert(program.0, names);
        Ok(())
    }

    fn validate_program(&mut self, program: ProgramId) -> Result<(), GfxError> {
        self.record(Call::ValidateProgram(program.0));
        if self.fail_validate {
            return Err(GfxError::Validate {
                label: format!("#{}", program.0),
                details: "validation failure requested by test".into(),
            });
        }
        Ok(())
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.program_uniforms
            .get(&program.0)?
            .iter()
            .position(|n| n == name)
            .map(|i| UniformLocation(i as u32))
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.record(Call::UseProgram(program.map(|p| p.0)));
    }

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), GfxError> {
        self.record(Call::SetUniform {
            location: location.0,
            value,
        });
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.delete(program.0);
        self.program_shaders.remove(&program.0);
        self.record(Call::DeleteProgram(program.0));
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc<'_>,
        rgba: &[u8],
    ) -> Result<TextureId, GfxError> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if rgba.len() != expected {
            return Err(GfxError::PayloadLength {
                expected,
                actual: rgba.len(),
            });
        }
        let id = self.create();
        let levels = match desc.sampler.mipmap {
            Some(_) => mip_level_count(desc.width, desc.height),
            None => 1,
        };
        self.record(Call::CreateTexture {
            id,
            width: desc.width,
            height: desc.height,
            levels,
        });
        Ok(TextureId(id))
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.record(Call::BindTexture {
            unit,
            texture: texture.map(|t| t.0),
        });
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.delete(texture.0);
        self.record(Call::DeleteTexture(texture.0));
    }

    fn clear(&mut self, _color: ColorRgba) {
        self.record(Call::Clear);
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) -> Result<(), GfxError> {
        self.record(Call::DrawArrays {
            topology,
            first,
            count,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<(), GfxError> {
        self.record(Call::Present);
        if self.fail_present {
            return Err(GfxError::Surface {
                details: "present failure requested by test".into(),
            });
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.record(Call::Resize { width, height });
    }
}

/// What one `poll_events` call delivers.
#[derive(Debug, Default, Clone)]
pub(crate) struct PollScript {
    pub events: Vec<InputEvent>,
    pub resize: Option<Viewport>,
    pub close: bool,
}

/// Window system fed from a script of polls.
pub(crate) struct RecordingWindow {
    log: CallLog,
    size: Viewport,
    script: VecDeque<PollScript>,
    input_state: InputState,
    input_frame: InputFrame,
    pending_resize: Option<Viewport>,
    close_requested: bool,
    destroyed: bool,
}

impl RecordingWindow {
    pub fn new(log: CallLog, size: Viewport) -> Self {
        Self {
            log,
            size,
            script: VecDeque::new(),
            input_state: InputState::default(),
            input_frame: InputFrame::default(),
            pending_resize: None,
            close_requested: false,
            destroyed: false,
        }
    }

    pub fn push_poll(&mut self, poll: PollScript) {
        self.script.push_back(poll);
    }
}

impl WindowSystem for RecordingWindow {
    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn request_close(&mut self) {
        self.close_requested = true;
    }

    fn poll_events(&mut self) {
        self.log.borrow_mut().push(Call::PollEvents);
        self.input_frame.clear();

        let Some(poll) = self.script.pop_front() else {
            return;
        };
        for ev in poll.events {
            self.input_state.apply_event(&mut self.input_frame, ev);
        }
        if let Some(size) = poll.resize {
            self.size = size;
            self.pending_resize = Some(size);
        }
        if poll.close {
            self.close_requested = true;
        }
    }

    fn framebuffer_size(&self) -> Viewport {
        self.size
    }

    fn input(&self) -> &InputState {
        &self.input_state
    }

    fn input_frame(&self) -> &InputFrame {
        &self.input_frame
    }

    fn take_resize(&mut self) -> Option<Viewport> {
        self.pending_resize.take()
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.log.borrow_mut().push(Call::DestroyWindow);
        }
        self.close_requested = true;
    }
}

/// Vertex stage with the display's attributes and uniforms.
pub(crate) const TEST_VERTEX_WGSL: &str = r#"
struct Uniforms {
    screen_Width: f32,
    screen_Height: f32,
    camera_Position: vec3<f32>,
    camera_Rotation: vec3<f32>,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) ray: vec3<f32>,
};

@vertex
fn vs_main(
    @location(0) vertex_Position: vec4<f32>,
    @location(1) screen_Position: vec3<f32>,
) -> VertexOut {
    var out: VertexOut;
    out.clip = vertex_Position;
    out.ray = screen_Position * vec3<f32>(u.screen_Width / u.screen_Height, 1.0, 1.0);
    return out;
}
"#;

/// Fragment stage matching [`TEST_VERTEX_WGSL`].
pub(crate) const TEST_FRAGMENT_WGSL: &str = r#"
struct Uniforms {
    screen_Width: f32,
    screen_Height: f32,
    camera_Position: vec3<f32>,
    camera_Rotation: vec3<f32>,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

@fragment
fn fs_main(@location(0) ray: vec3<f32>) -> @location(0) vec4<f32> {
    let shade = normalize(ray + u.camera_Rotation) * 0.5 + vec3<f32>(0.5);
    return vec4<f32>(shade, 1.0);
}
"#;
