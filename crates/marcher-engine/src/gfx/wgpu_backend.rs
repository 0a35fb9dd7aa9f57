//! [`GraphicsDevice`] over wgpu.
//!
//! wgpu has no bind-to-edit state, so this backend keeps the classic binding
//! state itself (bound vertex array, enabled slots, program in use, texture
//! units) and turns it into pipelines and bind groups when a draw is issued.
//! Draws are recorded and encoded into a single render pass at `present`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;
use std::sync::Arc;

use anyhow::Result;
use image::imageops::FilterType;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::coords::ColorRgba;
use crate::device::{Gpu, GpuInit, SurfaceErrorAction};

use super::device::GraphicsDevice;
use super::error::GfxError;
use super::reflect::{InputKind, ShaderReflection, UniformLayout, VertexInput};
use super::types::{
    BufferId, Filter, ProgramId, ScalarType, ShaderId, ShaderStage, TextureDesc, TextureId,
    Topology, UniformLocation, UniformValue, VertexArrayId, VertexFormat, Wrap,
    mip_level_count,
};

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

pub struct WgpuDevice {
    gpu: Gpu,
    next_id: u32,

    buffers: HashMap<BufferId, wgpu::Buffer>,
    arrays: HashMap<VertexArrayId, ArrayState>,
    shaders: HashMap<ShaderId, CompiledShader>,
    programs: HashMap<ProgramId, ProgramState>,
    textures: HashMap<TextureId, TextureState>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    bound_array: Option<VertexArrayId>,
    current_program: Option<ProgramId>,
    texture_units: BTreeMap<u32, TextureId>,

    frame: FrameRecord,
}

#[derive(Default)]
struct ArrayState {
    attributes: BTreeMap<u32, (BufferId, wgpu::VertexFormat)>,
    enabled: BTreeSet<u32>,
}

struct CompiledShader {
    module: wgpu::ShaderModule,
    reflection: ShaderReflection,
}

struct ProgramState {
    label: String,
    attached: Vec<ShaderId>,
    attribute_bindings: BTreeMap<u32, String>,
    linked: Option<LinkedProgram>,
}

#[derive(Clone)]
struct StageModule {
    module: wgpu::ShaderModule,
    entry_point: String,
}

struct LinkedProgram {
    vertex: StageModule,
    fragment: Option<StageModule>,
    inputs: Vec<VertexInput>,
    uniforms: UniformLayout,
    uniform_data: Vec<u8>,
    uniform_buffer: wgpu::Buffer,
    uniform_group: wgpu::BindGroup,
    texture_layout: Option<wgpu::BindGroupLayout>,
    texture_units: u32,
    layout: wgpu::PipelineLayout,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    topology: Topology,
    attributes: Vec<(u32, wgpu::VertexFormat)>,
}

struct TextureState {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

#[derive(Default)]
struct FrameRecord {
    clear: Option<wgpu::Color>,
    draws: Vec<RecordedDraw>,
}

struct RecordedDraw {
    pipeline: wgpu::RenderPipeline,
    vertex_buffers: Vec<wgpu::Buffer>,
    uniform_group: wgpu::BindGroup,
    texture_group: Option<wgpu::BindGroup>,
    vertices: Range<u32>,
}

impl WgpuDevice {
    /// Creates the wgpu context for `window` and blocks until the device is ready.
    pub fn new(window: Arc<Window>, init: GpuInit) -> Result<Self> {
        let gpu = pollster::block_on(Gpu::new(window, init))?;
        Ok(Self {
            gpu,
            next_id: 0,
            buffers: HashMap::new(),
            arrays: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            bound_array: None,
            current_program: None,
            texture_units: BTreeMap::new(),
            frame: FrameRecord::default(),
        })
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn supports_f64_attributes(&self) -> bool {
        self.gpu
            .device()
            .features()
            .contains(wgpu::Features::VERTEX_ATTRIBUTE_64BIT)
    }

    fn bound_array_mut(&mut self) -> Option<&mut ArrayState> {
        let id = self.bound_array?;
        self.arrays.get_mut(&id)
    }

    fn link(&self, program: ProgramId) -> Result<LinkedProgram, GfxError> {
        let state = self
            .programs
            .get(&program)
            .ok_or(GfxError::InvalidHandle { kind: "program", id: program.raw() })?;
        let link_error = |details: String| GfxError::Link {
            label: state.label.clone(),
            details,
        };

        let mut vertex: Option<&CompiledShader> = None;
        let mut fragment: Option<&CompiledShader> = None;
        for id in &state.attached {
            let shader = self
                .shaders
                .get(id)
                .ok_or(GfxError::InvalidHandle { kind: "shader", id: id.raw() })?;
            let slot = match shader.reflection.stage {
                ShaderStage::Vertex => &mut vertex,
                ShaderStage::Fragment => &mut fragment,
            };
            if slot.is_some() {
                return Err(link_error(format!(
                    "more than one {} stage attached",
                    shader.reflection.stage
                )));
            }
            *slot = Some(shader);
        }
        let vertex = vertex.ok_or_else(|| link_error("no vertex stage attached".into()))?;

        for (slot, name) in &state.attribute_bindings {
            match vertex.reflection.input(name) {
                Some(input) if input.location != *slot => {
                    return Err(link_error(format!(
                        "attribute '{name}' is declared at location {} but bound to slot {slot}",
                        input.location
                    )));
                }
                Some(_) => {}
                None => log::debug!(
                    "program '{}': attribute '{name}' is not consumed by the vertex stage",
                    state.label
                ),
            }
        }

        let mut uniforms: Option<&UniformLayout> = None;
        for stage in [Some(vertex), fragment].into_iter().flatten() {
            let Some(block) = &stage.reflection.uniforms else {
                continue;
            };
            match uniforms {
                None => uniforms = Some(block),
                Some(existing) if existing != block => {
                    return Err(link_error("stages disagree on the uniform block".into()));
                }
                Some(_) => {}
            }
        }
        let uniforms = uniforms.cloned().unwrap_or(UniformLayout {
            members: Vec::new(),
            size: 0,
        });
        let texture_units = [Some(vertex), fragment]
            .into_iter()
            .flatten()
            .map(|s| s.reflection.texture_units)
            .max()
            .unwrap_or(0);

        let device = self.gpu.device();
        let label = state.label.as_str();
        let uniform_size = uniforms.size.max(16);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} uniforms")),
            size: uniform_size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label} uniform layout")),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniform_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label} uniform group")),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let texture_layout = (texture_units > 0).then(|| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..texture_units)
                .flat_map(|unit| {
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: unit * 2,
                            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: unit * 2 + 1,
                            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ]
                })
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label} texture layout")),
                entries: &entries,
            })
        });

        let layout = match &texture_layout {
            Some(textures) => device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label} pipeline layout")),
                bind_group_layouts: &[&uniform_layout, textures],
                immediate_size: 0,
            }),
            None => device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label} pipeline layout")),
                bind_group_layouts: &[&uniform_layout],
                immediate_size: 0,
            }),
        };

        let stage_module = |shader: &CompiledShader| StageModule {
            module: shader.module.clone(),
            entry_point: shader.reflection.entry_point.clone(),
        };

        Ok(LinkedProgram {
            vertex: stage_module(vertex),
            fragment: fragment.map(stage_module),
            inputs: vertex.reflection.inputs.clone(),
            uniform_data: vec![0; uniform_size as usize],
            uniforms,
            uniform_buffer,
            uniform_group,
            texture_layout,
            texture_units,
            layout,
        })
    }

    fn texture_group(
        &self,
        label: &str,
        linked: &LinkedProgram,
    ) -> Result<Option<wgpu::BindGroup>, GfxError> {
        let Some(layout) = &linked.texture_layout else {
            return Ok(None);
        };

        let mut entries = Vec::with_capacity(linked.texture_units as usize * 2);
        for unit in 0..linked.texture_units {
            let id = self
                .texture_units
                .get(&unit)
                .ok_or(GfxError::NothingBound { what: "texture" })?;
            let texture = self
                .textures
                .get(id)
                .ok_or(GfxError::InvalidHandle { kind: "texture", id: id.raw() })?;
            entries.push(wgpu::BindGroupEntry {
                binding: unit * 2,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: unit * 2 + 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            });
        }

        Ok(Some(self.gpu.device().create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some(&format!("{label} texture group")),
                layout,
                entries: &entries,
            },
        )))
    }

    fn create_pipeline(&self, linked: &LinkedProgram, key: &PipelineKey) -> wgpu::RenderPipeline {
        let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
            .attributes
            .iter()
            .map(|&(slot, format)| {
                [wgpu::VertexAttribute {
                    format,
                    offset: 0,
                    shader_location: slot,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .attributes
            .iter()
            .zip(&attributes)
            .map(|(&(_, format), attributes)| wgpu::VertexBufferLayout {
                array_stride: format.size(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let targets = [Some(wgpu::ColorTargetState {
            format: self.gpu.surface_format(),
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        self.gpu
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("marcher pipeline"),
                layout: Some(&linked.layout),
                vertex: wgpu::VertexState {
                    module: &linked.vertex.module,
                    entry_point: Some(&linked.vertex.entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &buffers,
                },
                fragment: linked.fragment.as_ref().map(|fs| wgpu::FragmentState {
                    module: &fs.module,
                    entry_point: Some(&fs.entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &targets,
                }),
                primitive: wgpu::PrimitiveState {
                    topology: match key.topology {
                        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
                        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
                    },
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(&mut self, label: &str, contents: &[u8]) -> Result<BufferId, GfxError> {
        let buffer = self
            .gpu
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::VERTEX,
            });
        let id = BufferId(self.next_id());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(&buffer) {
            Some(b) => b.destroy(),
            None => log::warn!("delete of unknown buffer #{}", buffer.raw()),
        }
    }

    fn create_vertex_array(&mut self) -> Result<VertexArrayId, GfxError> {
        let id = VertexArrayId(self.next_id());
        self.arrays.insert(id, ArrayState::default());
        Ok(id)
    }

    fn bind_vertex_array(&mut self, array: Option<VertexArrayId>) {
        self.bound_array = array;
    }

    fn vertex_attribute(
        &mut self,
        slot: u32,
        buffer: BufferId,
        format: VertexFormat,
    ) -> Result<(), GfxError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(GfxError::InvalidHandle { kind: "buffer", id: buffer.raw() });
        }
        let wgpu_format = vertex_format(format, self.supports_f64_attributes())
            .ok_or(GfxError::UnsupportedFormat { format })?;
        let array = self
            .bound_array_mut()
            .ok_or(GfxError::NothingBound { what: "vertex array" })?;
        array.attributes.insert(slot, (buffer, wgpu_format));
        Ok(())
    }

    fn enable_attribute(&mut self, slot: u32) {
        match self.bound_array_mut() {
            Some(array) => {
                array.enabled.insert(slot);
            }
            None => log::warn!("enable of attribute {slot} with no vertex array bound"),
        }
    }

    fn disable_attribute(&mut self, slot: u32) {
        match self.bound_array_mut() {
            Some(array) => {
                array.enabled.remove(&slot);
            }
            None => log::warn!("disable of attribute {slot} with no vertex array bound"),
        }
    }

    fn delete_vertex_array(&mut self, array: VertexArrayId) {
        if self.arrays.remove(&array).is_none() {
            log::warn!("delete of unknown vertex array #{}", array.raw());
        }
        if self.bound_array == Some(array) {
            self.bound_array = None;
        }
    }

    fn create_shader(
        &mut self,
        stage: ShaderStage,
        label: &str,
        source: &str,
    ) -> Result<ShaderId, GfxError> {
        // naga validation first, so bad sources surface as errors rather than
        // tripping the device's uncaptured-error handler.
        let reflection = ShaderReflection::parse(stage, label, source)?;
        let module = self
            .gpu
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let id = ShaderId(self.next_id());
        self.shaders.insert(id, CompiledShader { module, reflection });
        log::debug!("compiled {stage} shader '{label}' as #{}", id.raw());
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(&shader).is_none() {
            log::warn!("delete of unknown shader #{}", shader.raw());
        }
    }

    fn create_program(&mut self, label: &str) -> Result<ProgramId, GfxError> {
        let id = ProgramId(self.next_id());
        self.programs.insert(
            id,
            ProgramState {
                label: label.to_string(),
                attached: Vec::new(),
                attribute_bindings: BTreeMap::new(),
                linked: None,
            },
        );
        Ok(id)
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) -> Result<(), GfxError> {
        if !self.shaders.contains_key(&shader) {
            return Err(GfxError::InvalidHandle { kind: "shader", id: shader.raw() });
        }
        let state = self
            .programs
            .get_mut(&program)
            .ok_or(GfxError::InvalidHandle { kind: "program", id: program.raw() })?;
        if !state.attached.contains(&shader) {
            state.attached.push(shader);
        }
        Ok(())
    }

    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(state) = self.programs.get_mut(&program) {
            state.attached.retain(|s| *s != shader);
        }
    }

    fn bind_attribute_location(
        &mut self,
        program: ProgramId,
        slot: u32,
        name: &str,
    ) -> Result<(), GfxError> {
        let state = self
            .programs
            .get_mut(&program)
            .ok_or(GfxError::InvalidHandle { kind: "program", id: program.raw() })?;
        state.attribute_bindings.insert(slot, name.to_string());
        Ok(())
    }

    fn link_program(&mut self, program: ProgramId) -> Result<(), GfxError> {
        let result = self.link(program);
        let state = self
            .programs
            .get_mut(&program)
            .ok_or(GfxError::InvalidHandle { kind: "program", id: program.raw() })?;
        match result {
            Ok(linked) => {
                log::debug!(
                    "linked program '{}' ({} inputs, {} uniforms, {} texture units)",
                    state.label,
                    linked.inputs.len(),
                    linked.uniforms.members.len(),
                    linked.texture_units
                );
                state.linked = Some(linked);
                self.pipelines.retain(|key, _| key.program != program);
                Ok(())
            }
            Err(err) => {
                state.linked = None;
                Err(err)
            }
        }
    }

    fn validate_program(&mut self, program: ProgramId) -> Result<(), GfxError> {
        let state = self
            .programs
            .get(&program)
            .ok_or(GfxError::InvalidHandle { kind: "program", id: program.raw() })?;
        if state.linked.is_none() {
            return Err(GfxError::Validate {
                label: state.label.clone(),
                details: "program is not linked".into(),
            });
        }
        Ok(())
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let linked = self.programs.get(&program)?.linked.as_ref()?;
        linked
            .uniforms
            .index_of(name)
            .map(|index| UniformLocation(index as u32))
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        if let Some(id) = program {
            let linked = self.programs.get(&id).is_some_and(|p| p.linked.is_some());
            if !linked {
                log::warn!("program #{} is used before a successful link", id.raw());
            }
        }
        self.current_program = program;
    }

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), GfxError> {
        let program = self
            .current_program
            .ok_or(GfxError::NothingBound { what: "program" })?;
        let state = self
            .programs
            .get_mut(&program)
            .ok_or(GfxError::InvalidHandle { kind: "program", id: program.raw() })?;
        let linked = state.linked.as_mut().ok_or_else(|| GfxError::Validate {
            label: state.label.clone(),
            details: "program is not linked".into(),
        })?;

        let member = linked
            .uniforms
            .members
            .get(location.0 as usize)
            .ok_or(GfxError::InvalidHandle { kind: "uniform", id: location.0 })?;
        if member.kind != value.kind() {
            return Err(GfxError::UniformType {
                expected: member.kind,
                actual: value.kind(),
            });
        }

        let bytes = value.as_bytes();
        let start = member.offset as usize;
        linked.uniform_data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            log::warn!("delete of unknown program #{}", program.raw());
        }
        self.pipelines.retain(|key, _| key.program != program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc<'_>,
        rgba: &[u8],
    ) -> Result<TextureId, GfxError> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if rgba.len() != expected || expected == 0 {
            return Err(GfxError::PayloadLength {
                expected,
                actual: rgba.len(),
            });
        }

        let levels = match desc.sampler.mipmap {
            Some(_) => mip_level_count(desc.width, desc.height),
            None => 1,
        };
        let chain = mip_chain(desc.width, desc.height, rgba, levels)?;

        let device = self.gpu.device();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, (width, height, texels)) in chain.iter().enumerate() {
            self.gpu.queue().write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                texels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(*height),
                },
                wgpu::Extent3d {
                    width: *width,
                    height: *height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let params = desc.sampler;
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: address_mode(params.wrap),
            address_mode_v: address_mode(params.wrap),
            address_mode_w: address_mode(params.wrap),
            mag_filter: filter_mode(params.mag_filter),
            min_filter: filter_mode(params.min_filter),
            mipmap_filter: match params.mipmap {
                Some(Filter::Linear) => wgpu::MipmapFilterMode::Linear,
                Some(Filter::Nearest) | None => wgpu::MipmapFilterMode::Nearest,
            },
            ..Default::default()
        });

        let id = TextureId(self.next_id());
        self.textures.insert(
            id,
            TextureState {
                texture,
                view,
                sampler,
            },
        );
        log::debug!(
            "uploaded texture '{}' {}x{} ({levels} levels) as #{}",
            desc.label,
            desc.width,
            desc.height,
            id.raw()
        );
        Ok(id)
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match texture {
            Some(id) => {
                self.texture_units.insert(unit, id);
            }
            None => {
                self.texture_units.remove(&unit);
            }
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        match self.textures.remove(&texture) {
            Some(state) => state.texture.destroy(),
            None => log::warn!("delete of unknown texture #{}", texture.raw()),
        }
        self.texture_units.retain(|_, bound| *bound != texture);
    }

    fn clear(&mut self, color: ColorRgba) {
        self.frame.clear = Some(color.to_wgpu());
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) -> Result<(), GfxError> {
        let program_id = self
            .current_program
            .ok_or(GfxError::NothingBound { what: "program" })?;
        let array_id = self
            .bound_array
            .ok_or(GfxError::NothingBound { what: "vertex array" })?;

        let program = self
            .programs
            .get(&program_id)
            .ok_or(GfxError::InvalidHandle { kind: "program", id: program_id.raw() })?;
        let validate_error = |details: String| GfxError::Validate {
            label: program.label.clone(),
            details,
        };
        let linked = program
            .linked
            .as_ref()
            .ok_or_else(|| validate_error("program is not linked".into()))?;
        let array = self
            .arrays
            .get(&array_id)
            .ok_or(GfxError::InvalidHandle { kind: "vertex array", id: array_id.raw() })?;

        let mut attributes = Vec::with_capacity(array.enabled.len());
        let mut vertex_buffers = Vec::with_capacity(array.enabled.len());
        for slot in &array.enabled {
            let (buffer_id, format) = array
                .attributes
                .get(slot)
                .ok_or(GfxError::NothingBound { what: "attribute buffer" })?;
            let buffer = self
                .buffers
                .get(buffer_id)
                .ok_or(GfxError::InvalidHandle { kind: "buffer", id: buffer_id.raw() })?;
            attributes.push((*slot, *format));
            vertex_buffers.push(buffer.clone());
        }

        for input in &linked.inputs {
            match attributes.iter().find(|(slot, _)| *slot == input.location) {
                None => {
                    return Err(validate_error(format!(
                        "vertex input '{}' at location {} has no enabled attribute",
                        input.name, input.location
                    )));
                }
                Some((_, format)) if !feeds(input.kind, *format) => {
                    return Err(validate_error(format!(
                        "vertex input '{}' cannot be fed from {format:?}",
                        input.name
                    )));
                }
                Some(_) => {}
            }
        }

        let texture_group = self.texture_group(&program.label, linked)?;

        // One uniform buffer per program: the last values set in a frame win.
        self.gpu
            .queue()
            .write_buffer(&linked.uniform_buffer, 0, &linked.uniform_data);

        let key = PipelineKey {
            program: program_id,
            topology,
            attributes,
        };
        let pipeline = match self.pipelines.get(&key) {
            Some(pipeline) => pipeline.clone(),
            None => {
                let pipeline = self.create_pipeline(linked, &key);
                self.pipelines.insert(key, pipeline.clone());
                pipeline
            }
        };

        self.frame.draws.push(RecordedDraw {
            pipeline,
            vertex_buffers,
            uniform_group: linked.uniform_group.clone(),
            texture_group,
            vertices: first..first + count,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<(), GfxError> {
        let record = std::mem::take(&mut self.frame);

        let mut frame = match self.gpu.begin_frame() {
            Ok(frame) => frame,
            Err(err) => {
                let details = err.to_string();
                return match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => Err(GfxError::Surface { details }),
                    action => {
                        log::debug!("frame dropped ({action:?}): {details}");
                        Ok(())
                    }
                };
            }
        };

        {
            let load = record
                .clear
                .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);
            let mut rpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("marcher frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in &record.draws {
                rpass.set_pipeline(&draw.pipeline);
                rpass.set_bind_group(0, &draw.uniform_group, &[]);
                if let Some(group) = &draw.texture_group {
                    rpass.set_bind_group(1, group, &[]);
                }
                for (index, buffer) in draw.vertex_buffers.iter().enumerate() {
                    rpass.set_vertex_buffer(index as u32, buffer.slice(..));
                }
                rpass.draw(draw.vertices.clone(), 0..1);
            }
        }

        self.gpu.present(frame);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(PhysicalSize::new(width, height));
    }
}

impl Drop for WgpuDevice {
    fn drop(&mut self) {
        let leaked = self.buffers.len()
            + self.arrays.len()
            + self.shaders.len()
            + self.programs.len()
            + self.textures.len();
        if leaked > 0 {
            log::warn!("graphics device dropped with {leaked} live objects");
        }
    }
}

/// Maps a client vertex format onto what a vertex stage can fetch.
fn vertex_format(format: VertexFormat, f64_attributes: bool) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    let mapped = match (format.scalar, format.components) {
        (ScalarType::Byte, 2) => F::Sint8x2,
        (ScalarType::Byte, 4) => F::Sint8x4,
        (ScalarType::Int, 1) => F::Sint32,
        (ScalarType::Int, 2) => F::Sint32x2,
        (ScalarType::Int, 3) => F::Sint32x3,
        (ScalarType::Int, 4) => F::Sint32x4,
        (ScalarType::Float, 1) => F::Float32,
        (ScalarType::Float, 2) => F::Float32x2,
        (ScalarType::Float, 3) => F::Float32x3,
        (ScalarType::Float, 4) => F::Float32x4,
        (ScalarType::Double, n) if f64_attributes => match n {
            1 => F::Float64,
            2 => F::Float64x2,
            3 => F::Float64x3,
            4 => F::Float64x4,
            _ => return None,
        },
        _ => return None,
    };
    Some(mapped)
}

/// Whether a vertex input of `kind` can read attributes stored as `format`.
fn feeds(kind: InputKind, format: wgpu::VertexFormat) -> bool {
    use wgpu::VertexFormat as F;
    match kind {
        InputKind::Float => matches!(
            format,
            F::Float32 | F::Float32x2 | F::Float32x3 | F::Float32x4
        ),
        InputKind::Double => matches!(
            format,
            F::Float64 | F::Float64x2 | F::Float64x3 | F::Float64x4
        ),
        InputKind::Sint => matches!(
            format,
            F::Sint8x2 | F::Sint8x4 | F::Sint32 | F::Sint32x2 | F::Sint32x3 | F::Sint32x4
        ),
        InputKind::Uint => false,
    }
}

fn address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::Repeat => wgpu::AddressMode::Repeat,
        Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

/// Builds `levels` RGBA8 images, level 0 being `rgba` itself.
fn mip_chain(
    width: u32,
    height: u32,
    rgba: &[u8],
    levels: u32,
) -> Result<Vec<(u32, u32, Vec<u8>)>, GfxError> {
    let base = image::RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or(
        GfxError::PayloadLength {
            expected: width as usize * height as usize * 4,
            actual: rgba.len(),
        },
    )?;

    let mut chain = Vec::with_capacity(levels as usize);
    chain.push((width, height, rgba.to_vec()));
    for level in 1..levels {
        let w = (width >> level).max(1);
        let h = (height >> level).max(1);
        let scaled = image::imageops::resize(&base, w, h, FilterType::Triangle);
        chain.push((w, h, scaled.into_raw()));
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_and_int_formats_map_for_every_arity() {
        for n in 2..=4 {
            assert!(vertex_format(VertexFormat::new(ScalarType::Float, n), false).is_some());
            assert!(vertex_format(VertexFormat::new(ScalarType::Int, n), false).is_some());
        }
    }

    #[test]
    fn byte_triples_and_doubles_without_the_feature_are_rejected() {
        assert_eq!(vertex_format(VertexFormat::new(ScalarType::Byte, 3), true), None);
        assert_eq!(vertex_format(VertexFormat::new(ScalarType::Double, 3), false), None);
        assert_eq!(
            vertex_format(VertexFormat::new(ScalarType::Double, 3), true),
            Some(wgpu::VertexFormat::Float64x3)
        );
    }

    #[test]
    fn input_kinds_only_accept_matching_scalars() {
        assert!(feeds(InputKind::Float, wgpu::VertexFormat::Float32x4));
        assert!(!feeds(InputKind::Float, wgpu::VertexFormat::Sint32x4));
        assert!(feeds(InputKind::Sint, wgpu::VertexFormat::Sint8x2));
        assert!(!feeds(InputKind::Double, wgpu::VertexFormat::Float32));
        assert!(!feeds(InputKind::Uint, wgpu::VertexFormat::Sint32));
    }

    #[test]
    fn mip_chain_halves_down_to_one_texel() {
        let rgba = vec![255u8; 8 * 4 * 4];
        let chain = mip_chain(8, 4, &rgba, mip_level_count(8, 4)).unwrap();

        let sizes: Vec<(u32, u32)> = chain.iter().map(|(w, h, _)| (*w, *h)).collect();
        assert_eq!(sizes, vec![(8, 4), (4, 2), (2, 1), (1, 1)]);
        for (w, h, texels) in &chain {
            assert_eq!(texels.len(), (*w * *h * 4) as usize);
        }
    }

    #[test]
    fn mip_chain_rejects_short_payloads() {
        assert!(mip_chain(4, 4, &[0u8; 12], 3).is_err());
    }
}
