//! WGSL front-end: parses and validates a shader stage with naga and extracts
//! what the device needs to emulate attribute binding and uniform locations.
//!
//! Conventions understood here:
//! - vertex inputs are `@location(n)` arguments (or struct members) of the
//!   `@vertex` entry point; their argument/member names are the attribute names;
//! - uniforms live in one block at `@group(0) @binding(0)`; member names are
//!   the uniform names;
//! - texture unit `n` is `@group(1) @binding(2n)` (texture) plus
//!   `@group(1) @binding(2n + 1)` (sampler).

use wgpu::naga;

use super::error::GfxError;
use super::types::{ShaderStage, UniformKind};

/// Scalar family of a vertex input.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InputKind {
    Float,
    /// 64-bit float; only fed by double-precision attributes.
    Double,
    Sint,
    Uint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
    pub kind: InputKind,
    pub components: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub kind: UniformKind,
}

/// Layout of the uniform block at `@group(0) @binding(0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformLayout {
    pub members: Vec<UniformMember>,
    pub size: u32,
}

impl UniformLayout {
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// Interface of one compiled stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderReflection {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub inputs: Vec<VertexInput>,
    pub uniforms: Option<UniformLayout>,
    pub texture_units: u32,
}

impl ShaderReflection {
    /// Parses and validates `source`, failing with [`GfxError::Compile`].
    pub fn parse(stage: ShaderStage, label: &str, source: &str) -> Result<Self, GfxError> {
        let compile_error = |details: String| GfxError::Compile {
            label: label.to_string(),
            stage,
            details,
        };

        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| compile_error(e.emit_to_string(source)))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| compile_error(e.as_inner().to_string()))?;

        let wanted = match stage {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        };
        let entry = module
            .entry_points
            .iter()
            .find(|ep| ep.stage == wanted)
            .ok_or_else(|| compile_error(format!("no @{stage} entry point")))?;

        let inputs = if stage == ShaderStage::Vertex {
            vertex_inputs(&module, entry).map_err(compile_error)?
        } else {
            Vec::new()
        };

        Ok(Self {
            stage,
            entry_point: entry.name.clone(),
            inputs,
            uniforms: uniform_block(&module).map_err(compile_error)?,
            texture_units: texture_units(&module),
        })
    }

    pub fn input(&self, name: &str) -> Option<&VertexInput> {
        self.inputs.iter().find(|i| i.name == name)
    }
}

fn vertex_inputs(
    module: &naga::Module,
    entry: &naga::EntryPoint,
) -> Result<Vec<VertexInput>, String> {
    let mut inputs = Vec::new();

    for arg in &entry.function.arguments {
        match (&arg.binding, &module.types[arg.ty].inner) {
            (Some(binding), inner) => {
                if let Some(input) = located_input(arg.name.as_deref(), binding, inner)? {
                    inputs.push(input);
                }
            }
            (None, naga::TypeInner::Struct { members, .. }) => {
                for member in members {
                    let Some(binding) = &member.binding else { continue };
                    let inner = &module.types[member.ty].inner;
                    if let Some(input) = located_input(member.name.as_deref(), binding, inner)? {
                        inputs.push(input);
                    }
                }
            }
            (None, _) => {}
        }
    }

    inputs.sort_by_key(|i| i.location);
    Ok(inputs)
}

fn located_input(
    name: Option<&str>,
    binding: &naga::Binding,
    inner: &naga::TypeInner,
) -> Result<Option<VertexInput>, String> {
    let naga::Binding::Location { location, .. } = binding else {
        // Built-ins such as vertex_index are not attribute streams.
        return Ok(None);
    };

    let (scalar, components) = match inner {
        naga::TypeInner::Scalar(scalar) => (*scalar, 1),
        naga::TypeInner::Vector { size, scalar } => (*scalar, *size as u32),
        other => return Err(format!("unsupported vertex input type {other:?}")),
    };

    let kind = match scalar.kind {
        naga::ScalarKind::Float if scalar.width == 8 => InputKind::Double,
        naga::ScalarKind::Float => InputKind::Float,
        naga::ScalarKind::Sint => InputKind::Sint,
        naga::ScalarKind::Uint => InputKind::Uint,
        other => return Err(format!("unsupported vertex input scalar {other:?}")),
    };

    Ok(Some(VertexInput {
        name: name.unwrap_or_default().to_string(),
        location: *location,
        kind,
        components,
    }))
}

fn uniform_block(module: &naga::Module) -> Result<Option<UniformLayout>, String> {
    let block = module.global_variables.iter().find(|(_, var)| {
        var.space == naga::AddressSpace::Uniform
            && var.binding == Some(naga::ResourceBinding { group: 0, binding: 0 })
    });
    let Some((_, var)) = block else {
        return Ok(None);
    };

    let members = match &module.types[var.ty].inner {
        naga::TypeInner::Struct { members, span } => {
            let members = members
                .iter()
                .map(|m| {
                    Ok(UniformMember {
                        name: m.name.clone().unwrap_or_default(),
                        offset: m.offset,
                        kind: uniform_kind(&module.types[m.ty].inner)?,
                    })
                })
                .collect::<Result<Vec<_>, String>>()?;
            return Ok(Some(UniformLayout { members, size: *span }));
        }
        inner => vec![UniformMember {
            name: var.name.clone().unwrap_or_default(),
            offset: 0,
            kind: uniform_kind(inner)?,
        }],
    };

    let size = members[0].kind.size().next_multiple_of(16);
    Ok(Some(UniformLayout { members, size }))
}

fn uniform_kind(inner: &naga::TypeInner) -> Result<UniformKind, String> {
    let f32_scalar = naga::Scalar::F32;
    match inner {
        naga::TypeInner::Scalar(s) if *s == f32_scalar => Ok(UniformKind::Float),
        naga::TypeInner::Vector { size, scalar } if *scalar == f32_scalar => Ok(match size {
            naga::VectorSize::Bi => UniformKind::Vec2,
            naga::VectorSize::Tri => UniformKind::Vec3,
            naga::VectorSize::Quad => UniformKind::Vec4,
        }),
        other => Err(format!("unsupported uniform type {other:?}")),
    }
}

fn texture_units(module: &naga::Module) -> u32 {
    module
        .global_variables
        .iter()
        .filter(|(_, var)| {
            matches!(var.binding, Some(naga::ResourceBinding { group: 1, .. }))
                && matches!(module.types[var.ty].inner, naga::TypeInner::Image { .. })
        })
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
struct Params {
    screen_Width: f32,
    screen_Height: f32,
    camera_Position: vec3<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) corner: vec3<f32>,
};

@vertex
fn vs_main(
    @location(0) vertex_Position: vec4<f32>,
    @location(1) screen_Position: vec3<f32>,
) -> VsOut {
    var out: VsOut;
    out.clip = vertex_Position;
    out.corner = screen_Position * vec3<f32>(params.screen_Width / params.screen_Height, 1.0, 1.0);
    return out;
}
"#;

    const FRAGMENT: &str = r#"
@group(1) @binding(0) var tex: texture_2d<f32>;
@group(1) @binding(1) var samp: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(tex, samp, uv);
}
"#;

    #[test]
    fn vertex_inputs_follow_locations() {
        let r = ShaderReflection::parse(ShaderStage::Vertex, "vs", VERTEX).unwrap();
        assert_eq!(r.entry_point, "vs_main");
        assert_eq!(r.inputs.len(), 2);
        assert_eq!(r.input("vertex_Position").unwrap().location, 0);
        assert_eq!(r.input("vertex_Position").unwrap().components, 4);
        assert_eq!(r.input("screen_Position").unwrap().location, 1);
        assert_eq!(r.input("screen_Position").unwrap().kind, InputKind::Float);
    }

    #[test]
    fn uniform_block_members_carry_offsets() {
        let r = ShaderReflection::parse(ShaderStage::Vertex, "vs", VERTEX).unwrap();
        let block = r.uniforms.unwrap();
        assert_eq!(block.index_of("screen_Width"), Some(0));
        assert_eq!(block.members[1].offset, 4);
        // vec3 aligns to 16 bytes.
        assert_eq!(block.members[2].offset, 16);
        assert_eq!(block.members[2].kind, UniformKind::Vec3);
        assert_eq!(block.size, 32);
    }

    #[test]
    fn fragment_textures_are_counted_per_unit() {
        let r = ShaderReflection::parse(ShaderStage::Fragment, "fs", FRAGMENT).unwrap();
        assert_eq!(r.texture_units, 1);
        assert!(r.inputs.is_empty());
        assert!(r.uniforms.is_none());
    }

    #[test]
    fn syntax_errors_are_compile_errors() {
        let err = ShaderReflection::parse(ShaderStage::Vertex, "broken", "fn nope( {").unwrap_err();
        assert!(matches!(err, GfxError::Compile { ref label, .. } if label == "broken"));
    }

    #[test]
    fn missing_entry_point_for_stage_is_rejected() {
        let err = ShaderReflection::parse(ShaderStage::Vertex, "fs-only", FRAGMENT).unwrap_err();
        assert!(err.to_string().contains("no @vertex entry point"));
    }
}
