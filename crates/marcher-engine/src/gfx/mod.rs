//! Graphics-device service.
//!
//! [`GraphicsDevice`] is the seam between the resource handles and the GPU:
//! a small immediate-mode API of opaque ids and bind/draw calls.
//! [`WgpuDevice`] implements it on top of [`crate::device::Gpu`].

mod device;
mod error;
pub mod reflect;
mod types;
mod wgpu_backend;

#[cfg(test)]
pub(crate) mod recording;

pub use device::GraphicsDevice;
pub use error::GfxError;
pub use reflect::ShaderReflection;
pub use types::{
    BufferId, Filter, ProgramId, SamplerParams, ScalarType, ShaderId, ShaderStage, TextureDesc,
    TextureId, Topology, UniformKind, UniformLocation, UniformValue, VertexArrayId, VertexData,
    VertexFormat, Wrap, mip_level_count,
};
pub use wgpu_backend::WgpuDevice;
