//! Owning handles over graphics-device objects.
//!
//! Ownership is a tree: a [`VertexArray`] owns its [`VertexBuffer`]s, a
//! [`ShaderProgram`] owns its [`ShaderUnit`]s. Every handle is released
//! explicitly with `destroy(device)` against the device that created it;
//! `destroy` is a no-op the second time, and dropping a live handle logs a
//! leak instead of touching the device.

mod buffer;
mod program;
mod shader;
mod texture;
mod vertex_array;

pub use buffer::{Semantic, VertexBuffer};
pub use program::ShaderProgram;
pub use shader::ShaderUnit;
pub use texture::{Texture, TEXTURE_SAMPLER};
pub use vertex_array::VertexArray;
