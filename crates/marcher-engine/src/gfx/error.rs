use std::fmt;
use std::io;
use std::path::PathBuf;

use super::types::{ShaderStage, UniformKind, VertexFormat};

/// Error raised by a graphics-device call or a resource constructor.
#[derive(Debug)]
pub enum GfxError {
    /// Vertex arity outside `2..=4`.
    InvalidArity { arity: u32 },
    /// Payload length does not equal `arity * vertex_count`.
    PayloadLength { expected: usize, actual: usize },
    /// The device cannot feed this format to a vertex stage.
    UnsupportedFormat { format: VertexFormat },
    /// A source or image file could not be read.
    Load { path: PathBuf, source: io::Error },
    /// An image file could not be decoded.
    Decode { path: PathBuf, details: String },
    /// A shader unit failed to compile.
    Compile { label: String, stage: ShaderStage, details: String },
    /// A program failed to link.
    Link { label: String, details: String },
    /// A linked program cannot run in the current state.
    Validate { label: String, details: String },
    /// A handle that the device does not know (never created or already deleted).
    InvalidHandle { kind: &'static str, id: u32 },
    /// A call needs an object bound that is not.
    NothingBound { what: &'static str },
    /// A uniform was set with a value of the wrong shape.
    UniformType { expected: UniformKind, actual: UniformKind },
    /// The presentation surface is gone for good.
    Surface { details: String },
}

impl fmt::Display for GfxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GfxError::InvalidArity { arity } => {
                write!(f, "vertex arity must be 2, 3 or 4 (got {arity})")
            }
            GfxError::PayloadLength { expected, actual } => write!(
                f,
                "vertex payload holds {actual} scalars, expected {expected}"
            ),
            GfxError::UnsupportedFormat { format } => {
                write!(f, "vertex format {format} is not supported by this device")
            }
            GfxError::Load { path, source } => {
                write!(f, "failed to read '{}': {source}", path.display())
            }
            GfxError::Decode { path, details } => {
                write!(f, "failed to decode image '{}': {details}", path.display())
            }
            GfxError::Compile { label, stage, details } => {
                write!(f, "{stage} shader '{label}' failed to compile: {details}")
            }
            GfxError::Link { label, details } => {
                write!(f, "program '{label}' failed to link: {details}")
            }
            GfxError::Validate { label, details } => {
                write!(f, "program '{label}' failed validation: {details}")
            }
            GfxError::InvalidHandle { kind, id } => write!(f, "unknown {kind} handle #{id}"),
            GfxError::NothingBound { what } => write!(f, "no {what} is bound"),
            GfxError::UniformType { expected, actual } => {
                write!(f, "uniform expects {expected:?}, got {actual:?}")
            }
            GfxError::Surface { details } => write!(f, "surface error: {details}"),
        }
    }
}

impl std::error::Error for GfxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GfxError::Load { source, .. } => Some(source),
            _ => None,
        }
    }
}
