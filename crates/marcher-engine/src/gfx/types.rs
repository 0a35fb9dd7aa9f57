//! Handle and value types shared by every [`GraphicsDevice`](super::GraphicsDevice)
//! implementation.

use std::fmt;

macro_rules! device_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw device-side identifier.
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

device_id!(
    /// Opaque identifier of a device buffer.
    BufferId
);
device_id!(
    /// Opaque identifier of a vertex array object.
    VertexArrayId
);
device_id!(
    /// Opaque identifier of a compiled shader unit.
    ShaderId
);
device_id!(
    /// Opaque identifier of a shader program.
    ProgramId
);
device_id!(
    /// Opaque identifier of a 2D texture.
    TextureId
);

/// Location of a uniform inside the program it was queried from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformLocation(pub(crate) u32);

/// Scalar type of the elements stored in a vertex buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ScalarType {
    /// Signed 8-bit integer.
    Byte,
    /// Signed 32-bit integer.
    Int,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
}

impl ScalarType {
    /// Size of one scalar in bytes.
    #[inline]
    pub const fn size(self) -> u32 {
        match self {
            ScalarType::Byte => 1,
            ScalarType::Int => 4,
            ScalarType::Float => 4,
            ScalarType::Double => 8,
        }
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, ScalarType::Float | ScalarType::Double)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Byte => "i8",
            ScalarType::Int => "i32",
            ScalarType::Float => "f32",
            ScalarType::Double => "f64",
        };
        f.write_str(name)
    }
}

/// Per-vertex layout of one attribute stream: `components` scalars of `scalar`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexFormat {
    pub scalar: ScalarType,
    pub components: u32,
}

impl VertexFormat {
    #[inline]
    pub const fn new(scalar: ScalarType, components: u32) -> Self {
        Self { scalar, components }
    }

    /// Distance in bytes between two consecutive vertices (tightly packed).
    #[inline]
    pub const fn stride(self) -> u64 {
        (self.scalar.size() * self.components) as u64
    }
}

impl fmt::Display for VertexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.scalar, self.components)
    }
}

/// Client-side payload of a vertex buffer.
///
/// The variant is the scalar type tag, so a payload can never disagree with
/// the type it is uploaded as.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum VertexData<'a> {
    Byte(&'a [i8]),
    Int(&'a [i32]),
    Float(&'a [f32]),
    Double(&'a [f64]),
}

impl<'a> VertexData<'a> {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            VertexData::Byte(_) => ScalarType::Byte,
            VertexData::Int(_) => ScalarType::Int,
            VertexData::Float(_) => ScalarType::Float,
            VertexData::Double(_) => ScalarType::Double,
        }
    }

    /// Number of scalars (not bytes, not vertices).
    pub fn len(&self) -> usize {
        match self {
            VertexData::Byte(d) => d.len(),
            VertexData::Int(d) => d.len(),
            VertexData::Float(d) => d.len(),
            VertexData::Double(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native-endian byte view of the payload.
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            VertexData::Byte(d) => bytemuck::cast_slice(d),
            VertexData::Int(d) => bytemuck::cast_slice(d),
            VertexData::Float(d) => bytemuck::cast_slice(d),
            VertexData::Double(d) => bytemuck::cast_slice(d),
        }
    }
}

macro_rules! vertex_data_from {
    ($t:ty, $variant:ident) => {
        impl<'a> From<&'a [$t]> for VertexData<'a> {
            fn from(data: &'a [$t]) -> Self {
                VertexData::$variant(data)
            }
        }

        impl<'a, const N: usize> From<&'a [$t; N]> for VertexData<'a> {
            fn from(data: &'a [$t; N]) -> Self {
                VertexData::$variant(data.as_slice())
            }
        }
    };
}

vertex_data_from!(i8, Byte);
vertex_data_from!(i32, Int);
vertex_data_from!(f32, Float);
vertex_data_from!(f64, Double);

/// Programmable pipeline stage.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Primitive assembly mode of a draw call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    TriangleList,
    TriangleStrip,
}

/// Shape of a uniform value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    /// Size of the value in bytes (without trailing padding).
    #[inline]
    pub const fn size(self) -> u32 {
        match self {
            UniformKind::Float => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
        }
    }
}

/// A value passed to a program uniform.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v),
            UniformValue::Vec2(v) => bytemuck::cast_slice(v),
            UniformValue::Vec3(v) => bytemuck::cast_slice(v),
            UniformValue::Vec4(v) => bytemuck::cast_slice(v),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

/// Texture coordinate wrap mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Wrap {
    Repeat,
    ClampToEdge,
}

/// Texel filter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Fixed sampling state of a texture.
///
/// `mipmap: None` disables the mip chain entirely.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SamplerParams {
    pub wrap: Wrap,
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap: Option<Filter>,
}

/// Description of an RGBA8 2D texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub sampler: SamplerParams,
}

/// Number of levels in a full mip chain for a `width` x `height` image.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_data_tags_follow_the_slice_type() {
        assert_eq!(VertexData::from(&[1i8, 2]).scalar_type(), ScalarType::Byte);
        assert_eq!(VertexData::from(&[1i32, 2]).scalar_type(), ScalarType::Int);
        assert_eq!(VertexData::from(&[1.0f32]).scalar_type(), ScalarType::Float);
        assert_eq!(VertexData::from(&[1.0f64]).scalar_type(), ScalarType::Double);
    }

    #[test]
    fn vertex_data_byte_view_matches_scalar_size() {
        let floats = [0.0f32; 6];
        let doubles = [0.0f64; 6];
        assert_eq!(VertexData::from(&floats).as_bytes().len(), 24);
        assert_eq!(VertexData::from(&doubles).as_bytes().len(), 48);
    }

    #[test]
    fn stride_is_tightly_packed() {
        assert_eq!(VertexFormat::new(ScalarType::Float, 4).stride(), 16);
        assert_eq!(VertexFormat::new(ScalarType::Byte, 2).stride(), 2);
        assert_eq!(VertexFormat::new(ScalarType::Double, 3).stride(), 24);
    }

    #[test]
    fn mip_chain_lengths() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(300, 17), 9);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn uniform_values_report_their_kind() {
        assert_eq!(UniformValue::from(1.0).kind(), UniformKind::Float);
        assert_eq!(UniformValue::from([0.0; 3]).kind(), UniformKind::Vec3);
        assert_eq!(UniformValue::from([0.0; 3]).as_bytes().len(), 12);
    }
}
