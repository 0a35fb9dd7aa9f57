use std::fmt;

use crate::gfx::{BufferId, GfxError, GraphicsDevice, ScalarType, VertexData, VertexFormat};

/// What a vertex stream carries. Only `Position` streams trigger draws.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Semantic {
    Position,
    Color,
    Normal,
    TexCoord,
    Custom(String),
}

impl fmt::Display for Semantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Semantic::Position => f.write_str("position"),
            Semantic::Color => f.write_str("color"),
            Semantic::Normal => f.write_str("normal"),
            Semantic::TexCoord => f.write_str("texcoord"),
            Semantic::Custom(name) => f.write_str(name),
        }
    }
}

/// Immutable per-vertex data uploaded once to device memory.
#[derive(Debug)]
pub struct VertexBuffer {
    id: BufferId,
    format: VertexFormat,
    vertex_count: u32,
    semantic: Option<Semantic>,
    alive: bool,
}

impl VertexBuffer {
    /// Validates and uploads `vertex_count` vertices of `arity` components each.
    pub fn new<'a, D>(
        device: &mut D,
        semantic: Option<Semantic>,
        data: impl Into<VertexData<'a>>,
        arity: u32,
        vertex_count: u32,
    ) -> Result<Self, GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        if !(2..=4).contains(&arity) {
            return Err(GfxError::InvalidArity { arity });
        }

        let data = data.into();
        let expected = arity as usize * vertex_count as usize;
        if data.len() != expected {
            return Err(GfxError::PayloadLength {
                expected,
                actual: data.len(),
            });
        }

        let format = VertexFormat::new(data.scalar_type(), arity);
        let label = match &semantic {
            Some(semantic) => format!("{semantic} buffer"),
            None => "vertex buffer".to_string(),
        };
        let id = device.create_buffer(&label, data.as_bytes())?;
        log::debug!(
            "created {label} #{} ({vertex_count} x {format})",
            id.raw()
        );

        Ok(Self {
            id,
            format,
            vertex_count,
            semantic,
            alive: true,
        })
    }

    /// Feeds this buffer to `slot` of the currently bound vertex array.
    pub fn bind_to_slot<D>(&self, device: &mut D, slot: u32) -> Result<(), GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        if !self.alive {
            return Err(GfxError::InvalidHandle {
                kind: "buffer",
                id: self.id.raw(),
            });
        }
        device.vertex_attribute(slot, self.id, self.format)
    }

    pub fn destroy<D>(&mut self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        if std::mem::take(&mut self.alive) {
            device.delete_buffer(self.id);
            log::debug!("deleted buffer #{}", self.id.raw());
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn arity(&self) -> u32 {
        self.format.components
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.format.scalar
    }

    pub fn format(&self) -> VertexFormat {
        self.format
    }

    pub fn semantic(&self) -> Option<&Semantic> {
        self.semantic.as_ref()
    }

    pub fn is_position(&self) -> bool {
        self.semantic == Some(Semantic::Position)
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        if self.alive {
            log::warn!("buffer #{} dropped without destroy; device storage leaked", self.id.raw());
        }
    }
}
