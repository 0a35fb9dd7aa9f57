use std::path::Path;

use crate::gfx::{GfxError, GraphicsDevice, ShaderId, ShaderStage};

/// One compiled stage.
#[derive(Debug)]
pub struct ShaderUnit {
    id: ShaderId,
    stage: ShaderStage,
    label: String,
    alive: bool,
}

impl ShaderUnit {
    pub fn compile<D>(
        device: &mut D,
        stage: ShaderStage,
        label: &str,
        source: &str,
    ) -> Result<Self, GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let id = device.create_shader(stage, label, source)?;
        Ok(Self {
            id,
            stage,
            label: label.to_string(),
            alive: true,
        })
    }

    /// Reads WGSL source from `path` and compiles it. The file name is the label.
    pub fn from_file<D>(device: &mut D, stage: ShaderStage, path: &Path) -> Result<Self, GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let source = std::fs::read_to_string(path).map_err(|source| GfxError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::compile(device, stage, &label, &source)
    }

    pub fn destroy<D>(&mut self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        if std::mem::take(&mut self.alive) {
            device.delete_shader(self.id);
            log::debug!("deleted {} shader '{}'", self.stage, self.label);
        }
    }

    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for ShaderUnit {
    fn drop(&mut self) {
        if self.alive {
            log::warn!("{} shader '{}' dropped without destroy", self.stage, self.label);
        }
    }
}
