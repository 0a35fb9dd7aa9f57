use std::path::Path;

use crate::gfx::{
    Filter, GfxError, GraphicsDevice, SamplerParams, TextureDesc, TextureId, Wrap,
};

/// Sampling used for every texture: repeat on both axes, blocky when
/// magnified, smooth with trilinear mip blending when minified.
pub const TEXTURE_SAMPLER: SamplerParams = SamplerParams {
    wrap: Wrap::Repeat,
    mag_filter: Filter::Nearest,
    min_filter: Filter::Linear,
    mipmap: Some(Filter::Linear),
};

/// Immutable 2D RGBA texture with a full mip chain.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    label: String,
    width: u32,
    height: u32,
    alive: bool,
}

impl Texture {
    /// Decodes the image at `path` to RGBA8 and uploads it.
    pub fn from_file<D>(device: &mut D, path: &Path) -> Result<Self, GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let image = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(source) => GfxError::Load {
                path: path.to_path_buf(),
                source,
            },
            other => GfxError::Decode {
                path: path.to_path_buf(),
                details: other.to_string(),
            },
        })?;
        let rgba = image.to_rgba8();
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self::from_rgba(device, &label, rgba.width(), rgba.height(), rgba.as_raw())
    }

    /// Uploads tightly packed RGBA8 `pixels`.
    pub fn from_rgba<D>(
        device: &mut D,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self, GfxError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let desc = TextureDesc {
            label,
            width,
            height,
            sampler: TEXTURE_SAMPLER,
        };
        let id = device.create_texture(&desc, pixels)?;
        log::debug!("created texture '{label}' #{} ({width}x{height})", id.raw());

        Ok(Self {
            id,
            label: label.to_string(),
            width,
            height,
            alive: true,
        })
    }

    /// Binds to texture unit `unit`.
    pub fn bind<D>(&self, device: &mut D, unit: u32)
    where
        D: GraphicsDevice + ?Sized,
    {
        device.bind_texture(unit, Some(self.id));
    }

    pub fn destroy<D>(&mut self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        if std::mem::take(&mut self.alive) {
            device.delete_texture(self.id);
            log::debug!("deleted texture '{}'", self.label);
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if self.alive {
            log::warn!("texture '{}' dropped without destroy", self.label);
        }
    }
}
