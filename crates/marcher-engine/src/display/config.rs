use std::path::{Path, PathBuf};

use crate::camera::CameraConfig;
use crate::coords::ColorRgba;
use crate::device::GpuInit;
use crate::window::WindowConfig;

/// Everything `Display::open` needs.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub window: WindowConfig,
    pub gpu: GpuInit,

    /// Directory holding the WGSL stages.
    pub shader_dir: PathBuf,
    pub vertex_shader: String,
    pub fragment_shader: String,

    /// Directory holding texture images.
    pub texture_dir: PathBuf,
    /// File names under `texture_dir`; entry `i` is bound to texture unit `i`.
    pub textures: Vec<String>,

    pub clear_color: ColorRgba,
    pub camera: CameraConfig,
}

impl DisplayConfig {
    pub fn vertex_shader_path(&self) -> PathBuf {
        self.shader_dir.join(&self.vertex_shader)
    }

    pub fn fragment_shader_path(&self) -> PathBuf {
        self.shader_dir.join(&self.fragment_shader)
    }

    pub fn texture_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.textures
            .iter()
            .map(|name| self.texture_dir.join(Path::new(name)))
    }

    /// Anchors relative shader and texture directories at `root`.
    /// Absolute directories are kept as they are.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.shader_dir = root.join(&self.shader_dir);
        self.texture_dir = root.join(&self.texture_dir);
        self
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            gpu: GpuInit::default(),
            shader_dir: PathBuf::from("shaders"),
            vertex_shader: "vertex.wgsl".to_string(),
            fragment_shader: "fragment.wgsl".to_string(),
            texture_dir: PathBuf::from("res"),
            textures: Vec::new(),
            clear_color: ColorRgba::transparent(),
            camera: CameraConfig::default(),
        }
    }
}
