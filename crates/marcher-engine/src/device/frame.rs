/// One acquired swapchain image plus the encoder recording into it.
///
/// Must be handed back to [`Gpu::present`](super::Gpu::present) promptly; holding
/// it blocks acquisition of the next image.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}
