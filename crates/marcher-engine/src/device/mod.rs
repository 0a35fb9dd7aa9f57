//! wgpu context: instance, adapter, device, queue and the window surface.
//!
//! This is the "rendering context" half of the display bootstrap. The
//! graphics-device service in [`crate::gfx`] records work against it and uses
//! it to acquire and present frames.

mod error;
mod frame;
mod gpu;
mod init;

pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use gpu::Gpu;
pub use init::GpuInit;
