//! Headless GPU device management.
//!
//! Creates the wgpu Instance/Adapter/Device/Queue the GPU driver runs on.

mod gpu;
mod init;

pub use gpu::Gpu;
pub use init::GpuInit;
