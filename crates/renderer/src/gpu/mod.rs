//! `wgpu` implementation of [`crate::RenderBackend`].
//!
//! - `context` owns instance/device/surface wiring and reconfigures the
//!   swapchain when the drawable size changes.
//! - `pipeline` links validated GLSL stages into render pipelines against a
//!   fixed two-group layout (uniform block, sampler pairs).
//! - `textures` uploads decoded mip chains and provides the placeholder bound
//!   to empty slots.
//! - `uniforms` mirrors the injected uniform block.
//! - `backend` ties these together and encodes one pass per frame.

mod backend;
mod context;
mod pipeline;
mod textures;
mod uniforms;

pub use backend::{GpuProgram, WgpuBackend};
pub use textures::GpuTexture;
