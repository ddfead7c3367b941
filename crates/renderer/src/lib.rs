//! Full-screen fragment effect renderer.
//!
//! An [`Effect`] owns one linked shader program, a static quad and four
//! texture slots, and draws through a [`RenderBackend`]:
//!
//! ```text
//!   preset source ──▶ compile (wrap + naga validate) ──▶ backend.link_program
//!   texture path  ──▶ TextureLoader (worker thread) ──channel──▶ draw() ──▶ backend.create_texture
//!   draw(time, mouse) ──▶ DrawCall { viewport, uniforms, samplers } ──▶ backend.draw
//! ```
//!
//! [`WgpuBackend`] renders to a `winit` window. With the `test-support`
//! feature, `RecordingBackend` records calls instead.

mod backend;
pub mod compile;
mod effect;
mod error;
mod gpu;
pub mod textures;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod recording;

pub use backend::{DrawCall, RenderBackend};
pub use compile::{CompiledStage, UniformSet, DEFAULT_FRAGMENT_SHADER};
pub use effect::Effect;
pub use error::EffectError;
pub use gpu::{GpuProgram, GpuTexture, WgpuBackend};
pub use wgpu::SurfaceError;
pub use textures::{LoadStrategy, TextureSource};
pub use types::{
    Point2, SamplerBinding, Stage, UniformValues, Viewport, QUAD_VERTEX_COUNT, QUAD_VERTICES,
    SAMPLER_COUNT, SLOT_COUNT,
};
