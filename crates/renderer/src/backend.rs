use crate::compile::CompiledStage;
use crate::textures::DecodedImage;
use crate::types::{SamplerBinding, UniformValues, Viewport, SAMPLER_COUNT};

/// Graphics context an [`crate::Effect`] drives.
///
/// Handles are owned values; the effect hands each one back through the
/// matching `release_*` call exactly once.
pub trait RenderBackend {
    type Program;
    type Texture;
    type VertexBuffer;
    type FrameError: std::error::Error + Send + Sync + 'static;

    fn create_vertex_buffer(&mut self, vertices: &[[f32; 2]]) -> Self::VertexBuffer;

    /// Links a validated vertex/fragment pair. The returned string is the
    /// backend's link log.
    fn link_program(
        &mut self,
        vertex: &CompiledStage,
        fragment: &CompiledStage,
    ) -> Result<Self::Program, String>;

    fn release_program(&mut self, program: Self::Program);

    /// Uploads a decoded image with its mip chain. Sampling uses linear
    /// filtering and repeat wrapping on both axes.
    fn create_texture(&mut self, image: &DecodedImage, label: &str)
        -> Result<Self::Texture, String>;

    fn release_texture(&mut self, texture: Self::Texture);

    fn draw(&mut self, call: DrawCall<'_, Self>) -> Result<(), Self::FrameError>;
}

/// Everything a backend needs to rasterise one frame of the quad.
pub struct DrawCall<'a, B: RenderBackend + ?Sized> {
    pub viewport: Viewport,
    pub program: &'a B::Program,
    pub vertex_buffer: &'a B::VertexBuffer,
    pub uniforms: UniformValues,
    pub samplers: [SamplerBinding<'a, B::Texture>; SAMPLER_COUNT],
    pub vertex_count: u32,
}
