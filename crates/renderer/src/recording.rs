//! Backend that records what an `Effect` asks of it instead of touching a GPU.

use std::collections::BTreeSet;
use std::convert::Infallible;

use crate::backend::{DrawCall, RenderBackend};
use crate::compile::{CompiledStage, UniformSet};
use crate::textures::DecodedImage;
use crate::types::{SamplerBinding, UniformValues, Viewport, SAMPLER_COUNT};

#[derive(Debug)]
pub struct RecordedProgram {
    pub id: u64,
    pub uniforms: UniformSet,
}

#[derive(Debug)]
pub struct RecordedTexture {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
}

#[derive(Debug)]
pub struct RecordedVertexBuffer {
    pub vertices: Vec<[f32; 2]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordedSampler {
    Unused,
    Empty,
    Texture(u64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub viewport: Viewport,
    pub program: u64,
    pub vertex_count: u32,
    pub uniforms: UniformValues,
    pub samplers: [RecordedSampler; SAMPLER_COUNT],
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: u64,
    live_programs: BTreeSet<u64>,
    live_textures: BTreeSet<u64>,
    draws: Vec<RecordedDraw>,
    fail_next_link: Option<String>,
    fail_texture_uploads: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `link_program` call fail with `log`.
    pub fn fail_next_link(&mut self, log: impl Into<String>) {
        self.fail_next_link = Some(log.into());
    }

    pub fn set_fail_texture_uploads(&mut self, fail: bool) {
        self.fail_texture_uploads = fail;
    }

    pub fn live_programs(&self) -> usize {
        self.live_programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures.len()
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn last_draw(&self) -> Option<&RecordedDraw> {
        self.draws.last()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderBackend for RecordingBackend {
    type Program = RecordedProgram;
    type Texture = RecordedTexture;
    type VertexBuffer = RecordedVertexBuffer;
    type FrameError = Infallible;

    fn create_vertex_buffer(&mut self, vertices: &[[f32; 2]]) -> RecordedVertexBuffer {
        RecordedVertexBuffer {
            vertices: vertices.to_vec(),
        }
    }

    fn link_program(
        &mut self,
        _vertex: &CompiledStage,
        fragment: &CompiledStage,
    ) -> Result<RecordedProgram, String> {
        if let Some(log) = self.fail_next_link.take() {
            return Err(log);
        }
        let id = self.next_id();
        self.live_programs.insert(id);
        Ok(RecordedProgram {
            id,
            uniforms: fragment.uniforms,
        })
    }

    fn release_program(&mut self, program: RecordedProgram) {
        assert!(
            self.live_programs.remove(&program.id),
            "program {} released twice",
            program.id
        );
    }

    fn create_texture(
        &mut self,
        image: &DecodedImage,
        _label: &str,
    ) -> Result<RecordedTexture, String> {
        if self.fail_texture_uploads {
            return Err("texture uploads disabled".to_string());
        }
        let id = self.next_id();
        self.live_textures.insert(id);
        Ok(RecordedTexture {
            id,
            width: image.width(),
            height: image.height(),
            mip_levels: image.mip_level_count(),
        })
    }

    fn release_texture(&mut self, texture: RecordedTexture) {
        assert!(
            self.live_textures.remove(&texture.id),
            "texture {} released twice",
            texture.id
        );
    }

    fn draw(&mut self, call: DrawCall<'_, Self>) -> Result<(), Infallible> {
        let samplers = call.samplers.map(|binding| match binding {
            SamplerBinding::Unused => RecordedSampler::Unused,
            SamplerBinding::Empty => RecordedSampler::Empty,
            SamplerBinding::Bound(texture) => RecordedSampler::Texture(texture.id),
        });
        self.draws.push(RecordedDraw {
            viewport: call.viewport,
            program: call.program.id,
            vertex_count: call.vertex_count,
            uniforms: call.uniforms,
            samplers,
        });
        Ok(())
    }
}
