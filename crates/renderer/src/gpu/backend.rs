use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::backend::{DrawCall, RenderBackend};
use crate::compile::CompiledStage;
use crate::textures::DecodedImage;
use crate::types::{SamplerBinding, SAMPLER_COUNT};

use super::context::GpuContext;
use super::pipeline::{self, PipelineLayouts};
use super::textures::{self, GpuTexture};
use super::uniforms::EffectUniforms;

pub struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
}

/// Texture ids bound to each sampler unit; `0` is the placeholder.
type SamplerKey = [u64; SAMPLER_COUNT];

struct SamplerBindGroup {
    key: SamplerKey,
    bind_group: wgpu::BindGroup,
}

/// [`RenderBackend`] that presents to a window through `wgpu`.
pub struct WgpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    uniforms: EffectUniforms,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    placeholder: GpuTexture,
    sampler_bind_group: Option<SamplerBindGroup>,
    next_texture_id: u64,
    stats: FrameStats,
    // Declared last so the surface is dropped before the window it was created from.
    window: Arc<Window>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let context = GpuContext::new(window.as_ref(), window.inner_size())?;
        let layouts = PipelineLayouts::new(&context.device);

        let uniforms = EffectUniforms::default();
        let uniform_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("effect uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("effect uniform bind group"),
                layout: &layouts.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });
        let sampler = textures::create_sampler(&context.device);
        let placeholder = textures::create_placeholder(&context.device, &context.queue);

        Ok(Self {
            context,
            layouts,
            uniforms,
            uniform_buffer,
            uniform_bind_group,
            sampler,
            placeholder,
            sampler_bind_group: None,
            next_texture_id: 0,
            stats: FrameStats::new(),
            window,
        })
    }

    pub fn surface_size(&self) -> PhysicalSize<u32> {
        self.context.size()
    }

    /// Recovers from `SurfaceError::Lost` / `SurfaceError::Outdated`.
    pub fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    /// Rebuilds the group 1 bind group when the bound textures changed.
    fn refresh_sampler_bind_group(
        &mut self,
        samplers: [SamplerBinding<'_, GpuTexture>; SAMPLER_COUNT],
    ) {
        let bound = samplers.map(|binding| match binding {
            SamplerBinding::Bound(texture) => Some(texture),
            SamplerBinding::Unused | SamplerBinding::Empty => None,
        });
        let key = bound.map(|texture| texture.map_or(self.placeholder.id, |texture| texture.id));
        if self
            .sampler_bind_group
            .as_ref()
            .is_some_and(|cached| cached.key == key)
        {
            return;
        }

        let placeholder = &self.placeholder;
        let views = bound.map(|texture| &texture.unwrap_or(placeholder).view);
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("effect sampler bind group"),
                layout: &self.layouts.sampler_layout,
                entries: &pipeline::build_sampler_entries(
                    views,
                    &placeholder.view,
                    &self.sampler,
                ),
            });
        self.sampler_bind_group = Some(SamplerBindGroup { key, bind_group });
    }
}

impl RenderBackend for WgpuBackend {
    type Program = GpuProgram;
    type Texture = GpuTexture;
    type VertexBuffer = wgpu::Buffer;
    type FrameError = wgpu::SurfaceError;

    fn create_vertex_buffer(&mut self, vertices: &[[f32; 2]]) -> wgpu::Buffer {
        self.context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("effect quad"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
    }

    fn link_program(
        &mut self,
        vertex: &CompiledStage,
        fragment: &CompiledStage,
    ) -> Result<GpuProgram, String> {
        let started = Instant::now();
        let pipeline = pipeline::link(
            &self.context.device,
            &self.layouts,
            self.context.surface_format,
            vertex,
            fragment,
        )?;
        tracing::debug!(elapsed = ?started.elapsed(), "linked effect pipeline");
        Ok(GpuProgram { pipeline })
    }

    fn release_program(&mut self, program: GpuProgram) {
        drop(program);
    }

    fn create_texture(&mut self, image: &DecodedImage, label: &str) -> Result<GpuTexture, String> {
        self.next_texture_id += 1;
        textures::upload(
            &self.context.device,
            &self.context.queue,
            self.next_texture_id,
            image,
            label,
        )
    }

    fn release_texture(&mut self, texture: GpuTexture) {
        if self
            .sampler_bind_group
            .as_ref()
            .is_some_and(|cached| cached.key.contains(&texture.id))
        {
            self.sampler_bind_group = None;
        }
        drop(texture);
    }

    fn draw(&mut self, call: DrawCall<'_, Self>) -> Result<(), wgpu::SurfaceError> {
        let viewport = call.viewport;
        if viewport.width == 0 || viewport.height == 0 {
            return Ok(());
        }
        self.context.ensure_size(PhysicalSize::new(
            viewport.x + viewport.width,
            viewport.y + viewport.height,
        ));

        self.uniforms.apply(&call.uniforms);
        // The fragment footer flips `gl_FragCoord` with `_resolution` whether or not
        // the preset declared `resolution`.
        self.uniforms.resolution = [viewport.width as f32, viewport.height as f32];
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));
        self.refresh_sampler_bind_group(call.samplers);

        let frame = self.context.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("effect frame"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("effect pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(&call.program.pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            if let Some(cached) = &self.sampler_bind_group {
                render_pass.set_bind_group(1, &cached.bind_group, &[]);
            }
            render_pass.set_vertex_buffer(0, call.vertex_buffer.slice(..));
            render_pass.draw(0..call.vertex_count, 0..1);
        }
        self.context.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();

        self.stats.record(self.uniforms.time);
        Ok(())
    }
}

/// Frame counter that logs a summary once per second.
struct FrameStats {
    frames: u32,
    window_start: Instant,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            frames: 0,
            window_start: Instant::now(),
        }
    }

    fn record(&mut self, time: f32) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames as f32 / elapsed.as_secs_f32();
            tracing::debug!(fps = fps.round(), time, "render stats");
            self.frames = 0;
            self.window_start = Instant::now();
        }
    }
}
