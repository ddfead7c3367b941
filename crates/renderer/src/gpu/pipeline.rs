use std::borrow::Cow;

use crate::compile::{CompiledStage, UNBOUND_TEXTURE_BINDING};
use crate::types::SAMPLER_COUNT;

/// Bind group layouts shared by every linked program.
///
/// Group 0 holds the uniform block, group 1 a texture/sampler pair per
/// sampler unit plus one pair for the placeholder that `tex2`/`tex3` read.
/// Programs that skip a uniform or sampler still link against the full layout.
pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub sampler_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("effect uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let sampler_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("effect sampler layout"),
            entries: &build_sampler_layout_entries(),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("effect pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &sampler_layout],
            push_constant_ranges: &[],
        });

        Self {
            uniform_layout,
            sampler_layout,
            pipeline_layout,
        }
    }
}

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

/// Builds a render pipeline from a validated stage pair.
///
/// Device validation errors raised while creating the modules or the
/// pipeline are captured and returned as the link log.
pub(crate) fn link(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    surface_format: wgpu::TextureFormat,
    vertex: &CompiledStage,
    fragment: &CompiledStage,
) -> Result<wgpu::RenderPipeline, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let vertex_module = create_module(device, "effect vertex", vertex);
    let fragment_module = create_module(device, "effect fragment", fragment);

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("effect pipeline"),
        layout: Some(&layouts.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_module,
            entry_point: Some("main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &QUAD_ATTRIBUTES,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });

    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(error.to_string()),
        None => Ok(pipeline),
    }
}

fn create_module(device: &wgpu::Device, label: &str, stage: &CompiledStage) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(stage.source.clone()),
            stage: stage.stage.naga_stage(),
            defines: &[],
        },
    })
}

pub(crate) fn build_sampler_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let texture_bindings = (0..SAMPLER_COUNT as u32)
        .map(|unit| unit * 2)
        .chain(std::iter::once(UNBOUND_TEXTURE_BINDING));
    let mut entries = Vec::with_capacity((SAMPLER_COUNT + 1) * 2);
    for binding in texture_bindings {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: binding + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

/// `views` feed the bound units; `unbound` is the placeholder behind `tex2`/`tex3`.
pub(crate) fn build_sampler_entries<'a>(
    views: [&'a wgpu::TextureView; SAMPLER_COUNT],
    unbound: &'a wgpu::TextureView,
    sampler: &'a wgpu::Sampler,
) -> Vec<wgpu::BindGroupEntry<'a>> {
    let bindings = (0..SAMPLER_COUNT as u32)
        .map(|unit| unit * 2)
        .chain(std::iter::once(UNBOUND_TEXTURE_BINDING));
    let views = views.into_iter().chain(std::iter::once(unbound));
    let mut entries = Vec::with_capacity((SAMPLER_COUNT + 1) * 2);
    for (binding, view) in bindings.zip(views) {
        entries.push(wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: binding + 1,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_layout_pairs_texture_and_sampler_bindings() {
        let entries = build_sampler_layout_entries();
        let bindings: Vec<u32> = entries.iter().map(|entry| entry.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3, 4, 5]);
        assert!(matches!(entries[4].ty, wgpu::BindingType::Texture { .. }));
        assert!(matches!(entries[0].ty, wgpu::BindingType::Texture { .. }));
        assert!(matches!(entries[1].ty, wgpu::BindingType::Sampler(_)));
    }
}
