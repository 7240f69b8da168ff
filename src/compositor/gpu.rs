use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use wgpu::util::DeviceExt;

use super::textures::TextureSlot;
use super::uniforms::GpuParams;
use crate::error::{Error, Result};
use crate::raster::{AssetId, RasterAsset};
use crate::surface::GpuContext;
use crate::surface::mesh::{GridMesh, GridVertex};

const SHADER: &str = include_str!("shaders/overlay.wgsl");

/// Format of offscreen frames and uploaded textures.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    asset: Option<AssetId>,
}

impl GpuTexture {
    fn upload(ctx: &GpuContext, label: &str, width: u32, height: u32, pixels: &[u8]) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue.write_texture(
            texture.as_image_copy(),
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            asset: None,
        }
    }

    fn from_asset(ctx: &GpuContext, slot: TextureSlot, asset: &RasterAsset) -> Self {
        let mut tex = Self::upload(
            ctx,
            slot.label(),
            asset.width().max(1),
            asset.height().max(1),
            asset.pixels().as_raw(),
        );
        tex.asset = Some(asset.id());
        tex
    }
}

/// Vertex and index buffers for a [`GridMesh`].
pub struct MeshBuffers {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    pub fn new(ctx: &GpuContext, mesh: &GridMesh) -> Self {
        let vertices = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("grid-vertices"),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let indices = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("grid-indices"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        Self {
            vertices,
            indices,
            index_count: mesh.indices.len() as u32,
        }
    }

    pub fn destroy(&self) {
        self.vertices.destroy();
        self.indices.destroy();
    }
}

/// Compiled overlay program and its GPU-side textures.
pub(crate) struct GpuProgram {
    ctx: Arc<GpuContext>,
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    texture_layout: wgpu::BindGroupLayout,
    params_buf: wgpu::Buffer,
    params_bind: wgpu::BindGroup,
    placeholder: GpuTexture,
    slots: [Option<GpuTexture>; 5],
    texture_bind: Option<wgpu::BindGroup>,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl GpuProgram {
    pub(crate) fn compile(ctx: Arc<GpuContext>) -> Result<Self> {
        let device = &ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay-shader"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(SHADER)),
        });

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay-params-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let texture_entries: Vec<wgpu::BindGroupLayoutEntry> = TextureSlot::ALL
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.binding(),
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay-texture-layout"),
            entries: &texture_entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay-pipeline-layout"),
            bind_group_layouts: &[&params_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let params_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("overlay-params"),
            size: std::mem::size_of::<GpuParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("overlay-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let params_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("overlay-params-bind"),
            layout: &params_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let placeholder = GpuTexture::upload(&ctx, "placeholder", 1, 1, &[0, 0, 0, 0]);
        let offscreen = build_pipeline(device, &shader, &pipeline_layout, OFFSCREEN_FORMAT);

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::ShaderCompile(err.to_string()));
        }
        debug!("overlay program compiled");

        let mut pipelines = HashMap::new();
        pipelines.insert(OFFSCREEN_FORMAT, offscreen);
        Ok(Self {
            ctx,
            shader,
            pipeline_layout,
            texture_layout,
            params_buf,
            params_bind,
            placeholder,
            slots: Default::default(),
            texture_bind: None,
            pipelines,
        })
    }

    pub(crate) fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub(crate) fn upload(&mut self, slot: TextureSlot, asset: &RasterAsset) {
        self.release(slot);
        self.slots[slot as usize] = Some(GpuTexture::from_asset(&self.ctx, slot, asset));
        self.texture_bind = None;
    }

    /// Destroys the slot's texture if one is bound.
    pub(crate) fn release(&mut self, slot: TextureSlot) {
        if let Some(tex) = self.slots[slot as usize].take() {
            debug!(slot = slot.label(), asset = ?tex.asset, "destroying texture");
            tex.texture.destroy();
            self.texture_bind = None;
        }
    }

    pub(crate) fn destroy(&mut self) {
        for slot in TextureSlot::ALL {
            self.release(slot);
        }
        self.placeholder.texture.destroy();
        self.params_buf.destroy();
        self.pipelines.clear();
    }

    fn ensure_pipeline(&mut self, format: wgpu::TextureFormat) -> Result<()> {
        if !self.pipelines.contains_key(&format) {
            let device = &self.ctx.device;
            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = build_pipeline(device, &self.shader, &self.pipeline_layout, format);
            if let Some(err) = pollster::block_on(device.pop_error_scope()) {
                return Err(Error::ShaderCompile(err.to_string()));
            }
            debug!(?format, "built overlay pipeline");
            self.pipelines.insert(format, pipeline);
        }
        Ok(())
    }

    fn ensure_texture_bind(&mut self) {
        if self.texture_bind.is_none() {
            let views: Vec<&wgpu::TextureView> = TextureSlot::ALL
                .iter()
                .map(|slot| {
                    self.slots[*slot as usize]
                        .as_ref()
                        .map_or(&self.placeholder.view, |tex| &tex.view)
                })
                .collect();
            let entries: Vec<wgpu::BindGroupEntry> = TextureSlot::ALL
                .iter()
                .zip(views)
                .map(|(slot, view)| wgpu::BindGroupEntry {
                    binding: slot.binding(),
                    resource: wgpu::BindingResource::TextureView(view),
                })
                .collect();
            let bind = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("overlay-texture-bind"),
                layout: &self.texture_layout,
                entries: &entries,
            });
            self.texture_bind = Some(bind);
        }
    }

    /// Encodes and submits one pass of the program into `view`.
    pub(crate) fn draw(
        &mut self,
        params: &GpuParams,
        mesh: &MeshBuffers,
        view: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        clear: wgpu::Color,
    ) -> Result<()> {
        self.ctx
            .queue
            .write_buffer(&self.params_buf, 0, bytemuck::bytes_of(params));
        self.ensure_pipeline(format)?;
        self.ensure_texture_bind();
        let (Some(pipeline), Some(texture_bind)) =
            (self.pipelines.get(&format), self.texture_bind.as_ref())
        else {
            return Err(Error::ShaderCompile("overlay program incomplete".into()));
        };

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("overlay-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.params_bind, &[]);
            pass.set_bind_group(1, texture_bind, &[]);
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("overlay-pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<GridVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
