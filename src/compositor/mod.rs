//! The overlay shader program and its uniform/texture state.
//!
//! [`ShaderCompositor`] owns one compiled program at a time together with
//! the textures bound to it. Rendering goes through the GPU pipeline when the
//! backend is [`RenderBackend::Gpu`] and through the reference rasterizer in
//! [`cpu`] otherwise; both consume the same [`GpuParams`] block.

pub mod cpu;
pub mod gpu;
pub mod textures;
pub mod uniforms;

use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::raster::RasterAsset;
use crate::surface::GpuContext;
use crate::surface::mesh::GridMesh;
use gpu::{GpuProgram, MeshBuffers, OFFSCREEN_FORMAT};

pub use textures::{ResourceStats, TextureSet, TextureSlot};
pub use uniforms::{GpuParams, Mat4, ShaderParams, UniformPatch, UniformSet};

#[derive(Clone)]
pub enum RenderBackend {
    Cpu,
    Gpu(Arc<GpuContext>),
}

impl std::fmt::Debug for RenderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderBackend::Cpu => f.write_str("Cpu"),
            RenderBackend::Gpu(ctx) => f.debug_tuple("Gpu").field(ctx).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(u64);

impl ProgramHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Per-pass values that are not part of the stored uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePass {
    pub projection: Mat4,
    pub include_base: bool,
}

struct Program {
    handle: ProgramHandle,
    uniforms: UniformSet,
    gpu: Option<GpuProgram>,
}

pub struct ShaderCompositor {
    backend: RenderBackend,
    program: Option<Program>,
    stats: ResourceStats,
    next_handle: u64,
}

impl ShaderCompositor {
    pub fn new(backend: RenderBackend) -> Self {
        Self {
            backend,
            program: None,
            stats: ResourceStats::default(),
            next_handle: 1,
        }
    }

    pub fn backend(&self) -> &RenderBackend {
        &self.backend
    }

    pub fn is_built(&self) -> bool {
        self.program.is_some()
    }

    /// Compiles the program and uploads every texture in `set`, replacing
    /// any previous program.
    pub fn build(&mut self, set: UniformSet) -> Result<ProgramHandle> {
        self.dispose();

        let mut gpu = match &self.backend {
            RenderBackend::Cpu => None,
            RenderBackend::Gpu(ctx) => Some(GpuProgram::compile(Arc::clone(ctx))?),
        };
        for slot in TextureSlot::ALL {
            if let Some(asset) = set.textures.get(slot) {
                self.stats.upload();
                if let Some(gpu) = gpu.as_mut() {
                    gpu.upload(slot, asset);
                }
            }
        }

        let handle = ProgramHandle(self.next_handle);
        self.next_handle += 1;
        info!(
            program = handle.id(),
            backend = ?self.backend,
            textures = set.textures.bound(),
            "compositor program built"
        );
        self.program = Some(Program {
            handle,
            uniforms: set,
            gpu,
        });
        Ok(handle)
    }

    /// Applies the supplied fields. Textures whose asset is unchanged stay
    /// resident; replaced or cleared ones are released.
    pub fn update(&mut self, patch: UniformPatch) -> Result<()> {
        let Some(program) = self.program.as_mut() else {
            return Err(Error::NotBuilt);
        };
        program.uniforms.params.apply(&patch);

        for slot in TextureSlot::ALL {
            let Some(change) = patch.texture_change(slot) else {
                continue;
            };
            let current = program.uniforms.textures.get(slot).map(RasterAsset::id);
            if current.is_some() && current == change.as_ref().map(RasterAsset::id) {
                continue;
            }
            if program.uniforms.textures.set(slot, change.clone()).is_some() {
                self.stats.release();
                if let Some(gpu) = program.gpu.as_mut() {
                    gpu.release(slot);
                }
            }
            if let Some(asset) = change {
                self.stats.upload();
                if let Some(gpu) = program.gpu.as_mut() {
                    gpu.upload(slot, asset);
                }
            }
            debug!(slot = slot.label(), bound = change.is_some(), "texture slot updated");
        }
        Ok(())
    }

    /// Releases every texture and the program. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        let Some(mut program) = self.program.take() else {
            return;
        };
        let released = program.uniforms.textures.take_all().count();
        for _ in 0..released {
            self.stats.release();
        }
        if let Some(gpu) = program.gpu.as_mut() {
            gpu.destroy();
        }
        debug!(program = program.handle.id(), released, "compositor program disposed");
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.program.as_ref().map(|program| program.handle)
    }

    pub fn uniforms(&self) -> Option<ShaderParams> {
        self.program.as_ref().map(|program| program.uniforms.params)
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&RasterAsset> {
        self.program
            .as_ref()
            .and_then(|program| program.uniforms.textures.get(slot))
    }

    pub fn resource_stats(&self) -> ResourceStats {
        self.stats
    }

    fn pass_params(&self, pass: FramePass) -> Result<GpuParams> {
        let program = self.program.as_ref().ok_or(Error::NotBuilt)?;
        Ok(program
            .uniforms
            .params
            .to_gpu()
            .for_pass(pass.projection, pass.include_base))
    }

    /// Renders `mesh` into a new `width` x `height` image on the active
    /// backend.
    pub fn render_offscreen(
        &mut self,
        pass: FramePass,
        mesh: &GridMesh,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage> {
        let params = self.pass_params(pass)?;
        let width = width.max(1);
        let height = height.max(1);
        let Some(program) = self.program.as_mut() else {
            return Err(Error::NotBuilt);
        };
        let Some(gpu) = program.gpu.as_mut() else {
            return Ok(cpu::rasterize(
                &params,
                &program.uniforms.textures,
                mesh,
                width,
                height,
            ));
        };

        let ctx = Arc::clone(gpu.context());
        let target = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let buffers = MeshBuffers::new(&ctx, mesh);
        let drawn = gpu.draw(
            &params,
            &buffers,
            &view,
            OFFSCREEN_FORMAT,
            wgpu::Color::TRANSPARENT,
        );
        let frame = drawn.and_then(|()| ctx.readback(&target, width, height));
        buffers.destroy();
        target.destroy();
        frame
    }

    /// Draws into a presentation view. GPU backend only.
    pub fn draw_to_view(
        &mut self,
        pass: FramePass,
        mesh: &MeshBuffers,
        view: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        let params = self.pass_params(pass)?;
        let gpu = self
            .program
            .as_mut()
            .and_then(|program| program.gpu.as_mut())
            .ok_or_else(|| Error::Surface("window rendering needs the GPU backend".into()))?;
        gpu.draw(&params, mesh, view, format, wgpu::Color::BLACK)
    }
}

impl Drop for ShaderCompositor {
    fn drop(&mut self) {
        self.dispose();
    }
}
