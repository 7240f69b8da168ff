//! Drawable surface: projection, the displaced grid mesh and frame output.

pub mod gpu_context;
pub mod mesh;
pub mod projection;

use std::io::Cursor;

use image::RgbaImage;
use tracing::debug;

use crate::compositor::gpu::MeshBuffers;
use crate::compositor::{FramePass, Mat4, RenderBackend, ShaderCompositor, TextureSlot};
use crate::config::SurfaceConfig;
use crate::error::{Error, Result};
use crate::fetch::encode_data_uri;
use mesh::contain_rect;
use projection::{multiply, orthographic, placement};

pub use gpu_context::GpuContext;
pub use mesh::{GridMesh, GridVertex, QuadRect};

/// What an exported frame contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Overlay composited onto the base photo.
    #[default]
    Composite,
    /// Overlay alone, with its mask-weighted alpha.
    ArtworkOnly,
}

pub struct RenderSurface {
    width: u32,
    height: u32,
    segments: u32,
    content: Option<(u32, u32)>,
    mesh: GridMesh,
    mesh_aspect: f32,
    mesh_revision: u64,
    gpu_mesh: Option<MeshBuffers>,
    gpu: Option<std::sync::Arc<GpuContext>>,
    disposed: bool,
}

impl RenderSurface {
    pub fn new(cfg: &SurfaceConfig, backend: &RenderBackend) -> Self {
        let gpu = match backend {
            RenderBackend::Cpu => None,
            RenderBackend::Gpu(ctx) => Some(std::sync::Arc::clone(ctx)),
        };
        Self {
            width: cfg.width.max(1),
            height: cfg.height.max(1),
            segments: cfg.mesh_segments.max(1),
            content: None,
            mesh: GridMesh::new(QuadRect::new(0.0, 0.0, 1.0, 1.0), cfg.mesh_segments),
            mesh_aspect: 1.0,
            mesh_revision: 0,
            gpu_mesh: None,
            gpu,
            disposed: false,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Zero dimensions clamp to one pixel.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        debug!(width = self.width, height = self.height, "surface resized");
    }

    /// Records the base photo size; the mesh is rebuilt only when the aspect
    /// ratio changes. Returns whether a rebuild happened.
    pub fn set_content_size(&mut self, width: u32, height: u32) -> bool {
        let width = width.max(1);
        let height = height.max(1);
        self.content = Some((width, height));
        let aspect = width as f32 / height as f32;
        if (aspect - self.mesh_aspect).abs() <= f32::EPSILON * aspect.max(1.0) {
            return false;
        }
        self.mesh = GridMesh::new(QuadRect::new(0.0, 0.0, aspect, 1.0), self.segments);
        self.mesh_aspect = aspect;
        self.mesh_revision += 1;
        if let Some(buffers) = self.gpu_mesh.take() {
            buffers.destroy();
        }
        debug!(aspect, revision = self.mesh_revision, "grid mesh rebuilt");
        true
    }

    pub fn mesh(&self) -> &GridMesh {
        &self.mesh
    }

    pub fn mesh_revision(&self) -> u64 {
        self.mesh_revision
    }

    /// Where the photo quad sits on the surface.
    pub fn layout(&self) -> QuadRect {
        match self.content {
            Some((w, h)) => contain_rect(self.width, self.height, w, h),
            None => QuadRect::full(self.width, self.height),
        }
    }

    /// The quad footprint as a fraction of the surface.
    pub fn erase_rect(&self) -> [f32; 4] {
        self.layout().normalized_in(self.width, self.height)
    }

    /// The footprint [`erase_rect`](Self::erase_rect) will report once a
    /// photo of `width` × `height` is installed.
    pub fn erase_rect_for(&self, width: u32, height: u32) -> [f32; 4] {
        contain_rect(self.width, self.height, width.max(1), height.max(1))
            .normalized_in(self.width, self.height)
    }

    /// Projection for drawing the mesh onto the surface.
    pub fn projection(&self) -> Mat4 {
        multiply(
            &orthographic(self.width as f32, self.height as f32),
            &placement(&self.layout(), self.mesh_aspect),
        )
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::Surface("surface disposed".into()));
        }
        Ok(())
    }

    /// Surface-sized frame with the overlay composited onto the photo.
    pub fn render_image(&self, compositor: &mut ShaderCompositor) -> Result<RgbaImage> {
        self.ensure_live()?;
        let pass = FramePass {
            projection: self.projection(),
            include_base: true,
        };
        compositor.render_offscreen(pass, &self.mesh, self.width, self.height)
    }

    /// Draws one frame into a window's swapchain view.
    pub fn render_to_view(
        &mut self,
        compositor: &mut ShaderCompositor,
        view: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        self.ensure_live()?;
        let Some(ctx) = self.gpu.as_ref() else {
            return Err(Error::Surface("window rendering needs the GPU backend".into()));
        };
        if self.gpu_mesh.is_none() {
            self.gpu_mesh = Some(MeshBuffers::new(ctx, &self.mesh));
        }
        let pass = FramePass {
            projection: self.projection(),
            include_base: true,
        };
        match self.gpu_mesh.as_ref() {
            Some(buffers) => compositor.draw_to_view(pass, buffers, view, format),
            None => Err(Error::Surface("grid mesh buffers unavailable".into())),
        }
    }

    /// Renders at the base photo's native resolution and encodes PNG.
    pub fn export_png(&self, compositor: &mut ShaderCompositor, mode: ExportMode) -> Result<Vec<u8>> {
        self.ensure_live()?;
        let (width, height) = compositor
            .texture(TextureSlot::Base)
            .map(|base| base.dimensions())
            .ok_or(Error::NothingToExport)?;
        let pass = FramePass {
            projection: multiply(
                &orthographic(width as f32, height as f32),
                &placement(&QuadRect::full(width, height), self.mesh_aspect),
            ),
            include_base: mode == ExportMode::Composite,
        };
        let frame = compositor.render_offscreen(pass, &self.mesh, width, height)?;
        let mut out = Cursor::new(Vec::new());
        frame.write_to(&mut out, image::ImageFormat::Png)?;
        debug!(width, height, ?mode, bytes = out.get_ref().len(), "exported frame");
        Ok(out.into_inner())
    }

    /// [`export_png`](Self::export_png) as a `data:image/png;base64,` URI.
    pub fn export_frame(&self, compositor: &mut ShaderCompositor, mode: ExportMode) -> Result<String> {
        let png = self.export_png(compositor, mode)?;
        Ok(encode_data_uri("image/png", &png))
    }

    /// Releases GPU buffers. Later renders fail; repeated calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(buffers) = self.gpu_mesh.take() {
            buffers.destroy();
        }
        self.content = None;
        self.disposed = true;
        debug!("surface disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{TextureSet, UniformSet};
    use crate::fetch::decode_data_uri;
    use crate::raster::{AssetKind, RasterAsset};
    use image::Rgba;

    fn surface(width: u32, height: u32) -> RenderSurface {
        let cfg = SurfaceConfig {
            width,
            height,
            mesh_segments: 8,
        };
        RenderSurface::new(&cfg, &RenderBackend::Cpu)
    }

    fn photo(width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgba([(x * 13 % 256) as u8, (y * 29 % 256) as u8, 77, 255]);
        }
        img
    }

    fn compositor_with_base(img: RgbaImage) -> ShaderCompositor {
        let mut compositor = ShaderCompositor::new(RenderBackend::Cpu);
        compositor
            .build(UniformSet {
                textures: TextureSet::default().with(
                    TextureSlot::Base,
                    RasterAsset::generated(AssetKind::Adjusted, img),
                ),
                ..UniformSet::default()
            })
            .unwrap();
        compositor
    }

    #[test]
    fn mesh_rebuilds_only_on_aspect_change() {
        let mut surface = surface(100, 100);
        assert!(surface.set_content_size(400, 200));
        assert_eq!(surface.mesh_revision(), 1);
        assert!(!surface.set_content_size(800, 400));
        surface.resize(300, 50);
        assert_eq!(surface.mesh_revision(), 1);
        assert!(surface.set_content_size(300, 300));
        assert_eq!(surface.mesh_revision(), 2);
    }

    #[test]
    fn zero_size_clamps_to_one() {
        let mut surface = surface(10, 10);
        surface.resize(0, 0);
        assert_eq!(surface.size(), (1, 1));
    }

    #[test]
    fn layout_contains_content() {
        let mut surface = surface(200, 100);
        surface.set_content_size(100, 100);
        assert_eq!(surface.layout(), QuadRect::new(50.0, 0.0, 100.0, 100.0));
        assert_eq!(surface.erase_rect(), [0.25, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn erase_rect_for_predicts_without_touching_the_mesh() {
        let mut surface = surface(200, 100);
        let predicted = surface.erase_rect_for(100, 100);
        assert_eq!(surface.mesh_revision(), 0);
        assert_eq!(surface.layout(), QuadRect::full(200, 100));
        surface.set_content_size(100, 100);
        assert_eq!(surface.erase_rect(), predicted);
    }

    #[test]
    fn export_without_base_is_nothing_to_export() {
        let surface = surface(10, 10);
        let mut compositor = ShaderCompositor::new(RenderBackend::Cpu);
        compositor.build(UniformSet::default()).unwrap();
        assert!(matches!(
            surface.export_png(&mut compositor, ExportMode::Composite),
            Err(Error::NothingToExport)
        ));
    }

    #[test]
    fn export_reproduces_photo_at_native_size() {
        let img = photo(7, 5);
        let mut surface = surface(64, 64);
        surface.set_content_size(7, 5);
        let mut compositor = compositor_with_base(img.clone());
        let uri = surface
            .export_frame(&mut compositor, ExportMode::Composite)
            .unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        let decoded = image::load_from_memory(&decode_data_uri(&uri).unwrap())
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn rendered_frame_letterboxes_photo() {
        let img = RgbaImage::from_pixel(2, 1, Rgba([40, 50, 60, 255]));
        let mut surface = surface(8, 8);
        surface.set_content_size(2, 1);
        let mut compositor = compositor_with_base(img);
        let frame = surface.render_image(&mut compositor).unwrap();
        assert_eq!(frame.dimensions(), (8, 8));
        assert_eq!(frame.get_pixel(0, 0)[3], 0);
        assert_eq!(frame.get_pixel(4, 4).0, [40, 50, 60, 255]);
        assert_eq!(frame.get_pixel(4, 7)[3], 0);
    }

    #[test]
    fn disposed_surface_refuses_to_render() {
        let mut surface = surface(4, 4);
        let mut compositor = compositor_with_base(photo(2, 2));
        surface.dispose();
        surface.dispose();
        assert!(matches!(
            surface.render_image(&mut compositor),
            Err(Error::Surface(_))
        ));
    }
}
