use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info};
use winit::window::Window;

use crate::error::{Error, Result};

/// Adapter, device and queue shared by the compositor and the surface.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter.get_info().name)
            .finish_non_exhaustive()
    }
}

impl GpuContext {
    /// Device without a presentation surface, for offscreen rendering.
    pub fn headless() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| Error::Surface(format!("failed to acquire GPU adapter: {err}")))?;
        Self::with_adapter(instance, adapter)
    }

    /// Device able to present to `window`, plus the window's surface.
    pub fn for_window(window: Arc<Window>) -> Result<(Self, wgpu::Surface<'static>)> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(|err| Error::Surface(format!("failed to create surface: {err}")))?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|err| Error::Surface(format!("failed to acquire GPU adapter: {err}")))?;
        Ok((Self::with_adapter(instance, adapter)?, surface))
    }

    fn with_adapter(instance: wgpu::Instance, adapter: wgpu::Adapter) -> Result<Self> {
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("preview-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|err| Error::Surface(format!("failed to acquire GPU device: {err}")))?;
        let info = adapter.get_info();
        info!(adapter = %info.name, backend = ?info.backend, "GPU device ready");
        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Copies an `Rgba8Unorm` texture back into host memory.
    pub fn readback(&self, texture: &wgpu::Texture, width: u32, height: u32) -> Result<RgbaImage> {
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let bytes_per_row = unpadded.div_ceil(align) * align;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("preview-readback"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("preview-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|err| Error::Surface(format!("GPU poll failed: {err}")))?;
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(Error::Surface(format!("readback map failed: {err}"))),
            Err(err) => return Err(Error::Surface(format!("readback channel closed: {err}"))),
        }

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in 0..height {
            let start = (row * bytes_per_row) as usize;
            pixels.extend_from_slice(&mapped[start..start + unpadded as usize]);
        }
        drop(mapped);
        staging.unmap();
        debug!(width, height, "read back frame");

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| Error::Surface("readback size mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn readback_returns_uploaded_pixels() {
        // Machines without an adapter have nothing to read back.
        let Ok(ctx) = GpuContext::headless() else {
            return;
        };
        let mut img = RgbaImage::new(3, 2);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgba([x as u8 * 60, y as u8 * 90, 7, 255]);
        }
        let size = wgpu::Extent3d {
            width: 3,
            height: 2,
            depth_or_array_layers: 1,
        };
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("readback-test"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue.write_texture(
            texture.as_image_copy(),
            img.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * 3),
                rows_per_image: Some(2),
            },
            size,
        );
        assert_eq!(ctx.readback(&texture, 3, 2).unwrap(), img);
    }
}
