use std::borrow::Cow;

use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::{Rgba, RgbaImage};
use serde::Deserialize;
use tracing::warn;

use super::blur::box_blur_field;
use super::color::{luminance, pixel_to_rgb_alpha, unit_to_byte};

/// Largest Sobel magnitude a `[0, 1]` field can produce.
const MAX_SOBEL: f32 = 4.0 * std::f32::consts::SQRT_2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepthAlgorithm {
    /// Brightness as a proxy for distance.
    Luminance,
    /// Brightness blended with inverted edge strength, so contours read as near.
    #[default]
    GradientAware,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthOptions {
    /// Output size; `None` keeps the source resolution.
    pub resolution: Option<(u32, u32)>,
    pub strength: f32,
    pub blur_radius: u32,
    pub algorithm: DepthAlgorithm,
}

impl Default for DepthOptions {
    fn default() -> Self {
        Self {
            resolution: None,
            strength: 1.0,
            blur_radius: 0,
            algorithm: DepthAlgorithm::default(),
        }
    }
}

impl DepthOptions {
    fn effective_strength(&self) -> f32 {
        if self.strength.is_finite() && self.strength > 0.0 {
            self.strength
        } else {
            1.0
        }
    }
}

/// Grey depth map (`0` near, `255` far), fully opaque.
pub fn generate_depth_map(image: &RgbaImage, options: &DepthOptions) -> RgbaImage {
    let source = match options.resolution {
        Some((w, h)) if w > 0 && h > 0 && (w, h) != image.dimensions() => {
            match resize_rgba(image, w, h) {
                Ok(resized) => Cow::Owned(resized),
                Err(err) => {
                    warn!(error = ?err, width = w, height = h, "depth resample failed; using source resolution");
                    Cow::Borrowed(image)
                }
            }
        }
        _ => Cow::Borrowed(image),
    };

    let (width, height) = source.dimensions();
    let (w, h) = (width as usize, height as usize);
    let lum: Vec<f32> = source
        .pixels()
        .map(|p| luminance(pixel_to_rgb_alpha(p).0).clamp(0.0, 1.0))
        .collect();

    let strength = options.effective_strength();
    let raw: Vec<f32> = match options.algorithm {
        DepthAlgorithm::Luminance => lum.iter().map(|l| l.powf(strength)).collect(),
        DepthAlgorithm::GradientAware => {
            let gradient = sobel_magnitude(&lum, w, h);
            lum.iter()
                .zip(gradient)
                .map(|(l, g)| (0.7 * l + 0.3 * (1.0 - g)).clamp(0.0, 1.0).powf(strength))
                .collect()
        }
    };
    let depth = box_blur_field(&raw, w, h, options.blur_radius);

    let mut out = RgbaImage::new(width, height);
    for (pixel, value) in out.pixels_mut().zip(depth) {
        let v = unit_to_byte(value);
        *pixel = Rgba([v, v, v, 255]);
    }
    out
}

/// Normalized 3x3 Sobel gradient magnitude, clamp-to-edge.
fn sobel_magnitude(field: &[f32], width: usize, height: usize) -> Vec<f32> {
    let at = |x: isize, y: isize| {
        let cx = x.clamp(0, width as isize - 1) as usize;
        let cy = y.clamp(0, height as isize - 1) as usize;
        field[cy * width + cx]
    };
    let mut out = Vec::with_capacity(field.len());
    for y in 0..height as isize {
        for x in 0..width as isize {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            out.push(((gx * gx + gy * gy).sqrt() / MAX_SOBEL).clamp(0.0, 1.0));
        }
    }
    out
}

pub(crate) fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        anyhow::bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for depth resample")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("depth resample failed")?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .ok_or_else(|| anyhow::anyhow!("failed to construct resampled RGBA image"))
}
