use image::RgbaImage;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum StripError {
    #[error("strip threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),
    #[error("image has no pixels")]
    Empty,
    #[error("every pixel fell below the strip threshold {threshold}")]
    NothingLeft { threshold: f32 },
}

/// Makes dark, near-background pixels fully transparent.
///
/// A pixel is stripped when `max(R, G, B) * alpha` (normalized) is below
/// `threshold`; every other pixel is copied unchanged.
pub fn create_transparency_mask(image: &RgbaImage, threshold: f32) -> Result<RgbaImage, StripError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(StripError::InvalidThreshold(threshold));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(StripError::Empty);
    }

    let mut out = image.clone();
    let mut kept = 0usize;
    for pixel in out.pixels_mut() {
        let brightest = pixel[0].max(pixel[1]).max(pixel[2]) as f32 / 255.0;
        let alpha = pixel[3] as f32 / 255.0;
        if brightest * alpha < threshold {
            pixel[3] = 0;
        } else {
            kept += 1;
        }
    }

    if kept == 0 {
        return Err(StripError::NothingLeft { threshold });
    }
    Ok(out)
}
