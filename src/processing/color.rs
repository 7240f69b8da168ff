use image::{Rgba, RgbaImage};
use palette::{FromColor, Hsl, RgbHue, Srgb};

/// Multiplicative colour adjustments; `1.0` (and `0°`) is the identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAdjustments {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub hue_degrees: f32,
}

impl Default for ColorAdjustments {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            hue_degrees: 0.0,
        }
    }
}

impl ColorAdjustments {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

pub fn adjust_colors(image: &RgbaImage, adjustments: &ColorAdjustments) -> RgbaImage {
    let mut out = image.clone();
    if adjustments.is_identity() {
        return out;
    }
    let brightness = finite_or(adjustments.brightness, 1.0).max(0.0);
    let contrast = finite_or(adjustments.contrast, 1.0).max(0.0);
    let saturation = finite_or(adjustments.saturation, 1.0).max(0.0);
    let hue_shift = finite_or(adjustments.hue_degrees, 0.0);
    let touch_hsl = (saturation - 1.0).abs() > f32::EPSILON || hue_shift.abs() > f32::EPSILON;

    for pixel in out.pixels_mut() {
        let (rgb, alpha) = pixel_to_rgb_alpha(pixel);
        let mut rgb = rgb.map(|c| ((c * brightness - 0.5) * contrast + 0.5).clamp(0.0, 1.0));
        if touch_hsl {
            let mut hsl = Hsl::from_color(Srgb::new(rgb[0], rgb[1], rgb[2]));
            hsl.saturation = (hsl.saturation * saturation).clamp(0.0, 1.0);
            hsl.hue = RgbHue::from_degrees(hsl.hue.into_degrees() + hue_shift);
            let srgb = Srgb::from_color(hsl);
            rgb = [srgb.red, srgb.green, srgb.blue];
        }
        *pixel = rgb_alpha_to_pixel(rgb, alpha);
    }
    out
}

/// Rec.601 luminance replacing RGB; alpha untouched.
pub fn to_grayscale(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let (rgb, alpha) = pixel_to_rgb_alpha(pixel);
        let l = luminance(rgb);
        *pixel = rgb_alpha_to_pixel([l, l, l], alpha);
    }
    out
}

pub fn luminance(rgb: [f32; 3]) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

pub(crate) fn pixel_to_rgb_alpha(pixel: &Rgba<u8>) -> ([f32; 3], f32) {
    let r = (pixel[0] as f32) / 255.0;
    let g = (pixel[1] as f32) / 255.0;
    let b = (pixel[2] as f32) / 255.0;
    let a = (pixel[3] as f32) / 255.0;
    ([r, g, b], a)
}

pub(crate) fn rgb_alpha_to_pixel(rgb: [f32; 3], alpha: f32) -> Rgba<u8> {
    let mut out = [0u8; 4];
    for (i, channel) in rgb.iter().enumerate() {
        out[i] = unit_to_byte(*channel);
    }
    out[3] = unit_to_byte(alpha);
    Rgba(out)
}

pub(crate) fn unit_to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}
