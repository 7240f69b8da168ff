use anyhow::{Result, ensure};
use image::{Rgba, RgbaImage};
use palette::{FromColor, Hsv, Srgb};
use serde::Deserialize;

/// Thresholds for the colour-rule skin detector used when no model is
/// available. Two rules are OR-ed: an RGB dominance rule and an HSV window.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SkinThresholds {
    pub min_red: u8,
    pub min_green: u8,
    pub min_blue: u8,
    /// Red must exceed this fraction of green.
    pub red_green_ratio: f32,
    /// Hues in `[0, warm-hue-max]` count as skin.
    pub warm_hue_max: f32,
    /// Hues in `[cool-hue-min, 360]` count as skin.
    pub cool_hue_min: f32,
    pub saturation: [f32; 2],
    pub value: [f32; 2],
}

impl Default for SkinThresholds {
    fn default() -> Self {
        Self {
            min_red: 60,
            min_green: 30,
            min_blue: 15,
            red_green_ratio: 0.8,
            warm_hue_max: 60.0,
            cool_hue_min: 300.0,
            saturation: [0.1, 0.8],
            value: [0.2, 1.0],
        }
    }
}

impl SkinThresholds {
    pub fn matches(&self, r: u8, g: u8, b: u8) -> bool {
        let rgb_rule = r > self.min_red
            && g > self.min_green
            && b > self.min_blue
            && r > b
            && (r as f32) > self.red_green_ratio * g as f32;
        if rgb_rule {
            return true;
        }

        let hsv = Hsv::from_color(Srgb::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
        ));
        let hue = hsv.hue.into_positive_degrees();
        let hue_ok = hue <= self.warm_hue_max || hue >= self.cool_hue_min;
        hue_ok
            && (self.saturation[0]..=self.saturation[1]).contains(&hsv.saturation)
            && (self.value[0]..=self.value[1]).contains(&hsv.value)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.red_green_ratio.is_finite() && self.red_green_ratio >= 0.0,
            "red-green-ratio must be non-negative"
        );
        ensure!(
            (0.0..=360.0).contains(&self.warm_hue_max) && (0.0..=360.0).contains(&self.cool_hue_min),
            "hue bounds must be within [0, 360]"
        );
        for (name, [lo, hi]) in [("saturation", self.saturation), ("value", self.value)] {
            ensure!(
                (0.0..=1.0).contains(&lo) && (0.0..=1.0).contains(&hi) && lo <= hi,
                "{} range must be an ordered pair within [0, 1]",
                name
            );
        }
        Ok(())
    }
}

/// Skin test with the default thresholds.
pub fn detect_skin(r: u8, g: u8, b: u8) -> bool {
    SkinThresholds::default().matches(r, g, b)
}

/// Opaque white where the heuristic sees skin, transparent elsewhere.
pub fn heuristic_skin_mask(image: &RgbaImage, thresholds: &SkinThresholds) -> RgbaImage {
    let mut out = RgbaImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        let skin = src[3] > 0 && thresholds.matches(src[0], src[1], src[2]);
        *dst = mask_pixel(skin);
    }
    out
}

pub(crate) fn mask_pixel(on: bool) -> Rgba<u8> {
    if on {
        Rgba([255, 255, 255, 255])
    } else {
        Rgba([0, 0, 0, 0])
    }
}
