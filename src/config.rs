use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::processing::depth::{DepthAlgorithm, DepthOptions};
use crate::segmentation::skin::SkinThresholds;

pub use preview_model::{BrushSettings, OverlaySettings};

/// Top-level engine configuration, usually read from YAML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Logical size and tessellation of the drawable surface.
    pub surface: SurfaceConfig,
    /// Synthetic depth map generation for base photos.
    pub depth: DepthConfig,
    /// Skin segmentation model and heuristic fallback.
    pub segmentation: SegmentationConfig,
    /// Overlay artwork preparation and initial settings.
    pub overlay: OverlayConfig,
    /// Brush used by the eraser until the host changes it.
    pub eraser: BrushSettings,
    /// Pointer gesture handling.
    pub gestures: GestureConfig,
    /// Render backend selection.
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SurfaceConfig {
    /// Logical width in pixels.
    pub width: u32,
    /// Logical height in pixels.
    pub height: u32,
    /// Quads per side of the displaced grid mesh.
    pub mesh_segments: u32,
}

impl SurfaceConfig {
    const fn default_width() -> u32 {
        1024
    }

    const fn default_height() -> u32 {
        768
    }

    const fn default_mesh_segments() -> u32 {
        64
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: Self::default_width(),
            height: Self::default_height(),
            mesh_segments: Self::default_mesh_segments(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DepthConfig {
    pub algorithm: DepthAlgorithm,
    /// Longest edge of the generated depth map; `0` keeps the photo resolution.
    pub max_dimension: u32,
    /// Exponent applied to the raw depth estimate.
    pub strength: f32,
    /// Box blur radius in depth-map pixels.
    pub blur_radius: u32,
    /// Vertex displacement along the quad normal, in surface units per depth unit.
    pub displacement_strength: f32,
    /// Fragment-stage perspective shrink factor.
    pub perspective_k: f32,
}

impl DepthConfig {
    const fn default_max_dimension() -> u32 {
        512
    }

    const fn default_strength() -> f32 {
        1.0
    }

    const fn default_blur_radius() -> u32 {
        2
    }

    const fn default_displacement_strength() -> f32 {
        0.1
    }

    const fn default_perspective_k() -> f32 {
        0.15
    }

    /// Depth options for a photo of the given size.
    pub fn options_for(&self, width: u32, height: u32) -> DepthOptions {
        let resolution = if self.max_dimension == 0 {
            None
        } else {
            let long_edge = width.max(height).max(1);
            if long_edge <= self.max_dimension {
                None
            } else {
                let scale = self.max_dimension as f32 / long_edge as f32;
                let w = ((width as f32) * scale).round().max(1.0) as u32;
                let h = ((height as f32) * scale).round().max(1.0) as u32;
                Some((w, h))
            }
        };
        DepthOptions {
            resolution,
            strength: self.strength,
            blur_radius: self.blur_radius,
            algorithm: self.algorithm,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.strength.is_finite(),
            "depth.strength must be a finite number"
        );
        ensure!(
            self.blur_radius <= 64,
            "depth.blur-radius must be at most 64"
        );
        ensure!(
            self.displacement_strength.is_finite(),
            "depth.displacement-strength must be a finite number"
        );
        ensure!(
            self.perspective_k.is_finite() && self.perspective_k >= 0.0,
            "depth.perspective-k must be non-negative"
        );
        Ok(())
    }
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            algorithm: DepthAlgorithm::default(),
            max_dimension: Self::default_max_dimension(),
            strength: Self::default_strength(),
            blur_radius: Self::default_blur_radius(),
            displacement_strength: Self::default_displacement_strength(),
            perspective_k: Self::default_perspective_k(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SegmentationConfig {
    /// Model categories treated as skin.
    pub skin_categories: Vec<u8>,
    /// Thresholds for the heuristic fallback.
    pub thresholds: SkinThresholds,
    /// Overlay visibility outside the detected skin area.
    pub hint_outside_segment: f32,
}

impl SegmentationConfig {
    fn default_skin_categories() -> Vec<u8> {
        vec![2, 3]
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.skin_categories.is_empty(),
            "segmentation.skin-categories must list at least one category"
        );
        ensure!(
            (0.0..=1.0).contains(&self.hint_outside_segment),
            "segmentation.hint-outside-segment must be within [0, 1]"
        );
        self.thresholds
            .validate()
            .context("invalid segmentation.thresholds")
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            skin_categories: Self::default_skin_categories(),
            thresholds: SkinThresholds::default(),
            hint_outside_segment: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct OverlayConfig {
    /// Strip dark backgrounds from newly loaded artwork.
    pub auto_strip: bool,
    /// Normalized brightness below which artwork pixels become transparent.
    pub strip_threshold: f32,
    /// Settings applied at startup and on reset.
    pub settings: OverlaySettings,
}

impl OverlayConfig {
    const fn default_auto_strip() -> bool {
        true
    }

    const fn default_strip_threshold() -> f32 {
        0.1
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            auto_strip: Self::default_auto_strip(),
            strip_threshold: Self::default_strip_threshold(),
            settings: OverlaySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct GestureConfig {
    pub enabled: bool,
    /// Multiplier from screen drag distance to overlay offset.
    pub drag_sensitivity: f32,
    /// Scale factor applied per scroll-wheel line in the viewer.
    pub wheel_scale_step: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drag_sensitivity: 1.0,
            wheel_scale_step: 1.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Cpu,
    #[default]
    Gpu,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RenderConfig {
    pub backend: BackendKind,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.surface.width > 0 && self.surface.height > 0,
            "surface width and height must be greater than zero"
        );
        ensure!(
            (1..=512).contains(&self.surface.mesh_segments),
            "surface.mesh-segments must be within [1, 512]"
        );
        self.depth
            .validate()
            .context("invalid depth configuration")?;
        self.segmentation
            .validate()
            .context("invalid segmentation configuration")?;
        ensure!(
            (0.0..=1.0).contains(&self.overlay.strip_threshold),
            "overlay.strip-threshold must be within [0, 1]"
        );
        self.overlay
            .settings
            .validate("overlay.settings")
            .context("invalid overlay configuration")?;
        self.eraser
            .validate("eraser")
            .context("invalid eraser configuration")?;
        ensure!(
            self.gestures.drag_sensitivity.is_finite() && self.gestures.drag_sensitivity > 0.0,
            "gestures.drag-sensitivity must be positive"
        );
        ensure!(
            self.gestures.wheel_scale_step.is_finite() && self.gestures.wheel_scale_step > 1.0,
            "gestures.wheel-scale-step must be greater than one"
        );
        Ok(self)
    }
}
