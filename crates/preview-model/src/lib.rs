use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

pub use brush::BrushSettings;
pub use overlay::{OverlaySettings, SettingsPatch};

mod overlay {
    use super::*;

    /// User-adjustable placement and look of the tattoo overlay.
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct OverlaySettings {
        pub opacity: f32,
        pub scale: f32,
        /// Radians; wrap-around is left to the shader.
        pub rotation: f32,
        /// Offset in normalized unit-square space.
        pub offset: [f32; 2],
        pub contrast: f32,
        pub black_and_white: bool,
        pub multiply: bool,
    }

    impl Default for OverlaySettings {
        fn default() -> Self {
            Self {
                opacity: 0.8,
                scale: 0.1,
                rotation: 0.0,
                offset: [0.0, 0.0],
                contrast: 1.3,
                black_and_white: false,
                multiply: true,
            }
        }
    }

    /// Partial update of [`OverlaySettings`]; absent fields are left untouched.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct SettingsPatch {
        pub opacity: Option<f32>,
        pub scale: Option<f32>,
        pub rotation: Option<f32>,
        pub offset: Option<[f32; 2]>,
        pub contrast: Option<f32>,
        pub black_and_white: Option<bool>,
        pub multiply: Option<bool>,
    }

    impl SettingsPatch {
        pub fn is_empty(&self) -> bool {
            *self == Self::default()
        }

        pub fn opacity(mut self, value: f32) -> Self {
            self.opacity = Some(value);
            self
        }

        pub fn scale(mut self, value: f32) -> Self {
            self.scale = Some(value);
            self
        }

        pub fn rotation(mut self, value: f32) -> Self {
            self.rotation = Some(value);
            self
        }

        pub fn offset(mut self, x: f32, y: f32) -> Self {
            self.offset = Some([x, y]);
            self
        }

        pub fn contrast(mut self, value: f32) -> Self {
            self.contrast = Some(value);
            self
        }

        pub fn black_and_white(mut self, value: bool) -> Self {
            self.black_and_white = Some(value);
            self
        }

        pub fn multiply(mut self, value: bool) -> Self {
            self.multiply = Some(value);
            self
        }
    }

    impl From<OverlaySettings> for SettingsPatch {
        fn from(settings: OverlaySettings) -> Self {
            Self {
                opacity: Some(settings.opacity),
                scale: Some(settings.scale),
                rotation: Some(settings.rotation),
                offset: Some(settings.offset),
                contrast: Some(settings.contrast),
                black_and_white: Some(settings.black_and_white),
                multiply: Some(settings.multiply),
            }
        }
    }

    impl OverlaySettings {
        /// Smallest scale the overlay may shrink to.
        pub const MIN_SCALE: f32 = 0.01;

        /// Merges `patch` into a copy of `self`. Values that would break the
        /// data-model invariants (non-finite numbers, scale below the floor,
        /// opacity outside `[0, 1]`) are clamped or ignored.
        pub fn merged(&self, patch: &SettingsPatch) -> Self {
            let mut next = *self;
            if let Some(opacity) = patch.opacity.filter(|v| v.is_finite()) {
                next.opacity = opacity.clamp(0.0, 1.0);
            }
            if let Some(scale) = patch.scale.filter(|v| v.is_finite()) {
                next.scale = scale.max(Self::MIN_SCALE);
            }
            if let Some(rotation) = patch.rotation.filter(|v| v.is_finite()) {
                next.rotation = rotation;
            }
            if let Some([x, y]) = patch.offset {
                if x.is_finite() {
                    next.offset[0] = x;
                }
                if y.is_finite() {
                    next.offset[1] = y;
                }
            }
            if let Some(contrast) = patch.contrast.filter(|v| v.is_finite()) {
                next.contrast = contrast.max(0.0);
            }
            if let Some(bw) = patch.black_and_white {
                next.black_and_white = bw;
            }
            if let Some(multiply) = patch.multiply {
                next.multiply = multiply;
            }
            next
        }

        /// Fields of `next` that differ from `self`.
        pub fn diff(&self, next: &OverlaySettings) -> SettingsPatch {
            SettingsPatch {
                opacity: (self.opacity != next.opacity).then_some(next.opacity),
                scale: (self.scale != next.scale).then_some(next.scale),
                rotation: (self.rotation != next.rotation).then_some(next.rotation),
                offset: (self.offset != next.offset).then_some(next.offset),
                contrast: (self.contrast != next.contrast).then_some(next.contrast),
                black_and_white: (self.black_and_white != next.black_and_white)
                    .then_some(next.black_and_white),
                multiply: (self.multiply != next.multiply).then_some(next.multiply),
            }
        }

        pub fn validate(&self, prefix: &str) -> Result<()> {
            ensure!(
                self.opacity.is_finite() && (0.0..=1.0).contains(&self.opacity),
                "{}.opacity must be within [0, 1]",
                prefix
            );
            ensure!(
                self.scale.is_finite() && self.scale >= Self::MIN_SCALE,
                "{}.scale must be at least {}",
                prefix,
                Self::MIN_SCALE
            );
            ensure!(
                self.rotation.is_finite(),
                "{}.rotation must be finite",
                prefix
            );
            ensure!(
                self.offset.iter().all(|v| v.is_finite()),
                "{}.offset must be finite",
                prefix
            );
            ensure!(
                self.contrast.is_finite() && self.contrast >= 0.0,
                "{}.contrast must be non-negative",
                prefix
            );
            Ok(())
        }
    }
}

mod brush {
    use super::*;

    /// Eraser brush tip.
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct BrushSettings {
        /// Diameter in surface pixels.
        pub size: f32,
        pub hardness: f32,
        pub opacity: f32,
        pub flow: f32,
    }

    impl Default for BrushSettings {
        fn default() -> Self {
            Self {
                size: 30.0,
                hardness: 0.8,
                opacity: 1.0,
                flow: 1.0,
            }
        }
    }

    impl BrushSettings {
        pub fn radius(&self) -> f32 {
            (self.size * 0.5).max(0.0)
        }

        /// Peak alpha removed by a single dab.
        pub fn strength(&self) -> f32 {
            (self.opacity.clamp(0.0, 1.0) * self.flow.clamp(0.0, 1.0)).clamp(0.0, 1.0)
        }

        pub fn is_hard(&self) -> bool {
            self.hardness >= 1.0
        }

        pub fn validate(&self, prefix: &str) -> Result<()> {
            ensure!(
                self.size.is_finite() && self.size > 0.0,
                "{}.size must be positive",
                prefix
            );
            for (field, value) in [
                ("hardness", self.hardness),
                ("opacity", self.opacity),
                ("flow", self.flow),
            ] {
                ensure!(
                    value.is_finite() && (0.0..=1.0).contains(&value),
                    "{}.{} must be within [0, 1]",
                    prefix,
                    field
                );
            }
            Ok(())
        }
    }
}
