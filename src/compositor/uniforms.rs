use bytemuck::{Pod, Zeroable};
use preview_model::{OverlaySettings, SettingsPatch};

use super::textures::{TextureSet, TextureSlot};
use crate::raster::RasterAsset;

pub const FLAG_BLACK_AND_WHITE: u32 = 1;
pub const FLAG_MULTIPLY: u32 = 1 << 1;
pub const FLAG_ERASE: u32 = 1 << 2;
pub const FLAG_INCLUDE_BASE: u32 = 1 << 3;

pub type Mat4 = [[f32; 4]; 4];

pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Every uniform the overlay program reads, in host terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderParams {
    pub opacity: f32,
    pub scale: f32,
    pub rotation: f32,
    pub offset: [f32; 2],
    pub contrast: f32,
    pub black_and_white: bool,
    pub multiply: bool,
    /// Width / height of the base photo.
    pub base_aspect: f32,
    /// Width / height of the overlay artwork.
    pub overlay_aspect: f32,
    /// One texel of the depth map in UV units.
    pub depth_texel: [f32; 2],
    pub displacement_strength: f32,
    pub perspective_k: f32,
    pub hint_outside_segment: f32,
    pub erase_active: bool,
    /// Quad footprint inside the erase canvas, normalized `(x, y, w, h)`.
    pub erase_rect: [f32; 4],
}

impl Default for ShaderParams {
    fn default() -> Self {
        Self::from_settings(&OverlaySettings::default())
    }
}

impl ShaderParams {
    pub fn from_settings(settings: &OverlaySettings) -> Self {
        Self {
            opacity: settings.opacity,
            scale: settings.scale,
            rotation: settings.rotation,
            offset: settings.offset,
            contrast: settings.contrast,
            black_and_white: settings.black_and_white,
            multiply: settings.multiply,
            base_aspect: 1.0,
            overlay_aspect: 1.0,
            depth_texel: [1.0, 1.0],
            displacement_strength: 0.0,
            perspective_k: 0.0,
            hint_outside_segment: 0.0,
            erase_active: false,
            erase_rect: [0.0, 0.0, 1.0, 1.0],
        }
    }

    pub fn apply(&mut self, patch: &UniformPatch) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = patch.$field { self.$field = value; })*
            };
        }
        take!(
            opacity,
            scale,
            rotation,
            offset,
            contrast,
            black_and_white,
            multiply,
            base_aspect,
            overlay_aspect,
            depth_texel,
            displacement_strength,
            perspective_k,
            hint_outside_segment,
            erase_active,
            erase_rect,
        );
    }

    /// Packs into the WGSL `Params` layout. Projection and include-base are
    /// per-pass and set with [`GpuParams::for_pass`].
    pub fn to_gpu(&self) -> GpuParams {
        let mut flags = 0;
        if self.black_and_white {
            flags |= FLAG_BLACK_AND_WHITE;
        }
        if self.multiply {
            flags |= FLAG_MULTIPLY;
        }
        if self.erase_active {
            flags |= FLAG_ERASE;
        }
        GpuParams {
            projection: IDENTITY,
            erase_rect: self.erase_rect,
            offset: self.offset,
            depth_texel: self.depth_texel,
            opacity: self.opacity,
            scale: self.scale.max(OverlaySettings::MIN_SCALE),
            rotation: self.rotation,
            contrast: self.contrast,
            base_aspect: self.base_aspect,
            overlay_aspect: self.overlay_aspect,
            displacement_strength: self.displacement_strength,
            perspective_k: self.perspective_k,
            hint_outside_segment: self.hint_outside_segment,
            flags,
            _pad0: 0,
            _pad1: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuParams {
    pub projection: Mat4,
    pub erase_rect: [f32; 4],
    pub offset: [f32; 2],
    pub depth_texel: [f32; 2],
    pub opacity: f32,
    pub scale: f32,
    pub rotation: f32,
    pub contrast: f32,
    pub base_aspect: f32,
    pub overlay_aspect: f32,
    pub displacement_strength: f32,
    pub perspective_k: f32,
    pub hint_outside_segment: f32,
    pub flags: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

impl GpuParams {
    pub fn for_pass(mut self, projection: Mat4, include_base: bool) -> Self {
        self.projection = projection;
        if include_base {
            self.flags |= FLAG_INCLUDE_BASE;
        } else {
            self.flags &= !FLAG_INCLUDE_BASE;
        }
        self
    }

    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Parameters plus the textures bound to the program.
#[derive(Debug, Clone, Default)]
pub struct UniformSet {
    pub params: ShaderParams,
    pub textures: TextureSet,
}

/// Partial uniform update; `None` leaves a value untouched. Texture fields
/// use `Some(None)` to clear a slot back to the placeholder.
#[derive(Debug, Clone, Default)]
pub struct UniformPatch {
    pub opacity: Option<f32>,
    pub scale: Option<f32>,
    pub rotation: Option<f32>,
    pub offset: Option<[f32; 2]>,
    pub contrast: Option<f32>,
    pub black_and_white: Option<bool>,
    pub multiply: Option<bool>,
    pub base_aspect: Option<f32>,
    pub overlay_aspect: Option<f32>,
    pub depth_texel: Option<[f32; 2]>,
    pub displacement_strength: Option<f32>,
    pub perspective_k: Option<f32>,
    pub hint_outside_segment: Option<f32>,
    pub erase_active: Option<bool>,
    pub erase_rect: Option<[f32; 4]>,
    pub base: Option<Option<RasterAsset>>,
    pub overlay: Option<Option<RasterAsset>>,
    pub segmentation: Option<Option<RasterAsset>>,
    pub depth: Option<Option<RasterAsset>>,
    pub erase: Option<Option<RasterAsset>>,
}

impl UniformPatch {
    pub fn texture(mut self, slot: TextureSlot, asset: Option<RasterAsset>) -> Self {
        *self.slot_mut(slot) = Some(asset);
        self
    }

    pub fn texture_change(&self, slot: TextureSlot) -> Option<&Option<RasterAsset>> {
        match slot {
            TextureSlot::Base => self.base.as_ref(),
            TextureSlot::Overlay => self.overlay.as_ref(),
            TextureSlot::Segmentation => self.segmentation.as_ref(),
            TextureSlot::Depth => self.depth.as_ref(),
            TextureSlot::Erase => self.erase.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: TextureSlot) -> &mut Option<Option<RasterAsset>> {
        match slot {
            TextureSlot::Base => &mut self.base,
            TextureSlot::Overlay => &mut self.overlay,
            TextureSlot::Segmentation => &mut self.segmentation,
            TextureSlot::Depth => &mut self.depth,
            TextureSlot::Erase => &mut self.erase,
        }
    }
}

impl From<&SettingsPatch> for UniformPatch {
    fn from(patch: &SettingsPatch) -> Self {
        Self {
            opacity: patch.opacity,
            scale: patch.scale,
            rotation: patch.rotation,
            offset: patch.offset,
            contrast: patch.contrast,
            black_and_white: patch.black_and_white,
            multiply: patch.multiply,
            ..Self::default()
        }
    }
}
