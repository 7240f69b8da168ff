use crate::raster::RasterAsset;

/// Texture bindings of the overlay program, in WGSL binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Base,
    Overlay,
    Segmentation,
    Depth,
    Erase,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 5] = [
        TextureSlot::Base,
        TextureSlot::Overlay,
        TextureSlot::Segmentation,
        TextureSlot::Depth,
        TextureSlot::Erase,
    ];

    pub fn binding(self) -> u32 {
        self as u32
    }

    pub fn label(self) -> &'static str {
        match self {
            TextureSlot::Base => "base",
            TextureSlot::Overlay => "overlay",
            TextureSlot::Segmentation => "segmentation",
            TextureSlot::Depth => "depth",
            TextureSlot::Erase => "erase",
        }
    }
}

/// Assets bound to each slot; `None` binds the transparent placeholder.
#[derive(Debug, Clone, Default)]
pub struct TextureSet {
    slots: [Option<RasterAsset>; 5],
}

impl TextureSet {
    pub fn with(mut self, slot: TextureSlot, asset: RasterAsset) -> Self {
        self.set(slot, Some(asset));
        self
    }

    pub fn get(&self, slot: TextureSlot) -> Option<&RasterAsset> {
        self.slots[slot as usize].as_ref()
    }

    /// Stores `asset`, returning whatever was bound before.
    pub fn set(&mut self, slot: TextureSlot, asset: Option<RasterAsset>) -> Option<RasterAsset> {
        std::mem::replace(&mut self.slots[slot as usize], asset)
    }

    pub fn take_all(&mut self) -> impl Iterator<Item = (TextureSlot, RasterAsset)> + '_ {
        TextureSlot::ALL
            .into_iter()
            .filter_map(|slot| self.slots[slot as usize].take().map(|asset| (slot, asset)))
    }

    pub fn bound(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Counters for texture handles owned by the compositor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStats {
    pub live: usize,
    pub uploaded: usize,
    pub released: usize,
}

impl ResourceStats {
    pub(crate) fn upload(&mut self) {
        self.uploaded += 1;
        self.live += 1;
    }

    pub(crate) fn release(&mut self) {
        self.released += 1;
        self.live = self.live.saturating_sub(1);
    }
}
