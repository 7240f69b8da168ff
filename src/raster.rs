use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use serde::Serialize;

/// Process-unique identity of a [`RasterAsset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(u64);

impl AssetId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    SegmentationMask,
    DepthMap,
    EraseMask,
    StrippedArtwork,
    Adjusted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Url(String),
    Generated(AssetKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f32,
}

impl ImageMetadata {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            aspect_ratio: width.max(1) as f32 / height.max(1) as f32,
        }
    }
}

/// Immutable RGBA8 pixel buffer shared between the engine, workers and the
/// compositor. Replaced wholesale, never edited in place.
#[derive(Debug, Clone)]
pub struct RasterAsset {
    id: AssetId,
    source: AssetSource,
    pixels: Arc<RgbaImage>,
}

impl RasterAsset {
    pub fn new(source: AssetSource, pixels: RgbaImage) -> Self {
        Self {
            id: AssetId::next(),
            source,
            pixels: Arc::new(pixels),
        }
    }

    pub fn from_url(url: &str, pixels: RgbaImage) -> Self {
        Self::new(AssetSource::Url(url.to_owned()), pixels)
    }

    pub fn generated(kind: AssetKind, pixels: RgbaImage) -> Self {
        Self::new(AssetSource::Generated(kind), pixels)
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn source(&self) -> &AssetSource {
        &self.source
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Shared handle for moving the pixels onto a blocking worker.
    pub fn shared(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.pixels)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.metadata().aspect_ratio
    }

    pub fn metadata(&self) -> ImageMetadata {
        ImageMetadata::new(self.width(), self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_survive_clone() {
        let a = RasterAsset::generated(AssetKind::DepthMap, RgbaImage::new(4, 2));
        let b = RasterAsset::generated(AssetKind::DepthMap, RgbaImage::new(4, 2));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
        assert!((a.aspect_ratio() - 2.0).abs() < f32::EPSILON);
    }
}
