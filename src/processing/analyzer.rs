use std::io::Cursor;
use std::sync::Arc;

use image::RgbaImage;
use tracing::debug;

use super::color::{self, ColorAdjustments};
use super::depth::{self, DepthOptions};
use super::transparency::{self, StripError};
use crate::error::{Error, Result};
use crate::fetch::{ImageFetcher, short_url};
use crate::raster::{AssetKind, ImageMetadata, RasterAsset};

/// Fetches, decodes and derives the rasters the compositor consumes.
#[derive(Clone)]
pub struct ImageAnalyzer {
    fetcher: Arc<dyn ImageFetcher>,
}

impl ImageAnalyzer {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn load(&self, url: &str) -> Result<RasterAsset> {
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|err| Error::load(url, format!("{err:#}")))?;
        let decoded = tokio::task::spawn_blocking(move || decode_rgba8_apply_exif(&bytes))
            .await
            .map_err(|err| Error::load(url, err))?
            .map_err(|err| Error::load(url, format!("{err:#}")))?;
        debug!(
            url = %short_url(url),
            width = decoded.width(),
            height = decoded.height(),
            "decoded image"
        );
        Ok(RasterAsset::from_url(url, decoded))
    }

    /// Dimensions after EXIF orientation, without a full decode.
    pub async fn get_metadata(&self, url: &str) -> Result<ImageMetadata> {
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|err| Error::load(url, format!("{err:#}")))?;
        let (width, height) = header_dimensions(&bytes).map_err(|err| Error::load(url, err))?;
        let swapped = matches!(read_orientation(&bytes), Some(5..=8));
        Ok(if swapped {
            ImageMetadata::new(height, width)
        } else {
            ImageMetadata::new(width, height)
        })
    }

    pub fn generate_depth_map(&self, image: &RasterAsset, options: &DepthOptions) -> RasterAsset {
        RasterAsset::generated(
            AssetKind::DepthMap,
            depth::generate_depth_map(image.pixels(), options),
        )
    }

    pub fn adjust_colors(&self, image: &RasterAsset, adjustments: &ColorAdjustments) -> RasterAsset {
        RasterAsset::generated(
            AssetKind::Adjusted,
            color::adjust_colors(image.pixels(), adjustments),
        )
    }

    pub fn to_grayscale(&self, image: &RasterAsset) -> RasterAsset {
        RasterAsset::generated(AssetKind::Adjusted, color::to_grayscale(image.pixels()))
    }

    pub fn create_transparency_mask(
        &self,
        image: &RasterAsset,
        threshold: f32,
    ) -> Result<RasterAsset, StripError> {
        transparency::create_transparency_mask(image.pixels(), threshold)
            .map(|pixels| RasterAsset::generated(AssetKind::StrippedArtwork, pixels))
    }
}

fn header_dimensions(bytes: &[u8]) -> image::ImageResult<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

/// Decodes to RGBA8 and applies EXIF orientation when present.
pub fn decode_rgba8_apply_exif(bytes: &[u8]) -> anyhow::Result<RgbaImage> {
    let img = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    let mut img = img.to_rgba8();

    let orientation: u16 = read_orientation(bytes).unwrap_or(1);
    match orientation {
        1 => {}
        2 => {
            img = image::imageops::flip_horizontal(&img);
        }
        3 => {
            img = image::imageops::rotate180(&img);
        }
        4 => {
            img = image::imageops::flip_vertical(&img);
        }
        5 => {
            // transpose
            img = image::imageops::rotate90(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        6 => {
            img = image::imageops::rotate90(&img);
        }
        7 => {
            // transverse
            img = image::imageops::rotate270(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        8 => {
            img = image::imageops::rotate270(&img);
        }
        _ => {}
    }

    Ok(img)
}

fn read_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    debug!(orientation, "exif orientation");
    Some(orientation)
}
