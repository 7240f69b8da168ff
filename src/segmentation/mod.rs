//! Skin segmentation of the base photo.
//!
//! A [`SegmentationModel`] is an external capability (for example a
//! multiclass selfie segmenter) injected by the host. The provider
//! initializes it at most once and falls back to the colour heuristic in
//! [`skin`] whenever the model is missing, failed to initialize, or errors on
//! a particular photo. Segmentation never fails from the caller's side.

pub mod skin;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use image::RgbaImage;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::SegmentationConfig;
use crate::raster::{AssetKind, RasterAsset};
use skin::{SkinThresholds, heuristic_skin_mask, mask_pixel};

pub use skin::detect_skin;

/// Per-pixel category indices produced by a model, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMask {
    pub width: u32,
    pub height: u32,
    pub categories: Vec<u8>,
}

#[derive(Debug, Clone, Error)]
pub enum SegmentationUnavailable {
    #[error("no segmentation model configured")]
    NoModel,
    #[error("segmentation model failed to initialize: {0}")]
    Init(String),
    #[error("segmentation model failed: {0}")]
    Inference(String),
    #[error("segmentation model returned a malformed mask: {0}")]
    Malformed(String),
}

pub trait SegmentationModel: Send + Sync {
    fn initialize(&self) -> BoxFuture<'_, Result<(), SegmentationUnavailable>>;

    fn segment<'a>(
        &'a self,
        image: &'a RgbaImage,
    ) -> BoxFuture<'a, Result<CategoryMask, SegmentationUnavailable>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationState {
    Uninitialized,
    Initializing,
    Ready,
    Degraded,
}

pub struct SegmentationProvider {
    model: Option<Arc<dyn SegmentationModel>>,
    outcome: OnceCell<SegmentationState>,
    initializing: AtomicBool,
    skin_categories: Vec<u8>,
    thresholds: SkinThresholds,
}

impl SegmentationProvider {
    pub fn new(model: Option<Arc<dyn SegmentationModel>>, cfg: &SegmentationConfig) -> Self {
        Self {
            model,
            outcome: OnceCell::new(),
            initializing: AtomicBool::new(false),
            skin_categories: cfg.skin_categories.clone(),
            thresholds: cfg.thresholds,
        }
    }

    /// Provider that always uses the heuristic.
    pub fn heuristic(cfg: &SegmentationConfig) -> Self {
        Self::new(None, cfg)
    }

    /// Initializes the model once; concurrent callers share the attempt.
    pub async fn initialize(&self) -> SegmentationState {
        *self
            .outcome
            .get_or_init(|| async {
                self.initializing.store(true, Ordering::SeqCst);
                let state = match self.model.as_ref() {
                    None => {
                        info!("no segmentation model configured; using skin heuristic");
                        SegmentationState::Degraded
                    }
                    Some(model) => match model.initialize().await {
                        Ok(()) => {
                            info!("segmentation model ready");
                            SegmentationState::Ready
                        }
                        Err(err) => {
                            warn!(error = %err, "segmentation unavailable; using skin heuristic");
                            SegmentationState::Degraded
                        }
                    },
                };
                self.initializing.store(false, Ordering::SeqCst);
                state
            })
            .await
    }

    pub fn state(&self) -> SegmentationState {
        match self.outcome.get() {
            Some(state) => *state,
            None if self.initializing.load(Ordering::SeqCst) => SegmentationState::Initializing,
            None => SegmentationState::Uninitialized,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SegmentationState::Ready
    }

    /// Binary skin mask at the photo's resolution.
    pub async fn segment(&self, photo: &RasterAsset) -> RasterAsset {
        if let (SegmentationState::Ready, Some(model)) = (self.state(), self.model.as_ref()) {
            match self.segment_with_model(model.as_ref(), photo).await {
                Ok(mask) => return RasterAsset::generated(AssetKind::SegmentationMask, mask),
                Err(err) => warn!(error = %err, "segmentation failed; using skin heuristic"),
            }
        }
        self.segment_heuristic(photo).await
    }

    async fn segment_with_model(
        &self,
        model: &dyn SegmentationModel,
        photo: &RasterAsset,
    ) -> Result<RgbaImage, SegmentationUnavailable> {
        let mask = model.segment(photo.pixels()).await?;
        let expected = mask.width as usize * mask.height as usize;
        if mask.width == 0 || mask.height == 0 || mask.categories.len() != expected {
            return Err(SegmentationUnavailable::Malformed(format!(
                "{}x{} mask with {} entries",
                mask.width,
                mask.height,
                mask.categories.len()
            )));
        }
        Ok(categories_to_mask(
            &mask,
            &self.skin_categories,
            photo.width(),
            photo.height(),
        ))
    }

    async fn segment_heuristic(&self, photo: &RasterAsset) -> RasterAsset {
        let pixels = photo.shared();
        let thresholds = self.thresholds;
        let mask = match tokio::task::spawn_blocking(move || heuristic_skin_mask(&pixels, &thresholds)).await {
            Ok(mask) => mask,
            Err(err) => {
                debug!(error = %err, "heuristic worker failed; running inline");
                heuristic_skin_mask(photo.pixels(), &self.thresholds)
            }
        };
        RasterAsset::generated(AssetKind::SegmentationMask, mask)
    }
}

/// Nearest-neighbour resample of a category mask into an alpha mask.
pub fn categories_to_mask(mask: &CategoryMask, skin: &[u8], width: u32, height: u32) -> RgbaImage {
    let mut out = RgbaImage::new(width, height);
    let (mw, mh) = (mask.width as u64, mask.height as u64);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let sx = ((x as u64 * mw) / width.max(1) as u64).min(mw - 1);
        let sy = ((y as u64 * mh) / height.max(1) as u64).min(mh - 1);
        let category = mask.categories[(sy * mw + sx) as usize];
        *pixel = mask_pixel(skin.contains(&category));
    }
    out
}
