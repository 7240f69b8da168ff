//! Asset preparation that runs off the render path, and the bookkeeping
//! that lets a newer load supersede an older one.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::lock;
use crate::config::{DepthConfig, OverlayConfig};
use crate::error::{Error, Result};
use crate::processing::ImageAnalyzer;
use crate::processing::depth;
use crate::processing::transparency::create_transparency_mask;
use crate::raster::{AssetKind, RasterAsset};
use crate::segmentation::SegmentationProvider;

/// Base photo with the rasters derived from it.
pub(crate) struct PreparedBase {
    pub photo: RasterAsset,
    pub segmentation: RasterAsset,
    pub depth: RasterAsset,
}

/// Artwork as downloaded and as it will be composited.
pub(crate) struct PreparedOverlay {
    pub original: RasterAsset,
    pub processed: RasterAsset,
}

/// Identifies one load request within a [`LoadSlot`].
#[derive(Debug, Clone)]
pub(crate) struct Ticket {
    pub generation: u64,
    pub token: CancellationToken,
}

/// Latest-request-wins tracking for one kind of load.
pub(crate) struct LoadSlot {
    kind: &'static str,
    generation: AtomicU64,
    current: Mutex<CancellationToken>,
}

impl LoadSlot {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            generation: AtomicU64::new(0),
            current: Mutex::new(CancellationToken::new()),
        }
    }

    /// Starts a request and cancels the one before it.
    pub fn begin(&self) -> Ticket {
        let mut current = lock(&self.current);
        current.cancel();
        let token = CancellationToken::new();
        *current = token.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if generation > 1 {
            debug!(kind = self.kind, generation, "previous load superseded");
        }
        Ticket { generation, token }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        !ticket.token.is_cancelled() && self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    pub fn cancel(&self) {
        lock(&self.current).cancel();
    }
}

/// Load, segment and derive the depth map. `None` when cancelled.
pub(crate) async fn prepare_base(
    analyzer: &ImageAnalyzer,
    segmentation: &SegmentationProvider,
    depth_cfg: &DepthConfig,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Option<PreparedBase>> {
    let photo = select! {
        _ = cancel.cancelled() => return Ok(None),
        res = analyzer.load(url) => res?,
    };
    let segmentation = select! {
        _ = cancel.cancelled() => return Ok(None),
        mask = segmentation.segment(&photo) => mask,
    };

    let options = depth_cfg.options_for(photo.width(), photo.height());
    let pixels = photo.shared();
    let worker = tokio::task::spawn_blocking(move || depth::generate_depth_map(&pixels, &options));
    let depth = select! {
        _ = cancel.cancelled() => return Ok(None),
        res = worker => res.map_err(|err| Error::load(url, format!("depth worker failed: {err}")))?,
    };
    debug!(
        width = photo.width(),
        height = photo.height(),
        depth_width = depth.width(),
        depth_height = depth.height(),
        "base photo prepared"
    );
    Ok(Some(PreparedBase {
        photo,
        segmentation,
        depth: RasterAsset::generated(AssetKind::DepthMap, depth),
    }))
}

/// Load the artwork and strip its background. `None` when cancelled.
pub(crate) async fn prepare_overlay(
    analyzer: &ImageAnalyzer,
    overlay_cfg: &OverlayConfig,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Option<PreparedOverlay>> {
    let original = select! {
        _ = cancel.cancelled() => return Ok(None),
        res = analyzer.load(url) => res?,
    };
    if !overlay_cfg.auto_strip {
        return Ok(Some(PreparedOverlay {
            processed: original.clone(),
            original,
        }));
    }
    let processed = select! {
        _ = cancel.cancelled() => return Ok(None),
        processed = strip_background(&original, overlay_cfg.strip_threshold) => processed,
    };
    Ok(Some(PreparedOverlay {
        original,
        processed,
    }))
}

/// Background removal on a blocking worker. Any failure keeps the artwork
/// unmodified.
pub(crate) async fn strip_background(original: &RasterAsset, threshold: f32) -> RasterAsset {
    let pixels = original.shared();
    let worker =
        tokio::task::spawn_blocking(move || create_transparency_mask(&pixels, threshold)).await;
    match worker {
        Ok(Ok(stripped)) => {
            debug!(threshold, "artwork background stripped");
            RasterAsset::generated(AssetKind::StrippedArtwork, stripped)
        }
        Ok(Err(err)) => {
            warn!(error = %err, "background strip failed; keeping original artwork");
            original.clone()
        }
        Err(err) => {
            warn!(error = %err, "background strip worker failed; keeping original artwork");
            original.clone()
        }
    }
}
