//! The preview orchestrator.
//!
//! [`PreviewEngine`] owns the asset pipeline, the overlay settings and the
//! interaction tools. Loads run as async tasks that only touch shared state
//! once, when their finished assets are swapped into the compositor under
//! the state lock. A newer load of the same kind supersedes an older one;
//! the older result is discarded if it arrives late.

mod pipeline;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbaImage;
use preview_model::{BrushSettings, OverlaySettings, SettingsPatch};
use tracing::{debug, info, warn};

use crate::compositor::{
    RenderBackend, ResourceStats, ShaderCompositor, ShaderParams, TextureSet, TextureSlot,
    UniformPatch, UniformSet,
};
use crate::config::{BackendKind, Configuration};
use crate::eraser::EraserTool;
use crate::error::{Error, Result};
use crate::events::{
    NoAffordance, PointerEvent, ProcessingCallback, SettingsCallback, UiAffordance,
};
use crate::fetch::{ImageFetcher, LocalFetcher, short_url};
use crate::gesture::{GestureController, GestureEvent};
use crate::processing::ImageAnalyzer;
use crate::raster::RasterAsset;
use crate::segmentation::{SegmentationModel, SegmentationProvider, SegmentationState};
use crate::surface::{ExportMode, GpuContext, RenderSurface};
use pipeline::{LoadSlot, PreparedBase, PreparedOverlay, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

/// How a load request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The new assets are live.
    Applied,
    /// A newer request of the same kind replaced this one first.
    Superseded,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Mounted {
    surface: RenderSurface,
    compositor: ShaderCompositor,
}

struct OverlayAssets {
    url: String,
    original: RasterAsset,
}

struct Core {
    state: EngineState,
    settings: OverlaySettings,
    size: (u32, u32),
    mounted: Option<Mounted>,
    eraser: EraserTool,
    erase_applied: bool,
    gestures: GestureController,
    drag_anchor: Option<[f32; 2]>,
    overlay: Option<OverlayAssets>,
}

impl Core {
    fn mounted(&mut self) -> Result<&mut Mounted> {
        let state = self.state;
        match self.mounted.as_mut() {
            Some(mounted) if state == EngineState::Ready => Ok(mounted),
            _ => Err(Error::NotReady(state)),
        }
    }

    /// Merges `patch` and forwards only the changed fields.
    fn apply_settings(&mut self, patch: &SettingsPatch) -> Result<OverlaySettings> {
        let next = self.settings.merged(patch);
        let changed = self.settings.diff(&next);
        if !changed.is_empty() {
            if let Some(mounted) = self.mounted.as_mut() {
                mounted.compositor.update(UniformPatch::from(&changed))?;
            }
            self.settings = next;
        }
        Ok(next)
    }

    fn install_base(&mut self, prepared: PreparedBase) -> Result<()> {
        let mounted = self.mounted()?;
        let (width, height) = prepared.photo.dimensions();
        let (depth_w, depth_h) = prepared.depth.dimensions();
        let patch = UniformPatch {
            base_aspect: Some(prepared.photo.aspect_ratio()),
            depth_texel: Some([1.0 / depth_w.max(1) as f32, 1.0 / depth_h.max(1) as f32]),
            erase_rect: Some(mounted.surface.erase_rect_for(width, height)),
            ..UniformPatch::default()
        }
        .texture(TextureSlot::Base, Some(prepared.photo))
        .texture(TextureSlot::Segmentation, Some(prepared.segmentation))
        .texture(TextureSlot::Depth, Some(prepared.depth));
        // The mesh follows the textures only once they are live.
        mounted.compositor.update(patch)?;
        mounted.surface.set_content_size(width, height);
        Ok(())
    }

    fn install_overlay(&mut self, url: &str, prepared: PreparedOverlay) -> Result<()> {
        let mounted = self.mounted()?;
        let patch = UniformPatch {
            overlay_aspect: Some(prepared.processed.aspect_ratio()),
            erase_active: Some(false),
            ..UniformPatch::default()
        }
        .texture(TextureSlot::Overlay, Some(prepared.processed))
        .texture(TextureSlot::Erase, None);
        mounted.compositor.update(patch)?;
        self.eraser.clear_all();
        self.erase_applied = false;
        self.overlay = Some(OverlayAssets {
            url: url.to_owned(),
            original: prepared.original,
        });
        Ok(())
    }

    /// Pushes the current mask again after the stroke list changed.
    fn refresh_erase(&mut self) -> Result<()> {
        if !self.erase_applied {
            return Ok(());
        }
        let mask = self.eraser.erase_mask();
        let mounted = self.mounted()?;
        mounted.compositor.update(
            UniformPatch {
                erase_active: Some(true),
                ..UniformPatch::default()
            }
            .texture(TextureSlot::Erase, Some(mask)),
        )
    }

    fn gesture_patch(&mut self, events: &[GestureEvent], sensitivity: f32) -> SettingsPatch {
        let quad = self
            .mounted
            .as_ref()
            .map(|mounted| mounted.surface.layout());
        let mut next = self.settings;
        for event in events {
            match *event {
                GestureEvent::DragStart { .. } => self.drag_anchor = Some(next.offset),
                GestureEvent::DragMove { delta } => {
                    if let (Some(anchor), Some(quad)) = (self.drag_anchor, quad) {
                        let dx = delta[0] / quad.width.max(1.0) * sensitivity;
                        let dy = delta[1] / quad.height.max(1.0) * sensitivity;
                        next = next.merged(
                            &SettingsPatch::default().offset(anchor[0] + dx, anchor[1] + dy),
                        );
                    }
                }
                GestureEvent::DragEnd => self.drag_anchor = None,
                GestureEvent::ScaleChange(ratio) => {
                    next = next.merged(&SettingsPatch::default().scale(next.scale * ratio));
                }
                GestureEvent::RotationChange(delta) => {
                    next = next.merged(&SettingsPatch::default().rotation(next.rotation + delta));
                }
            }
        }
        self.settings.diff(&next)
    }
}

struct EngineInner {
    config: Configuration,
    analyzer: ImageAnalyzer,
    segmentation: SegmentationProvider,
    backend: Option<RenderBackend>,
    core: Mutex<Core>,
    init_lock: tokio::sync::Mutex<()>,
    base_loads: LoadSlot,
    overlay_loads: LoadSlot,
    restrip_loads: LoadSlot,
    processing: AtomicUsize,
    settings_listeners: Mutex<Vec<SettingsCallback>>,
    processing_listeners: Mutex<Vec<ProcessingCallback>>,
}

impl EngineInner {
    fn core(&self) -> MutexGuard<'_, Core> {
        lock(&self.core)
    }

    fn busy(&self) -> ProcessingGuard<'_> {
        if self.processing.fetch_add(1, Ordering::SeqCst) == 0 {
            self.notify_processing(true);
        }
        ProcessingGuard { inner: self }
    }

    fn notify_processing(&self, busy: bool) {
        let listeners = lock(&self.processing_listeners).clone();
        for listener in listeners {
            listener(busy);
        }
    }

    fn notify_settings(&self, settings: &OverlaySettings) {
        let listeners = lock(&self.settings_listeners).clone();
        if listeners.is_empty() {
            return;
        }
        debug!(
            settings = %serde_json::to_string(settings).unwrap_or_default(),
            "settings changed"
        );
        for listener in listeners {
            listener(settings);
        }
    }
}

/// Holds the processing flag up for the lifetime of one async job.
struct ProcessingGuard<'a> {
    inner: &'a EngineInner,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        if self.inner.processing.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.notify_processing(false);
        }
    }
}

pub struct PreviewEngineBuilder {
    config: Configuration,
    fetcher: Option<Arc<dyn ImageFetcher>>,
    model: Option<Arc<dyn SegmentationModel>>,
    backend: Option<RenderBackend>,
    affordance: Option<Arc<dyn UiAffordance>>,
}

impl PreviewEngineBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn segmentation_model(mut self, model: Arc<dyn SegmentationModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Overrides `render.backend` from the configuration.
    pub fn backend(mut self, backend: RenderBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn affordance(mut self, affordance: Arc<dyn UiAffordance>) -> Self {
        self.affordance = Some(affordance);
        self
    }

    pub fn build(self) -> PreviewEngine {
        let config = self.config;
        let fetcher = self.fetcher.unwrap_or_else(|| Arc::new(LocalFetcher));
        let affordance = self.affordance.unwrap_or_else(|| Arc::new(NoAffordance));
        let size = (config.surface.width.max(1), config.surface.height.max(1));

        let mut eraser = EraserTool::new(size.0, size.1, config.eraser);
        eraser.set_affordance(Arc::clone(&affordance));
        let mut gestures = GestureController::new();
        gestures.set_affordance(affordance);

        let core = Core {
            state: EngineState::Uninitialized,
            settings: config.overlay.settings,
            size,
            mounted: None,
            eraser,
            erase_applied: false,
            gestures,
            drag_anchor: None,
            overlay: None,
        };
        PreviewEngine {
            inner: Arc::new(EngineInner {
                analyzer: ImageAnalyzer::new(fetcher),
                segmentation: SegmentationProvider::new(self.model, &config.segmentation),
                backend: self.backend,
                core: Mutex::new(core),
                init_lock: tokio::sync::Mutex::new(()),
                base_loads: LoadSlot::new("photo"),
                overlay_loads: LoadSlot::new("artwork"),
                restrip_loads: LoadSlot::new("restrip"),
                processing: AtomicUsize::new(0),
                settings_listeners: Mutex::new(Vec::new()),
                processing_listeners: Mutex::new(Vec::new()),
                config,
            }),
        }
    }
}

/// Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct PreviewEngine {
    inner: Arc<EngineInner>,
}

impl PreviewEngine {
    /// Engine reading images from the local filesystem and `data:` URIs.
    pub fn new(config: Configuration) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: Configuration) -> PreviewEngineBuilder {
        PreviewEngineBuilder {
            config,
            fetcher: None,
            model: None,
            backend: None,
            affordance: None,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn state(&self) -> EngineState {
        self.inner.core().state
    }

    pub fn segmentation_state(&self) -> SegmentationState {
        self.inner.segmentation.state()
    }

    /// Initializes segmentation, mounts the surface and builds the
    /// compositor program. Repeated calls after success are no-ops.
    pub async fn initialize(&self) -> Result<()> {
        let _serial = self.inner.init_lock.lock().await;
        let (settings, size) = {
            let mut core = self.inner.core();
            match core.state {
                EngineState::Ready => return Ok(()),
                EngineState::Disposed => return Err(Error::NotReady(EngineState::Disposed)),
                EngineState::Uninitialized | EngineState::Initializing => {}
            }
            core.state = EngineState::Initializing;
            (core.settings, core.size)
        };
        info!("initializing preview engine");

        let segmentation = self.inner.segmentation.initialize().await;
        let config = self.inner.config.clone();
        let backend = self.inner.backend.clone();
        let mounted = tokio::task::spawn_blocking(move || mount(&config, backend, settings, size))
            .await
            .map_err(|err| Error::Surface(format!("surface worker failed: {err}")))
            .and_then(|res| res);

        let mut core = self.inner.core();
        if core.state == EngineState::Disposed {
            return Err(Error::NotReady(EngineState::Disposed));
        }
        let mounted = match mounted {
            Ok(mounted) => mounted,
            Err(err) => {
                core.state = EngineState::Uninitialized;
                warn!(error = %err, "preview engine failed to initialize");
                return Err(err);
            }
        };
        core.mounted = Some(mounted);
        core.state = EngineState::Ready;
        core.gestures.set_enabled(self.inner.config.gestures.enabled);
        info!(?segmentation, width = size.0, height = size.1, "preview engine ready");
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            EngineState::Ready => Ok(()),
            state => Err(Error::NotReady(state)),
        }
    }

    /// Loads a base photo with its segmentation mask and depth map. On
    /// error the previous photo stays live.
    pub async fn load_base_photo(&self, url: &str) -> Result<LoadOutcome> {
        self.ensure_ready()?;
        let ticket = self.inner.base_loads.begin();
        let _busy = self.inner.busy();
        let prepared = pipeline::prepare_base(
            &self.inner.analyzer,
            &self.inner.segmentation,
            &self.inner.config.depth,
            url,
            &ticket.token,
        )
        .await;
        let Some(prepared) = self.settle(&self.inner.base_loads, &ticket, prepared)? else {
            debug!(url = %short_url(url), "stale photo load discarded");
            return Ok(LoadOutcome::Superseded);
        };

        let mut core = self.inner.core();
        if !self.inner.base_loads.is_current(&ticket) {
            debug!(url = %short_url(url), "stale photo load discarded");
            return Ok(LoadOutcome::Superseded);
        }
        core.install_base(prepared)?;
        info!(url = %short_url(url), "base photo loaded");
        Ok(LoadOutcome::Applied)
    }

    /// Loads tattoo artwork, strips its background and resets the eraser.
    pub async fn load_overlay_art(&self, url: &str) -> Result<LoadOutcome> {
        self.ensure_ready()?;
        let ticket = self.inner.overlay_loads.begin();
        self.inner.restrip_loads.cancel();
        let _busy = self.inner.busy();
        let prepared = pipeline::prepare_overlay(
            &self.inner.analyzer,
            &self.inner.config.overlay,
            url,
            &ticket.token,
        )
        .await;
        let Some(prepared) = self.settle(&self.inner.overlay_loads, &ticket, prepared)? else {
            debug!(url = %short_url(url), "stale artwork load discarded");
            return Ok(LoadOutcome::Superseded);
        };

        let mut core = self.inner.core();
        if !self.inner.overlay_loads.is_current(&ticket) {
            debug!(url = %short_url(url), "stale artwork load discarded");
            return Ok(LoadOutcome::Superseded);
        }
        core.install_overlay(url, prepared)?;
        info!(url = %short_url(url), "overlay artwork loaded");
        Ok(LoadOutcome::Applied)
    }

    /// Errors from a request that has since been superseded are dropped.
    fn settle<T>(&self, slot: &LoadSlot, ticket: &Ticket, res: Result<Option<T>>) -> Result<Option<T>> {
        match res {
            Err(err) if !slot.is_current(ticket) => {
                debug!(error = %err, "superseded load failed");
                Ok(None)
            }
            other => other,
        }
    }

    /// Strips the retained original artwork again with a new threshold.
    /// Returns `Superseded` when no artwork is loaded, a newer restrip
    /// started, or different artwork was installed meanwhile. A restrip
    /// never cancels a pending artwork load.
    pub async fn restrip_overlay(&self, threshold: f32) -> Result<LoadOutcome> {
        self.ensure_ready()?;
        let Some(original) = self
            .inner
            .core()
            .overlay
            .as_ref()
            .map(|overlay| overlay.original.clone())
        else {
            return Ok(LoadOutcome::Superseded);
        };
        let ticket = self.inner.restrip_loads.begin();
        let _busy = self.inner.busy();
        let processed = pipeline::strip_background(&original, threshold).await;

        let mut core = self.inner.core();
        let same_artwork = core
            .overlay
            .as_ref()
            .is_some_and(|overlay| overlay.original.id() == original.id());
        if !self.inner.restrip_loads.is_current(&ticket) || !same_artwork {
            debug!(threshold, "stale restrip discarded");
            return Ok(LoadOutcome::Superseded);
        }
        let mounted = core.mounted()?;
        mounted.compositor.update(
            UniformPatch {
                overlay_aspect: Some(processed.aspect_ratio()),
                ..UniformPatch::default()
            }
            .texture(TextureSlot::Overlay, Some(processed)),
        )?;
        debug!(threshold, "overlay artwork restripped");
        Ok(LoadOutcome::Applied)
    }

    pub fn overlay_url(&self) -> Option<String> {
        self.inner
            .core()
            .overlay
            .as_ref()
            .map(|overlay| overlay.url.clone())
    }

    /// Merges `patch`, forwards the changed fields to the compositor and
    /// notifies listeners with the full result.
    pub fn update_settings(&self, patch: SettingsPatch) -> Result<OverlaySettings> {
        let next = {
            let mut core = self.inner.core();
            if core.state == EngineState::Disposed {
                return Err(Error::NotReady(EngineState::Disposed));
            }
            core.apply_settings(&patch)?
        };
        self.inner.notify_settings(&next);
        Ok(next)
    }

    /// Restores the documented default settings.
    pub fn reset_settings(&self) -> Result<OverlaySettings> {
        self.update_settings(SettingsPatch::from(OverlaySettings::default()))
    }

    pub fn settings(&self) -> OverlaySettings {
        self.inner.core().settings
    }

    pub fn uniforms(&self) -> Option<ShaderParams> {
        self.inner
            .core()
            .mounted
            .as_ref()
            .and_then(|mounted| mounted.compositor.uniforms())
    }

    pub fn resource_stats(&self) -> ResourceStats {
        self.inner
            .core()
            .mounted
            .as_ref()
            .map(|mounted| mounted.compositor.resource_stats())
            .unwrap_or_default()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::SeqCst) > 0
    }

    /// Routes pointer input to the eraser when it is enabled and to the
    /// gesture recognizer otherwise.
    pub fn handle_pointer(&self, event: &PointerEvent) {
        let next = {
            let mut core = self.inner.core();
            if core.state != EngineState::Ready {
                return;
            }
            if core.eraser.is_enabled() {
                if core.eraser.handle_pointer(event) {
                    if let Err(err) = core.refresh_erase() {
                        warn!(error = %err, "failed to refresh erase mask");
                    }
                }
                return;
            }
            let events = core.gestures.handle(event);
            if events.is_empty() {
                return;
            }
            let patch = core.gesture_patch(&events, self.inner.config.gestures.drag_sensitivity);
            if patch.is_empty() {
                return;
            }
            match core.apply_settings(&patch) {
                Ok(next) => next,
                Err(err) => {
                    warn!(error = %err, "gesture update rejected");
                    return;
                }
            }
        };
        self.inner.notify_settings(&next);
    }

    pub fn enable_eraser(&self) {
        let mut core = self.inner.core();
        core.gestures.reset();
        core.drag_anchor = None;
        core.eraser.enable();
        debug!("eraser enabled");
    }

    pub fn disable_eraser(&self) {
        let mut core = self.inner.core();
        core.eraser.disable();
        debug!("eraser disabled");
    }

    pub fn is_eraser_enabled(&self) -> bool {
        self.inner.core().eraser.is_enabled()
    }

    pub fn set_brush(&self, brush: BrushSettings) {
        self.inner.core().eraser.set_brush(brush);
    }

    pub fn erase_stroke_count(&self) -> usize {
        self.inner.core().eraser.stroke_count()
    }

    /// Uploads the current erase mask and starts masking the overlay.
    pub fn apply_erase_mask(&self) -> Result<()> {
        let mut core = self.inner.core();
        core.mounted()?;
        core.erase_applied = true;
        core.refresh_erase()?;
        debug!(strokes = core.eraser.stroke_count(), "erase mask applied");
        Ok(())
    }

    pub fn undo_erase(&self) -> Result<bool> {
        let mut core = self.inner.core();
        let undone = core.eraser.undo();
        if undone {
            core.refresh_erase()?;
        }
        Ok(undone)
    }

    pub fn clear_erase(&self) -> Result<()> {
        let mut core = self.inner.core();
        core.eraser.clear_all();
        if core.erase_applied {
            core.erase_applied = false;
            let mounted = core.mounted()?;
            mounted.compositor.update(
                UniformPatch {
                    erase_active: Some(false),
                    ..UniformPatch::default()
                }
                .texture(TextureSlot::Erase, None),
            )?;
        }
        Ok(())
    }

    /// Composite preview as a PNG data URI at the photo's resolution.
    pub fn export_image(&self) -> Result<String> {
        let mut core = self.inner.core();
        let mounted = core.mounted()?;
        mounted
            .surface
            .export_frame(&mut mounted.compositor, ExportMode::Composite)
    }

    /// Overlay alone as a PNG data URI at the photo's resolution.
    pub fn export_artwork(&self) -> Result<String> {
        let mut core = self.inner.core();
        let mounted = core.mounted()?;
        mounted
            .surface
            .export_frame(&mut mounted.compositor, ExportMode::ArtworkOnly)
    }

    pub fn export_png(&self, mode: ExportMode) -> Result<Vec<u8>> {
        let mut core = self.inner.core();
        let mounted = core.mounted()?;
        mounted.surface.export_png(&mut mounted.compositor, mode)
    }

    /// Surface-sized frame as currently displayed.
    pub fn render_frame(&self) -> Result<RgbaImage> {
        let mut core = self.inner.core();
        let mounted = core.mounted()?;
        mounted.surface.render_image(&mut mounted.compositor)
    }

    pub fn render_to_view(
        &self,
        view: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        let mut core = self.inner.core();
        let mounted = core.mounted()?;
        mounted
            .surface
            .render_to_view(&mut mounted.compositor, view, format)
    }

    /// Resizes the surface and the erase canvas. Zero dimensions clamp to one.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        let mut core = self.inner.core();
        if core.state == EngineState::Disposed {
            return Err(Error::NotReady(EngineState::Disposed));
        }
        let size = (width.max(1), height.max(1));
        core.size = size;
        core.eraser.resize(size.0, size.1);
        if let Some(mounted) = core.mounted.as_mut() {
            mounted.surface.resize(size.0, size.1);
            let erase_rect = mounted.surface.erase_rect();
            mounted.compositor.update(UniformPatch {
                erase_rect: Some(erase_rect),
                ..UniformPatch::default()
            })?;
        }
        if core.mounted.is_some() {
            core.refresh_erase()?;
        }
        debug!(width = size.0, height = size.1, "preview resized");
        Ok(())
    }

    /// Releases every texture, the program and the surface. In-flight loads
    /// are cancelled. Repeated calls are no-ops.
    pub fn dispose(&self) {
        self.inner.base_loads.cancel();
        self.inner.overlay_loads.cancel();
        self.inner.restrip_loads.cancel();
        let mut core = self.inner.core();
        if core.state == EngineState::Disposed {
            return;
        }
        if let Some(mut mounted) = core.mounted.take() {
            mounted.compositor.dispose();
            mounted.surface.dispose();
        }
        core.eraser.clear_all();
        core.erase_applied = false;
        core.gestures.reset();
        core.overlay = None;
        core.state = EngineState::Disposed;
        info!("preview engine disposed");
    }

    /// `callback` receives the full settings after every accepted change.
    pub fn on_settings_change(&self, callback: impl Fn(&OverlaySettings) + Send + Sync + 'static) {
        lock(&self.inner.settings_listeners).push(Arc::new(callback));
    }

    /// `callback` receives `true` when background work starts and `false`
    /// once all of it has finished.
    pub fn on_processing_change(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        lock(&self.inner.processing_listeners).push(Arc::new(callback));
    }
}

fn resolve_backend(config: &Configuration, backend: Option<RenderBackend>) -> Result<RenderBackend> {
    if let Some(backend) = backend {
        return Ok(backend);
    }
    Ok(match config.render.backend {
        BackendKind::Cpu => RenderBackend::Cpu,
        BackendKind::Gpu => RenderBackend::Gpu(Arc::new(GpuContext::headless()?)),
    })
}

fn mount(
    config: &Configuration,
    backend: Option<RenderBackend>,
    settings: OverlaySettings,
    size: (u32, u32),
) -> Result<Mounted> {
    let backend = resolve_backend(config, backend)?;
    let mut surface_cfg = config.surface.clone();
    surface_cfg.width = size.0;
    surface_cfg.height = size.1;
    let surface = RenderSurface::new(&surface_cfg, &backend);

    let params = ShaderParams {
        displacement_strength: config.depth.displacement_strength,
        perspective_k: config.depth.perspective_k,
        hint_outside_segment: config.segmentation.hint_outside_segment,
        erase_rect: surface.erase_rect(),
        ..ShaderParams::from_settings(&settings)
    };
    let mut compositor = ShaderCompositor::new(backend);
    compositor.build(UniformSet {
        params,
        textures: TextureSet::default(),
    })?;
    Ok(Mounted {
        surface,
        compositor,
    })
}
