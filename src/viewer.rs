//! Interactive preview window.
//!
//! The engine renders straight into the window's swapchain. Every
//! `RedrawRequested` draws one frame and asks for the next, so with
//! `PresentMode::AutoVsync` the loop runs at the display refresh rate.
//! Asset loads are spawned on the tokio runtime and never block the loop.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use preview_model::SettingsPatch;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::SurfaceError;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{Key, NamedKey},
    window::{CursorIcon, Window, WindowAttributes},
};

use crate::compositor::RenderBackend;
use crate::config::Configuration;
use crate::engine::{EngineState, PreviewEngine};
use crate::events::{CursorHint, PointerEvent, PointerPhase, UiAffordance};
use crate::surface::{ExportMode, GpuContext};

const WINDOW_TITLE: &str = "Tattoo Preview";
const MOUSE_POINTER: u64 = 0;
/// Pixels of trackpad scroll treated as one wheel line.
const PIXELS_PER_LINE: f64 = 40.0;

/// What the viewer should load once the engine is up.
#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub photo: String,
    pub art: Option<String>,
    /// Where `S` writes the composite PNG.
    pub save_path: PathBuf,
}

#[derive(Debug)]
enum ViewerEvent {
    Cancelled,
    Processing(bool),
}

/// Maps cursor hints onto the window's cursor icon.
struct WindowCursor {
    window: Arc<Window>,
}

impl UiAffordance for WindowCursor {
    fn set_cursor(&self, hint: CursorHint) {
        let icon = match hint {
            CursorHint::Default => CursorIcon::Default,
            CursorHint::Grab => CursorIcon::Grab,
            CursorHint::Grabbing => CursorIcon::Grabbing,
            CursorHint::Brush { .. } => CursorIcon::Crosshair,
        };
        self.window.set_cursor(icon);
    }
}

struct Presentation {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    ctx: Arc<GpuContext>,
}

struct ViewerApp {
    cfg: Configuration,
    options: ViewerOptions,
    runtime: Handle,
    cancel: CancellationToken,
    proxy: Arc<Mutex<EventLoopProxy<ViewerEvent>>>,
    window: Option<Arc<Window>>,
    presentation: Option<Presentation>,
    engine: Option<PreviewEngine>,
    cursor: PhysicalPosition<f64>,
    mouse_down: bool,
}

impl ViewerApp {
    fn new(
        cfg: Configuration,
        options: ViewerOptions,
        runtime: Handle,
        cancel: CancellationToken,
        proxy: EventLoopProxy<ViewerEvent>,
    ) -> Self {
        Self {
            cfg,
            options,
            runtime,
            cancel,
            proxy: Arc::new(Mutex::new(proxy)),
            window: None,
            presentation: None,
            engine: None,
            cursor: PhysicalPosition::new(0.0, 0.0),
            mouse_down: false,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let attrs = WindowAttributes::default().with_title(WINDOW_TITLE);
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create preview window");
                None
            }
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> Result<()> {
        let (ctx, surface) =
            GpuContext::for_window(window.clone()).context("failed to set up GPU for window")?;
        let caps = surface.get_capabilities(&ctx.adapter);
        // Linear formats keep the window identical to exported PNGs.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| !fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "preview surface configured",
        );

        let ctx = Arc::new(ctx);
        let mut cfg = self.cfg.clone();
        cfg.surface.width = config.width;
        cfg.surface.height = config.height;
        let engine = PreviewEngine::builder(cfg)
            .backend(RenderBackend::Gpu(Arc::clone(&ctx)))
            .affordance(Arc::new(WindowCursor { window }))
            .build();
        let proxy = Arc::clone(&self.proxy);
        engine.on_processing_change(move |busy| {
            let proxy = proxy.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let _ = proxy.send_event(ViewerEvent::Processing(busy));
        });
        engine.on_settings_change(|settings| {
            debug!(
                opacity = settings.opacity,
                scale = settings.scale,
                rotation = settings.rotation,
                "overlay settings updated"
            );
        });

        self.spawn_startup(engine.clone());
        self.engine = Some(engine);
        self.presentation = Some(Presentation {
            surface,
            config,
            ctx,
        });
        Ok(())
    }

    fn spawn_startup(&self, engine: PreviewEngine) {
        let options = self.options.clone();
        let cancel = self.cancel.clone();
        self.runtime.spawn(async move {
            if let Err(err) = engine.initialize().await {
                error!(error = %err, "preview engine failed to initialize");
                cancel.cancel();
                return;
            }
            if let Err(err) = engine.load_base_photo(&options.photo).await {
                error!(error = %err, "failed to load base photo");
            }
            if let Some(art) = options.art.as_deref() {
                if let Err(err) = engine.load_overlay_art(art).await {
                    error!(error = %err, "failed to load overlay artwork");
                }
            }
        });
    }

    fn handle_resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        let Some(presentation) = self.presentation.as_mut() else {
            return;
        };
        presentation.config.width = new_size.width.max(1);
        presentation.config.height = new_size.height.max(1);
        presentation
            .surface
            .configure(&presentation.ctx.device, &presentation.config);
        debug!(
            width = presentation.config.width,
            height = presentation.config.height,
            "preview surface resized",
        );
        if let Some(engine) = self.engine.as_ref() {
            if let Err(err) = engine.resize(presentation.config.width, presentation.config.height) {
                warn!(error = %err, "failed to resize preview");
            }
        }
        self.request_redraw();
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(presentation), Some(engine), Some(window)) = (
            self.presentation.as_ref(),
            self.engine.as_ref(),
            self.window.as_ref(),
        ) else {
            return;
        };

        let frame = match presentation.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated) | Err(SurfaceError::Lost) => {
                info!("preview surface lost; reconfiguring");
                let size = window.inner_size();
                self.handle_resize(size);
                return;
            }
            Err(SurfaceError::OutOfMemory) => {
                error!("preview surface out of memory; exiting event loop");
                event_loop.exit();
                return;
            }
            Err(SurfaceError::Timeout) => {
                warn!("preview surface acquisition timed out");
                self.request_redraw();
                return;
            }
            Err(SurfaceError::Other) => {
                warn!("preview surface reported an unknown error; retrying");
                let size = window.inner_size();
                self.handle_resize(size);
                return;
            }
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        match engine.render_to_view(&view, presentation.config.format) {
            Ok(()) => {}
            Err(crate::Error::NotReady(EngineState::Initializing | EngineState::Uninitialized)) => {}
            Err(err) => warn!(error = %err, "frame render failed"),
        }
        frame.present();
        self.request_redraw();
    }

    fn request_redraw(&self) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn pointer(&self, event: PointerEvent) {
        if let Some(engine) = self.engine.as_ref() {
            engine.handle_pointer(&event);
        }
    }

    fn scale_by_lines(&self, lines: f32) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        let factor = self.cfg.gestures.wheel_scale_step.powf(lines);
        let scale = engine.settings().scale * factor;
        if let Err(err) = engine.update_settings(SettingsPatch::default().scale(scale)) {
            warn!(error = %err, "scale update rejected");
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: &Key) {
        if let Key::Named(NamedKey::Escape) = key {
            info!("escape pressed; closing preview");
            event_loop.exit();
            return;
        }
        let (Key::Character(text), Some(engine)) = (key, self.engine.as_ref()) else {
            return;
        };
        let result = match text.to_lowercase().as_str() {
            "e" => {
                if engine.is_eraser_enabled() {
                    engine.disable_eraser();
                } else {
                    engine.enable_eraser();
                }
                Ok(())
            }
            "a" => engine.apply_erase_mask(),
            "u" => engine.undo_erase().map(|_| ()),
            "c" => engine.clear_erase(),
            "r" => engine.reset_settings().map(|_| ()),
            "b" => {
                let bw = !engine.settings().black_and_white;
                engine
                    .update_settings(SettingsPatch::default().black_and_white(bw))
                    .map(|_| ())
            }
            "m" => {
                let multiply = !engine.settings().multiply;
                engine
                    .update_settings(SettingsPatch::default().multiply(multiply))
                    .map(|_| ())
            }
            "s" => self.save(engine),
            _ => Ok(()),
        };
        if let Err(err) = result {
            warn!(key = %text, error = %err, "preview command failed");
        }
    }

    fn save(&self, engine: &PreviewEngine) -> crate::Result<()> {
        let png = engine.export_png(ExportMode::Composite)?;
        std::fs::write(&self.options.save_path, png)?;
        info!(path = %self.options.save_path.display(), "preview saved");
        Ok(())
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.presentation.is_none() {
            if let Err(err) = self.init_gpu(window) {
                error!(error = ?err, "failed to initialize GPU state");
                event_loop.exit();
                return;
            }
        }

        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("preview window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size);
            }
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size);
            }
            WindowEvent::RedrawRequested => {
                self.draw(event_loop);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = position;
                if self.mouse_down {
                    self.pointer(PointerEvent::moved(
                        MOUSE_POINTER,
                        position.x as f32,
                        position.y as f32,
                    ));
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let (x, y) = (self.cursor.x as f32, self.cursor.y as f32);
                match state {
                    ElementState::Pressed if !self.mouse_down => {
                        self.mouse_down = true;
                        self.pointer(PointerEvent::down(MOUSE_POINTER, x, y));
                    }
                    ElementState::Released if self.mouse_down => {
                        self.mouse_down = false;
                        self.pointer(PointerEvent::up(MOUSE_POINTER, x, y));
                    }
                    _ => {}
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => (pos.y / PIXELS_PER_LINE) as f32,
                };
                if lines != 0.0 {
                    self.scale_by_lines(lines);
                }
            }
            WindowEvent::Touch(touch) => {
                let phase = match touch.phase {
                    TouchPhase::Started => PointerPhase::Down,
                    TouchPhase::Moved => PointerPhase::Move,
                    TouchPhase::Ended => PointerPhase::Up,
                    TouchPhase::Cancelled => PointerPhase::Cancel,
                };
                // Touch ids start above the mouse pointer id.
                self.pointer(PointerEvent::new(
                    touch.id.saturating_add(1),
                    phase,
                    touch.location.x as f32,
                    touch.location.y as f32,
                ));
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                self.handle_key(event_loop, &event.logical_key);
            }
            _ => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("preview received cancellation event");
                event_loop.exit();
            }
            ViewerEvent::Processing(busy) => {
                if let Some(window) = self.window.as_ref() {
                    if busy {
                        window.set_title(&format!("{WINDOW_TITLE} (processing)"));
                    } else {
                        window.set_title(WINDOW_TITLE);
                    }
                }
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(engine) = self.engine.take() {
            engine.dispose();
        }
    }
}

/// Opens the preview window and blocks until it closes or `cancel` fires.
/// Must run on the main thread inside a tokio runtime.
pub fn run_windowed(
    cfg: Configuration,
    options: ViewerOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build preview event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        let proxy = proxy.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let mut app = ViewerApp::new(cfg, options, Handle::current(), cancel, proxy);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("preview event loop failed")
}
