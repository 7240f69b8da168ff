use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use image::{Rgba, RgbaImage};
use tattoo_preview::config::{BackendKind, Configuration};
use tattoo_preview::fetch::decode_data_uri;
use tattoo_preview::segmentation::{CategoryMask, SegmentationState, SegmentationUnavailable};
use tattoo_preview::{
    BrushSettings, EngineState, Error, LoadOutcome, MemoryFetcher, OverlaySettings, PointerEvent,
    PreviewEngine, SegmentationModel, SettingsPatch,
};

const PHOTO_RGB: [u8; 3] = [180, 140, 110];

fn png(img: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn photo(width: u32, height: u32) -> RgbaImage {
    let [r, g, b] = PHOTO_RGB;
    RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]))
}

fn patterned(width: u32, height: u32) -> RgbaImage {
    let mut img = RgbaImage::new(width, height);
    for (x, y, p) in img.enumerate_pixels_mut() {
        *p = Rgba([(x * 31 % 256) as u8, (y * 47 % 256) as u8, 90, 255]);
    }
    img
}

/// Red ink with one dark background pixel in the corner.
fn artwork() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(4, 4, Rgba([220, 20, 20, 255]));
    img.put_pixel(0, 0, Rgba([5, 5, 5, 255]));
    img
}

fn test_config() -> Configuration {
    let mut cfg = Configuration::default();
    cfg.surface.width = 64;
    cfg.surface.height = 48;
    cfg.surface.mesh_segments = 4;
    cfg.render.backend = BackendKind::Cpu;
    cfg.depth.perspective_k = 0.0;
    cfg.segmentation.hint_outside_segment = 1.0;
    cfg
}

fn fetcher() -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    fetcher
        .insert("photo.png", png(&photo(8, 6)))
        .insert("pattern.png", png(&patterned(8, 6)))
        .insert("art.png", png(&artwork()))
        .insert(
            "dark-art.png",
            png(&RgbaImage::from_pixel(4, 4, Rgba([3, 3, 3, 255]))),
        )
        .insert("broken.png", b"not an image".to_vec());
    fetcher
}

fn engine_with(fetcher: MemoryFetcher) -> PreviewEngine {
    PreviewEngine::builder(test_config())
        .fetcher(Arc::new(fetcher))
        .build()
}

async fn ready_engine() -> PreviewEngine {
    let engine = engine_with(fetcher());
    engine.initialize().await.unwrap();
    engine
}

fn decode(uri: &str) -> RgbaImage {
    image::load_from_memory(&decode_data_uri(uri).unwrap())
        .unwrap()
        .to_rgba8()
}

#[tokio::test]
async fn photo_without_artwork_exports_the_photo() {
    let engine = ready_engine().await;
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(
        engine.load_base_photo("pattern.png").await.unwrap(),
        LoadOutcome::Applied
    );
    let exported = decode(&engine.export_image().unwrap());
    assert_eq!(exported, patterned(8, 6));
}

#[tokio::test]
async fn artwork_is_composited_and_exportable_alone() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();
    engine.load_overlay_art("art.png").await.unwrap();
    engine
        .update_settings(SettingsPatch::default().scale(1.0))
        .unwrap();
    assert_eq!(engine.overlay_url().as_deref(), Some("art.png"));

    let composite = decode(&engine.export_image().unwrap());
    assert_eq!(composite.dimensions(), (8, 6));
    let center = composite.get_pixel(4, 3);
    assert_ne!(center.0[..3], PHOTO_RGB);
    assert!(center[1] < 100, "green should be darkened by red ink: {center:?}");
    assert_eq!(center[3], 255);

    let art = decode(&engine.export_artwork().unwrap());
    assert_eq!(art.dimensions(), (8, 6));
    assert!(art.get_pixel(4, 3)[3] > 0);

    // Every pixel the ink covers firmly differs from the bare photo.
    let bare = photo(8, 6);
    let covered: Vec<(u32, u32)> = art
        .enumerate_pixels()
        .filter(|(_, _, p)| p[3] > 128)
        .map(|(x, y, _)| (x, y))
        .collect();
    assert!(!covered.is_empty());
    for (x, y) in covered {
        assert_ne!(composite.get_pixel(x, y), bare.get_pixel(x, y), "pixel {x},{y}");
    }
}

#[tokio::test]
async fn unstrippable_artwork_is_kept_as_is() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();
    assert_eq!(
        engine.load_overlay_art("dark-art.png").await.unwrap(),
        LoadOutcome::Applied
    );
    engine
        .update_settings(SettingsPatch::default().scale(1.0))
        .unwrap();
    let art = decode(&engine.export_artwork().unwrap());
    assert!(art.get_pixel(4, 3)[3] > 0);
    let composite = decode(&engine.export_image().unwrap());
    let center = composite.get_pixel(4, 3);
    assert!(
        center.0[..3].iter().zip(PHOTO_RGB).all(|(&c, p)| c < p),
        "dark ink should darken the photo: {center:?}"
    );
}

#[tokio::test]
async fn restrip_replaces_only_the_artwork_texture() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();
    engine.load_overlay_art("art.png").await.unwrap();
    let before = engine.resource_stats();
    assert_eq!(
        engine.restrip_overlay(0.5).await.unwrap(),
        LoadOutcome::Applied
    );
    let after = engine.resource_stats();
    assert_eq!(after.uploaded, before.uploaded + 1);
    assert_eq!(after.released, before.released + 1);
    assert_eq!(after.live, before.live);
}

#[tokio::test]
async fn restrip_without_artwork_does_nothing() {
    let engine = ready_engine().await;
    assert_eq!(
        engine.restrip_overlay(0.3).await.unwrap(),
        LoadOutcome::Superseded
    );
}

#[tokio::test]
async fn erase_mask_hides_artwork_and_undo_restores_it() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();
    engine.load_overlay_art("art.png").await.unwrap();
    engine
        .update_settings(SettingsPatch::default().scale(1.0))
        .unwrap();

    engine.enable_eraser();
    engine.set_brush(BrushSettings {
        size: 200.0,
        hardness: 1.0,
        opacity: 1.0,
        flow: 1.0,
    });
    engine.handle_pointer(&PointerEvent::down(0, 0.0, 24.0));
    engine.handle_pointer(&PointerEvent::moved(0, 32.0, 24.0));
    engine.handle_pointer(&PointerEvent::up(0, 64.0, 24.0));
    assert_eq!(engine.erase_stroke_count(), 1);
    // Eraser input never moves the overlay.
    assert_eq!(engine.settings().offset, [0.0, 0.0]);

    engine.apply_erase_mask().unwrap();
    assert!(engine.uniforms().unwrap().erase_active);
    let art = decode(&engine.export_artwork().unwrap());
    assert!(art.pixels().all(|p| p[3] == 0));
    let composite = decode(&engine.export_image().unwrap());
    assert_eq!(composite, photo(8, 6));

    assert!(engine.undo_erase().unwrap());
    assert_eq!(engine.erase_stroke_count(), 0);
    let art = decode(&engine.export_artwork().unwrap());
    assert!(art.get_pixel(4, 3)[3] > 0);

    engine.clear_erase().unwrap();
    assert!(!engine.uniforms().unwrap().erase_active);
}

#[tokio::test]
async fn new_artwork_clears_the_eraser() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();
    engine.load_overlay_art("art.png").await.unwrap();
    engine.enable_eraser();
    engine.handle_pointer(&PointerEvent::down(0, 10.0, 10.0));
    engine.handle_pointer(&PointerEvent::up(0, 20.0, 10.0));
    engine.apply_erase_mask().unwrap();
    assert_eq!(engine.erase_stroke_count(), 1);

    engine.load_overlay_art("dark-art.png").await.unwrap();
    assert_eq!(engine.erase_stroke_count(), 0);
    assert!(!engine.uniforms().unwrap().erase_active);
}

#[tokio::test]
async fn later_photo_load_supersedes_earlier_one() {
    let mut fetcher = fetcher();
    fetcher.insert_delayed("slow.png", png(&photo(8, 6)), Duration::from_millis(300));
    let engine = engine_with(fetcher);
    engine.initialize().await.unwrap();

    let slow = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.load_base_photo("slow.png").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        engine.load_base_photo("pattern.png").await.unwrap(),
        LoadOutcome::Applied
    );
    assert_eq!(slow.await.unwrap().unwrap(), LoadOutcome::Superseded);

    let exported = decode(&engine.export_image().unwrap());
    assert_eq!(exported, patterned(8, 6));
}

#[tokio::test]
async fn later_artwork_load_supersedes_earlier_one() {
    let mut fetcher = fetcher();
    fetcher.insert_delayed("slow-art.png", png(&artwork()), Duration::from_millis(300));
    let engine = engine_with(fetcher);
    engine.initialize().await.unwrap();
    engine.load_base_photo("photo.png").await.unwrap();

    let slow = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.load_overlay_art("slow-art.png").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        engine.load_overlay_art("dark-art.png").await.unwrap(),
        LoadOutcome::Applied
    );
    assert_eq!(slow.await.unwrap().unwrap(), LoadOutcome::Superseded);
    assert_eq!(engine.overlay_url().as_deref(), Some("dark-art.png"));
}

#[tokio::test]
async fn restrip_does_not_cancel_a_pending_artwork_load() {
    let mut fetcher = fetcher();
    let wide = RgbaImage::from_pixel(8, 4, Rgba([220, 20, 20, 255]));
    fetcher.insert_delayed("wide-art.png", png(&wide), Duration::from_millis(200));
    let engine = engine_with(fetcher);
    engine.initialize().await.unwrap();
    engine.load_base_photo("photo.png").await.unwrap();
    engine.load_overlay_art("art.png").await.unwrap();

    let pending = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.load_overlay_art("wide-art.png").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        engine.restrip_overlay(0.2).await.unwrap(),
        LoadOutcome::Applied
    );
    assert_eq!(pending.await.unwrap().unwrap(), LoadOutcome::Applied);
    assert_eq!(engine.overlay_url().as_deref(), Some("wide-art.png"));
    assert_eq!(engine.uniforms().unwrap().overlay_aspect, 2.0);
}

#[tokio::test]
async fn failed_load_keeps_previous_photo() {
    let engine = ready_engine().await;
    engine.load_base_photo("pattern.png").await.unwrap();

    let err = engine.load_base_photo("missing.png").await.unwrap_err();
    assert!(matches!(err, Error::Load { .. }), "unexpected error {err:?}");
    let err = engine.load_base_photo("broken.png").await.unwrap_err();
    assert!(matches!(err, Error::Load { .. }), "unexpected error {err:?}");
    let err = engine.load_overlay_art("missing.png").await.unwrap_err();
    assert!(matches!(err, Error::Load { .. }), "unexpected error {err:?}");

    let exported = decode(&engine.export_image().unwrap());
    assert_eq!(exported, patterned(8, 6));
    assert!(!engine.is_processing());
}

#[tokio::test]
async fn operations_before_initialize_are_not_ready() {
    let engine = engine_with(fetcher());
    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert!(matches!(
        engine.load_base_photo("photo.png").await,
        Err(Error::NotReady(EngineState::Uninitialized))
    ));
    assert!(matches!(
        engine.export_image(),
        Err(Error::NotReady(EngineState::Uninitialized))
    ));
    assert!(engine.uniforms().is_none());
}

#[tokio::test]
async fn export_before_any_photo_has_nothing_to_export() {
    let engine = ready_engine().await;
    assert!(matches!(engine.export_image(), Err(Error::NothingToExport)));
}

#[tokio::test]
async fn concurrent_initialize_is_idempotent() {
    let engine = engine_with(fetcher());
    let (a, b) = tokio::join!(engine.initialize(), engine.initialize());
    a.unwrap();
    b.unwrap();
    engine.initialize().await.unwrap();
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(engine.resource_stats().uploaded, 0);
}

#[tokio::test]
async fn replaced_textures_are_released_once() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();
    let stats = engine.resource_stats();
    assert_eq!((stats.uploaded, stats.released, stats.live), (3, 0, 3));

    engine.load_base_photo("pattern.png").await.unwrap();
    let stats = engine.resource_stats();
    assert_eq!((stats.uploaded, stats.released, stats.live), (6, 3, 3));

    engine.load_overlay_art("art.png").await.unwrap();
    let stats = engine.resource_stats();
    assert_eq!((stats.uploaded, stats.released, stats.live), (7, 3, 4));
}

#[tokio::test]
async fn settings_merge_clamp_and_notify() {
    let engine = ready_engine().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        engine.on_settings_change(move |settings| seen.lock().unwrap().push(*settings));
    }

    let next = engine
        .update_settings(SettingsPatch::default().opacity(5.0).rotation(0.5))
        .unwrap();
    assert_eq!(next.opacity, 1.0);
    assert_eq!(next.rotation, 0.5);
    assert_eq!(next.scale, OverlaySettings::default().scale);

    let uniforms = engine.uniforms().unwrap();
    assert_eq!(uniforms.opacity, 1.0);
    assert_eq!(uniforms.rotation, 0.5);
    assert_eq!(uniforms.contrast, 1.3);

    let next = engine
        .update_settings(SettingsPatch::default().scale(f32::NAN).multiply(false))
        .unwrap();
    assert_eq!(next.scale, OverlaySettings::default().scale);
    assert!(!next.multiply);

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], next);
    }

    let reset = engine.reset_settings().unwrap();
    assert_eq!(reset, OverlaySettings::default());
    assert_eq!(engine.settings(), OverlaySettings::default());
    assert_eq!(engine.uniforms().unwrap().opacity, 0.8);
    assert_eq!(seen.lock().unwrap().last().copied(), Some(reset));
}

#[tokio::test]
async fn large_scale_round_trips() {
    let engine = ready_engine().await;
    let next = engine
        .update_settings(SettingsPatch::default().scale(5000.0))
        .unwrap();
    assert_eq!(next.scale, 5000.0);
    assert_eq!(engine.settings().scale, 5000.0);
    assert_eq!(engine.uniforms().unwrap().scale, 5000.0);
}

#[tokio::test]
async fn processing_flag_brackets_loads() {
    let engine = ready_engine().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        engine.on_processing_change(move |busy| seen.lock().unwrap().push(busy));
    }
    engine.load_base_photo("photo.png").await.unwrap();
    let _ = engine.load_overlay_art("missing.png").await;
    assert_eq!(*seen.lock().unwrap(), vec![true, false, true, false]);
    assert!(!engine.is_processing());
}

#[tokio::test]
async fn drag_moves_overlay_in_quad_units() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();

    engine.handle_pointer(&PointerEvent::down(0, 10.0, 10.0));
    engine.handle_pointer(&PointerEvent::moved(0, 42.0, 10.0));
    let offset = engine.settings().offset;
    assert!((offset[0] - 0.5).abs() < 1e-5, "offset {offset:?}");
    assert!(offset[1].abs() < 1e-5);

    engine.handle_pointer(&PointerEvent::moved(0, 42.0, 34.0));
    let offset = engine.settings().offset;
    assert!((offset[1] - 0.5).abs() < 1e-5, "offset {offset:?}");
    engine.handle_pointer(&PointerEvent::up(0, 42.0, 34.0));

    // A second drag starts from where the first left off.
    engine.handle_pointer(&PointerEvent::down(0, 0.0, 0.0));
    engine.handle_pointer(&PointerEvent::moved(0, -32.0, 0.0));
    let offset = engine.settings().offset;
    assert!(offset[0].abs() < 1e-5, "offset {offset:?}");
    assert_eq!(engine.uniforms().unwrap().offset, offset);
}

#[tokio::test]
async fn pinch_scales_and_twist_rotates() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();

    engine.handle_pointer(&PointerEvent::down(1, 10.0, 10.0));
    engine.handle_pointer(&PointerEvent::down(2, 20.0, 10.0));
    engine.handle_pointer(&PointerEvent::moved(2, 30.0, 10.0));
    let settings = engine.settings();
    assert!((settings.scale - 0.2).abs() < 1e-6, "scale {}", settings.scale);
    assert_eq!(settings.offset, [0.0, 0.0]);

    engine.handle_pointer(&PointerEvent::moved(2, 10.0, 30.0));
    let settings = engine.settings();
    assert!((settings.rotation - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    assert!((settings.scale - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn disabled_gestures_leave_settings_alone() {
    let mut cfg = test_config();
    cfg.gestures.enabled = false;
    let engine = PreviewEngine::builder(cfg)
        .fetcher(Arc::new(fetcher()))
        .build();
    engine.initialize().await.unwrap();
    engine.load_base_photo("photo.png").await.unwrap();
    engine.handle_pointer(&PointerEvent::down(0, 10.0, 10.0));
    engine.handle_pointer(&PointerEvent::moved(0, 42.0, 10.0));
    assert_eq!(engine.settings(), OverlaySettings::default());
}

#[tokio::test]
async fn resize_updates_surface_and_erase_rect() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();
    engine.resize(128, 48).unwrap();
    assert_eq!(engine.render_frame().unwrap().dimensions(), (128, 48));
    let rect = engine.uniforms().unwrap().erase_rect;
    assert!((rect[0] - 0.25).abs() < 1e-6);
    assert!((rect[2] - 0.5).abs() < 1e-6);

    engine.resize(0, 0).unwrap();
    assert_eq!(engine.render_frame().unwrap().dimensions(), (1, 1));
}

#[tokio::test]
async fn dispose_is_idempotent_and_final() {
    let engine = ready_engine().await;
    engine.load_base_photo("photo.png").await.unwrap();
    engine.dispose();
    engine.dispose();
    assert_eq!(engine.state(), EngineState::Disposed);
    assert!(matches!(
        engine.export_image(),
        Err(Error::NotReady(EngineState::Disposed))
    ));
    assert!(matches!(
        engine.initialize().await,
        Err(Error::NotReady(EngineState::Disposed))
    ));
    assert!(engine.update_settings(SettingsPatch::default()).is_err());
    assert_eq!(engine.resource_stats().live, 0);
}

struct BrokenModel;

impl SegmentationModel for BrokenModel {
    fn initialize(&self) -> BoxFuture<'_, Result<(), SegmentationUnavailable>> {
        Box::pin(async { Err(SegmentationUnavailable::Init("weights missing".into())) })
    }

    fn segment<'a>(
        &'a self,
        _image: &'a RgbaImage,
    ) -> BoxFuture<'a, Result<CategoryMask, SegmentationUnavailable>> {
        Box::pin(async { Err(SegmentationUnavailable::Inference("unreachable".into())) })
    }
}

#[tokio::test]
async fn unavailable_segmentation_degrades_to_heuristic() {
    let engine = PreviewEngine::builder(test_config())
        .fetcher(Arc::new(fetcher()))
        .segmentation_model(Arc::new(BrokenModel))
        .build();
    engine.initialize().await.unwrap();
    assert_eq!(engine.segmentation_state(), SegmentationState::Degraded);
    assert_eq!(
        engine.load_base_photo("photo.png").await.unwrap(),
        LoadOutcome::Applied
    );
}
