use std::io::Write;

use tattoo_preview::config::{BackendKind, Configuration};
use tattoo_preview::processing::DepthAlgorithm;

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.surface.width, 1024);
    assert_eq!(cfg.surface.height, 768);
    assert_eq!(cfg.surface.mesh_segments, 64);
    assert_eq!(cfg.render.backend, BackendKind::Gpu);
    assert_eq!(cfg.depth.algorithm, DepthAlgorithm::GradientAware);
    assert!(cfg.overlay.auto_strip);
    assert!((cfg.overlay.strip_threshold - 0.1).abs() < f32::EPSILON);
    assert!((cfg.overlay.settings.opacity - 0.8).abs() < f32::EPSILON);
    assert!((cfg.overlay.settings.contrast - 1.3).abs() < f32::EPSILON);
    assert!(cfg.overlay.settings.multiply);
    assert!(cfg.gestures.enabled);
    cfg.validated().unwrap();
}

#[test]
fn parse_kebab_case_sections() {
    let yaml = r#"
surface:
  width: 640
  height: 480
  mesh-segments: 16
depth:
  algorithm: luminance
  max-dimension: 256
  blur-radius: 1
  displacement-strength: 0.25
  perspective-k: 0.3
segmentation:
  skin-categories: [2]
  hint-outside-segment: 0.2
overlay:
  auto-strip: false
  strip-threshold: 0.2
  settings:
    opacity: 0.5
    black-and-white: true
eraser:
  size: 12
  hardness: 1.0
gestures:
  drag-sensitivity: 2.0
render:
  backend: cpu
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.surface.width, 640);
    assert_eq!(cfg.surface.mesh_segments, 16);
    assert_eq!(cfg.depth.algorithm, DepthAlgorithm::Luminance);
    assert_eq!(cfg.depth.max_dimension, 256);
    assert!((cfg.depth.perspective_k - 0.3).abs() < f32::EPSILON);
    assert_eq!(cfg.segmentation.skin_categories, vec![2]);
    assert!(!cfg.overlay.auto_strip);
    assert!((cfg.overlay.settings.opacity - 0.5).abs() < f32::EPSILON);
    assert!(cfg.overlay.settings.black_and_white);
    // Unset settings keep their defaults.
    assert!((cfg.overlay.settings.scale - 0.1).abs() < f32::EPSILON);
    assert!((cfg.eraser.size - 12.0).abs() < f32::EPSILON);
    assert!(cfg.eraser.is_hard());
    assert!((cfg.gestures.drag_sensitivity - 2.0).abs() < f32::EPSILON);
    assert_eq!(cfg.render.backend, BackendKind::Cpu);
}

#[test]
fn unknown_fields_are_rejected() {
    let yaml = r#"
surface:
  widht: 640
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());

    let yaml = r#"
overlay:
  settings:
    sparkle: 1.0
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn validation_rejects_out_of_range_values() {
    let cases = [
        "surface:\n  width: 0\n",
        "surface:\n  mesh-segments: 0\n",
        "overlay:\n  strip-threshold: 1.5\n",
        "overlay:\n  settings:\n    opacity: 2.0\n",
        "segmentation:\n  skin-categories: []\n",
        "segmentation:\n  hint-outside-segment: -0.5\n",
        "eraser:\n  hardness: 3.0\n",
        "gestures:\n  wheel-scale-step: 0.5\n",
        "depth:\n  perspective-k: -1.0\n",
    ];
    for yaml in cases {
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validated().is_err(), "accepted invalid config:\n{yaml}");
    }
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "render:\n  backend: cpu\nsurface:\n  width: 320").unwrap();
    let cfg = Configuration::from_yaml_file(file.path())
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(cfg.render.backend, BackendKind::Cpu);
    assert_eq!(cfg.surface.width, 320);
    assert_eq!(cfg.surface.height, 768);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Configuration::from_yaml_file(dir.path().join("absent.yaml")).is_err());
}

#[test]
fn depth_options_respect_max_dimension() {
    let cfg = Configuration::default();
    let options = cfg.depth.options_for(2048, 1024);
    assert_eq!(options.resolution, Some((512, 256)));
    assert_eq!(cfg.depth.options_for(100, 50).resolution, None);
}
