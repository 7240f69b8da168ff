//! Real-time tattoo preview: composites stripped tattoo artwork onto a base
//! photo with depth-aware displacement, skin masking and an eraser.

pub mod compositor;
pub mod config;
pub mod engine;
pub mod eraser;
pub mod error;
pub mod events;
pub mod fetch;
pub mod gesture;
pub mod processing;
pub mod raster;
pub mod segmentation;
pub mod surface;
pub mod viewer;

pub use compositor::{RenderBackend, ShaderCompositor, TextureSlot, UniformPatch, UniformSet};
pub use config::Configuration;
pub use engine::{EngineState, LoadOutcome, PreviewEngine, PreviewEngineBuilder};
pub use eraser::EraserTool;
pub use error::{Error, Result};
pub use events::{CursorHint, PointerEvent, PointerPhase, UiAffordance};
pub use fetch::{ImageFetcher, LocalFetcher, MemoryFetcher};
pub use gesture::{GestureController, GestureEvent, GestureInputError};
pub use preview_model::{BrushSettings, OverlaySettings, SettingsPatch};
pub use raster::RasterAsset;
pub use segmentation::{SegmentationModel, SegmentationProvider};
pub use surface::{ExportMode, RenderSurface};
pub use viewer::{ViewerOptions, run_windowed};
