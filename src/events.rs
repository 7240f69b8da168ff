use std::sync::Arc;

use preview_model::OverlaySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
}

/// One pointer sample in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub id: u64,
    pub phase: PointerPhase,
    pub position: [f32; 2],
}

impl PointerEvent {
    pub fn new(id: u64, phase: PointerPhase, x: f32, y: f32) -> Self {
        Self {
            id,
            phase,
            position: [x, y],
        }
    }

    pub fn down(id: u64, x: f32, y: f32) -> Self {
        Self::new(id, PointerPhase::Down, x, y)
    }

    pub fn moved(id: u64, x: f32, y: f32) -> Self {
        Self::new(id, PointerPhase::Move, x, y)
    }

    pub fn up(id: u64, x: f32, y: f32) -> Self {
        Self::new(id, PointerPhase::Up, x, y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorHint {
    Default,
    Grab,
    Grabbing,
    /// Brush outline of the given diameter in surface pixels.
    Brush { diameter: f32 },
}

/// Host hook for cursor feedback.
pub trait UiAffordance: Send + Sync {
    fn set_cursor(&self, hint: CursorHint);
}

/// Affordance that ignores every hint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAffordance;

impl UiAffordance for NoAffordance {
    fn set_cursor(&self, _hint: CursorHint) {}
}

pub type SettingsCallback = Arc<dyn Fn(&OverlaySettings) + Send + Sync>;
pub type ProcessingCallback = Arc<dyn Fn(bool) + Send + Sync>;
