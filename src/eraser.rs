//! Brush eraser that carves regions out of the overlay.
//!
//! The canvas holds per-pixel coverage of the overlay, starting fully opaque.
//! Strokes paint with destination-out semantics (`dst *= 1 - src`). Every
//! stroke is kept with the brush it was drawn with so undo, clear and resize
//! can replay the list from scratch through the same painter used live.

use std::sync::Arc;

use image::{Rgba, RgbaImage};
use preview_model::BrushSettings;
use tracing::debug;

use crate::events::{CursorHint, NoAffordance, PointerEvent, PointerPhase, UiAffordance};
use crate::processing::color::{lerp, unit_to_byte};
use crate::raster::{AssetKind, RasterAsset};

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub brush: BrushSettings,
    pub points: Vec<[f32; 2]>,
}

struct Canvas {
    width: u32,
    height: u32,
    coverage: Vec<f32>,
}

fn cell_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            coverage: vec![1.0; cell_count(width, height)],
        }
    }

    fn reset(&mut self) {
        self.coverage.fill(1.0);
    }

    /// Pixel range whose centres may fall within `r` of the given points.
    fn bounds(&self, a: [f32; 2], b: [f32; 2], r: f32) -> (u32, u32, u32, u32) {
        let clamp = |v: f32, max: u32| v.max(0.0).min(max as f32) as u32;
        (
            clamp((a[0].min(b[0]) - r).floor(), self.width),
            clamp((a[0].max(b[0]) + r).ceil() + 1.0, self.width),
            clamp((a[1].min(b[1]) - r).floor(), self.height),
            clamp((a[1].max(b[1]) + r).ceil() + 1.0, self.height),
        )
    }

    fn erase(&mut self, x: u32, y: u32, alpha: f32) {
        let idx = y as usize * self.width as usize + x as usize;
        self.coverage[idx] *= 1.0 - alpha.clamp(0.0, 1.0);
    }

    /// Radial gradient dab with stops `[0, hardness, 1]`.
    fn soft_dab(&mut self, centre: [f32; 2], brush: &BrushSettings) {
        let r = brush.radius();
        if r <= 0.0 {
            return;
        }
        let peak = brush.strength();
        let hardness = brush.hardness.clamp(0.0, 1.0);
        let (x0, x1, y0, y1) = self.bounds(centre, centre, r);
        for y in y0..y1 {
            for x in x0..x1 {
                let t = distance([x as f32 + 0.5, y as f32 + 0.5], centre) / r;
                if t > 1.0 {
                    continue;
                }
                let alpha = if t <= hardness && hardness > 0.0 {
                    lerp(peak, peak * hardness, t / hardness)
                } else {
                    lerp(peak * hardness, 0.0, (t - hardness) / (1.0 - hardness))
                };
                self.erase(x, y, alpha);
            }
        }
    }

    /// Round-capped segment; with `skip_start` the disk at `a` is left alone
    /// because the previous segment already covered it.
    fn hard_segment(&mut self, a: [f32; 2], b: [f32; 2], brush: &BrushSettings, skip_start: bool) {
        let r = brush.radius();
        if r <= 0.0 {
            return;
        }
        let alpha = brush.strength();
        let (x0, x1, y0, y1) = self.bounds(a, b, r);
        for y in y0..y1 {
            for x in x0..x1 {
                let p = [x as f32 + 0.5, y as f32 + 0.5];
                if segment_distance(p, a, b) > r {
                    continue;
                }
                if skip_start && distance(p, a) <= r {
                    continue;
                }
                self.erase(x, y, alpha);
            }
        }
    }
}

/// Incremental stroke rasterization shared by live painting and replay.
#[derive(Debug, Default, Clone, Copy)]
struct StrokePainter {
    last: Option<[f32; 2]>,
    /// Path length since the last soft dab.
    carry: f32,
}

impl StrokePainter {
    fn begin(&mut self, canvas: &mut Canvas, brush: &BrushSettings, p: [f32; 2]) {
        if brush.is_hard() {
            canvas.hard_segment(p, p, brush, false);
        } else {
            canvas.soft_dab(p, brush);
        }
        self.last = Some(p);
        self.carry = 0.0;
    }

    fn extend(&mut self, canvas: &mut Canvas, brush: &BrushSettings, p: [f32; 2]) {
        let Some(a) = self.last else {
            self.begin(canvas, brush, p);
            return;
        };
        let len = distance(a, p);
        if len <= 0.0 {
            return;
        }
        if brush.is_hard() {
            canvas.hard_segment(a, p, brush, true);
        } else {
            let spacing = (brush.radius() * 0.25).max(1.0);
            let mut d = spacing - self.carry;
            while d <= len {
                let t = d / len;
                canvas.soft_dab([lerp(a[0], p[0], t), lerp(a[1], p[1], t)], brush);
                d += spacing;
            }
            self.carry = len - (d - spacing);
        }
        self.last = Some(p);
    }
}

struct ActiveStroke {
    pointer: Option<u64>,
    stroke: Stroke,
    painter: StrokePainter,
}

pub struct EraserTool {
    canvas: Canvas,
    brush: BrushSettings,
    strokes: Vec<Stroke>,
    active: Option<ActiveStroke>,
    enabled: bool,
    affordance: Arc<dyn UiAffordance>,
}

impl EraserTool {
    pub fn new(width: u32, height: u32, brush: BrushSettings) -> Self {
        Self {
            canvas: Canvas::new(width, height),
            brush,
            strokes: Vec::new(),
            active: None,
            enabled: false,
            affordance: Arc::new(NoAffordance),
        }
    }

    pub fn set_affordance(&mut self, affordance: Arc<dyn UiAffordance>) {
        self.affordance = affordance;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.canvas.width, self.canvas.height)
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.affordance.set_cursor(CursorHint::Brush {
            diameter: self.brush.size,
        });
    }

    /// Finishes any stroke in progress and restores the default cursor.
    pub fn disable(&mut self) {
        self.end_stroke();
        self.enabled = false;
        self.affordance.set_cursor(CursorHint::Default);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn brush(&self) -> BrushSettings {
        self.brush
    }

    /// Applies to strokes started afterwards.
    pub fn set_brush(&mut self, brush: BrushSettings) {
        self.brush = brush;
        if self.enabled {
            self.affordance.set_cursor(CursorHint::Brush {
                diameter: brush.size,
            });
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    pub fn begin_stroke(&mut self, position: [f32; 2]) {
        self.start(None, position);
    }

    fn start(&mut self, pointer: Option<u64>, position: [f32; 2]) {
        if !is_finite(position) {
            return;
        }
        self.end_stroke();
        let mut painter = StrokePainter::default();
        painter.begin(&mut self.canvas, &self.brush, position);
        self.active = Some(ActiveStroke {
            pointer,
            stroke: Stroke {
                brush: self.brush,
                points: vec![position],
            },
            painter,
        });
    }

    pub fn extend_stroke(&mut self, position: [f32; 2]) {
        if !is_finite(position) {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            let brush = active.stroke.brush;
            active.painter.extend(&mut self.canvas, &brush, position);
            active.stroke.points.push(position);
        }
    }

    /// Commits the stroke in progress; returns whether there was one.
    pub fn end_stroke(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                debug!(points = active.stroke.points.len(), "erase stroke committed");
                self.strokes.push(active.stroke);
                true
            }
            None => false,
        }
    }

    /// Routes a pointer sample while enabled. Only the pointer that started
    /// the stroke extends it. Returns `true` when a stroke was committed.
    pub fn handle_pointer(&mut self, event: &PointerEvent) -> bool {
        if !self.enabled {
            return false;
        }
        let owner = self.active.as_ref().map(|active| active.pointer);
        match (event.phase, owner) {
            (PointerPhase::Down, None) => {
                self.start(Some(event.id), event.position);
                false
            }
            (PointerPhase::Move, Some(Some(id))) if id == event.id => {
                self.extend_stroke(event.position);
                false
            }
            (PointerPhase::Up | PointerPhase::Cancel, Some(Some(id))) if id == event.id => {
                self.extend_stroke(event.position);
                self.end_stroke()
            }
            _ => false,
        }
    }

    /// Drops the most recent stroke and replays the rest.
    pub fn undo(&mut self) -> bool {
        self.end_stroke();
        if self.strokes.pop().is_none() {
            return false;
        }
        self.replay();
        debug!(remaining = self.strokes.len(), "erase stroke undone");
        true
    }

    pub fn clear_all(&mut self) {
        self.active = None;
        self.strokes.clear();
        self.canvas.reset();
        debug!("erase canvas cleared");
    }

    /// Reallocates the canvas and replays every stroke at the new size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.end_stroke();
        if (width.max(1), height.max(1)) == self.size() {
            return;
        }
        self.canvas = Canvas::new(width, height);
        self.replay();
    }

    fn replay(&mut self) {
        self.canvas.reset();
        for stroke in &self.strokes {
            let mut painter = StrokePainter::default();
            let mut points = stroke.points.iter();
            if let Some(first) = points.next() {
                painter.begin(&mut self.canvas, &stroke.brush, *first);
            }
            for point in points {
                painter.extend(&mut self.canvas, &stroke.brush, *point);
            }
        }
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Overlay coverage as drawn: white, alpha is what remains.
    pub fn export_canvas(&self) -> RgbaImage {
        self.render(|coverage| coverage)
    }

    /// Erased amount per pixel in the alpha channel, as the compositor reads it.
    pub fn erase_mask(&self) -> RasterAsset {
        RasterAsset::generated(AssetKind::EraseMask, self.render(|coverage| 1.0 - coverage))
    }

    fn render(&self, alpha: impl Fn(f32) -> f32) -> RgbaImage {
        let mut out = RgbaImage::new(self.canvas.width, self.canvas.height);
        for (pixel, coverage) in out.pixels_mut().zip(&self.canvas.coverage) {
            *pixel = Rgba([255, 255, 255, unit_to_byte(alpha(*coverage))]);
        }
        out
    }
}

fn is_finite(p: [f32; 2]) -> bool {
    p[0].is_finite() && p[1].is_finite()
}

fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

fn segment_distance(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let len2 = ab[0] * ab[0] + ab[1] * ab[1];
    if len2 <= f32::EPSILON {
        return distance(p, a);
    }
    let t = (((p[0] - a[0]) * ab[0] + (p[1] - a[1]) * ab[1]) / len2).clamp(0.0, 1.0);
    distance(p, [a[0] + ab[0] * t, a[1] + ab[1] * t])
}
