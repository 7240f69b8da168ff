//! Pointer gesture recognition: one-finger drag, two-finger pinch and twist.

use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::events::{CursorHint, NoAffordance, PointerEvent, PointerPhase, UiAffordance};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    DragStart { position: [f32; 2] },
    /// Screen-space delta since the drag started.
    DragMove { delta: [f32; 2] },
    DragEnd,
    /// Pinch distance relative to the previous sample.
    ScaleChange(f32),
    /// Twist angle relative to the previous sample, in `(-PI, PI]`.
    RotationChange(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GestureInputError {
    #[error("pointer {0} is already down")]
    DuplicateDown(u64),
    #[error("pointer {0} reported a non-finite position")]
    NonFinite(u64),
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    pointer: u64,
    origin: [f32; 2],
}

#[derive(Debug, Clone, Copy)]
struct Pinch {
    distance: f32,
    angle: f32,
}

pub struct GestureController {
    enabled: bool,
    pointers: Vec<(u64, [f32; 2])>,
    drag: Option<Drag>,
    pinch: Option<Pinch>,
    affordance: Arc<dyn UiAffordance>,
}

impl Default for GestureController {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureController {
    pub fn new() -> Self {
        Self {
            enabled: true,
            pointers: Vec::new(),
            drag: None,
            pinch: None,
            affordance: Arc::new(NoAffordance),
        }
    }

    pub fn set_affordance(&mut self, affordance: Arc<dyn UiAffordance>) {
        self.affordance = affordance;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        self.reset();
        self.affordance.set_cursor(if enabled {
            CursorHint::Grab
        } else {
            CursorHint::Default
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch.is_some()
    }

    pub fn active_pointers(&self) -> usize {
        self.pointers.len()
    }

    /// Forgets every tracked pointer without emitting events.
    pub fn reset(&mut self) {
        self.pointers.clear();
        self.drag = None;
        self.pinch = None;
    }

    /// Malformed input is logged and resets the recognizer.
    pub fn handle(&mut self, event: &PointerEvent) -> Vec<GestureEvent> {
        if !self.enabled {
            return Vec::new();
        }
        match self.try_handle(event) {
            Ok(events) => events,
            Err(err) => {
                debug!(error = %err, "ignoring malformed pointer input");
                self.reset();
                self.affordance.set_cursor(CursorHint::Grab);
                Vec::new()
            }
        }
    }

    pub fn try_handle(
        &mut self,
        event: &PointerEvent,
    ) -> Result<Vec<GestureEvent>, GestureInputError> {
        let [x, y] = event.position;
        if !x.is_finite() || !y.is_finite() {
            return Err(GestureInputError::NonFinite(event.id));
        }
        let mut out = Vec::new();
        match event.phase {
            PointerPhase::Down => {
                if self.index_of(event.id).is_some() {
                    return Err(GestureInputError::DuplicateDown(event.id));
                }
                self.pointers.push((event.id, event.position));
                match self.pointers.len() {
                    1 => self.start_drag(event.id, event.position, &mut out),
                    2 => {
                        if self.drag.take().is_some() {
                            out.push(GestureEvent::DragEnd);
                        }
                        self.pinch = self.pinch_baseline();
                    }
                    _ => {}
                }
            }
            PointerPhase::Move => {
                let Some(idx) = self.index_of(event.id) else {
                    return Ok(out);
                };
                self.pointers[idx].1 = event.position;
                if let Some(prev) = self.pinch {
                    if let Some(next) = self.pinch_baseline() {
                        if prev.distance > f32::EPSILON {
                            out.push(GestureEvent::ScaleChange(next.distance / prev.distance));
                        }
                        out.push(GestureEvent::RotationChange(wrap_angle(next.angle - prev.angle)));
                        self.pinch = Some(next);
                    }
                } else if let Some(drag) = self.drag.filter(|drag| drag.pointer == event.id) {
                    out.push(GestureEvent::DragMove {
                        delta: [x - drag.origin[0], y - drag.origin[1]],
                    });
                }
            }
            PointerPhase::Up | PointerPhase::Cancel => {
                let Some(idx) = self.index_of(event.id) else {
                    return Ok(out);
                };
                self.pointers.remove(idx);
                match self.pointers.len() {
                    0 => {
                        if self.drag.take().is_some() {
                            out.push(GestureEvent::DragEnd);
                            self.affordance.set_cursor(CursorHint::Grab);
                        }
                        self.pinch = None;
                    }
                    1 => {
                        self.pinch = None;
                        let (id, position) = self.pointers[0];
                        if self.drag.is_none() {
                            self.start_drag(id, position, &mut out);
                        }
                    }
                    _ => self.pinch = self.pinch_baseline(),
                }
            }
        }
        Ok(out)
    }

    fn start_drag(&mut self, pointer: u64, position: [f32; 2], out: &mut Vec<GestureEvent>) {
        self.drag = Some(Drag {
            pointer,
            origin: position,
        });
        out.push(GestureEvent::DragStart { position });
        self.affordance.set_cursor(CursorHint::Grabbing);
    }

    fn index_of(&self, id: u64) -> Option<usize> {
        self.pointers.iter().position(|(pid, _)| *pid == id)
    }

    /// Distance and angle between the first two pointers.
    fn pinch_baseline(&self) -> Option<Pinch> {
        let (_, a) = self.pointers.first()?;
        let (_, b) = self.pointers.get(1)?;
        let dx = b[0] - a[0];
        let dy = b[1] - a[1];
        Some(Pinch {
            distance: (dx * dx + dy * dy).sqrt(),
            angle: dy.atan2(dx),
        })
    }
}

/// Wraps an angle into `(-PI, PI]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pointer_drags() {
        let mut g = GestureController::new();
        assert_eq!(
            g.handle(&PointerEvent::down(0, 10.0, 10.0)),
            vec![GestureEvent::DragStart {
                position: [10.0, 10.0]
            }]
        );
        assert_eq!(
            g.handle(&PointerEvent::moved(0, 15.0, 12.0)),
            vec![GestureEvent::DragMove { delta: [5.0, 2.0] }]
        );
        assert_eq!(
            g.handle(&PointerEvent::moved(0, 20.0, 10.0)),
            vec![GestureEvent::DragMove { delta: [10.0, 0.0] }]
        );
        assert_eq!(
            g.handle(&PointerEvent::up(0, 20.0, 10.0)),
            vec![GestureEvent::DragEnd]
        );
        assert!(!g.is_dragging());
    }

    #[test]
    fn second_pointer_turns_drag_into_pinch() {
        let mut g = GestureController::new();
        g.handle(&PointerEvent::down(1, 0.0, 0.0));
        assert_eq!(
            g.handle(&PointerEvent::down(2, 10.0, 0.0)),
            vec![GestureEvent::DragEnd]
        );
        assert!(g.is_pinching());

        let events = g.handle(&PointerEvent::moved(2, 20.0, 0.0));
        assert_eq!(
            events,
            vec![
                GestureEvent::ScaleChange(2.0),
                GestureEvent::RotationChange(0.0)
            ]
        );

        let events = g.handle(&PointerEvent::moved(2, 0.0, 20.0));
        let GestureEvent::ScaleChange(ratio) = events[0] else {
            panic!("expected scale change, got {events:?}");
        };
        let GestureEvent::RotationChange(angle) = events[1] else {
            panic!("expected rotation change, got {events:?}");
        };
        assert!((ratio - 1.0).abs() < 1e-6);
        assert!((angle - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn pinch_ratios_are_relative_to_previous_frame() {
        let mut g = GestureController::new();
        g.handle(&PointerEvent::down(1, 0.0, 0.0));
        g.handle(&PointerEvent::down(2, 100.0, 0.0));

        let ratios: Vec<f32> = [150.0, 120.0]
            .into_iter()
            .map(|x| {
                let events = g.handle(&PointerEvent::moved(2, x, 0.0));
                match events[0] {
                    GestureEvent::ScaleChange(ratio) => ratio,
                    _ => panic!("expected scale change, got {events:?}"),
                }
            })
            .collect();
        assert!((ratios[0] - 1.5).abs() < 1e-6, "ratios {ratios:?}");
        assert!((ratios[1] - 0.8).abs() < 1e-6, "ratios {ratios:?}");
    }

    #[test]
    fn lifting_one_of_two_restarts_drag() {
        let mut g = GestureController::new();
        g.handle(&PointerEvent::down(1, 0.0, 0.0));
        g.handle(&PointerEvent::down(2, 10.0, 0.0));
        g.handle(&PointerEvent::moved(1, 3.0, 4.0));
        assert_eq!(
            g.handle(&PointerEvent::up(2, 10.0, 0.0)),
            vec![GestureEvent::DragStart {
                position: [3.0, 4.0]
            }]
        );
        assert_eq!(
            g.handle(&PointerEvent::moved(1, 4.0, 4.0)),
            vec![GestureEvent::DragMove { delta: [1.0, 0.0] }]
        );
    }

    #[test]
    fn rotation_wraps_across_pi() {
        let mut g = GestureController::new();
        g.handle(&PointerEvent::down(1, 0.0, 0.0));
        g.handle(&PointerEvent::down(2, -10.0, 0.1));
        let events = g.handle(&PointerEvent::moved(2, -10.0, -0.1));
        let Some(GestureEvent::RotationChange(delta)) = events.last().copied() else {
            panic!("expected rotation change, got {events:?}");
        };
        assert!(delta > 0.0 && delta < 0.05, "delta {delta}");
    }

    #[test]
    fn duplicate_down_resets_state() {
        let mut g = GestureController::new();
        g.handle(&PointerEvent::down(1, 0.0, 0.0));
        assert!(matches!(
            g.try_handle(&PointerEvent::down(1, 0.0, 0.0)),
            Err(GestureInputError::DuplicateDown(1))
        ));
        assert!(g.handle(&PointerEvent::down(1, 0.0, 0.0)).is_empty());
        assert!(!g.is_dragging());
        assert_eq!(g.active_pointers(), 0);
        assert!(g.handle(&PointerEvent::moved(1, 5.0, 5.0)).is_empty());
    }

    #[test]
    fn non_finite_input_is_ignored() {
        let mut g = GestureController::new();
        g.handle(&PointerEvent::down(1, 0.0, 0.0));
        assert!(g.handle(&PointerEvent::moved(1, f32::NAN, 0.0)).is_empty());
        assert_eq!(g.active_pointers(), 0);
    }

    #[test]
    fn unknown_pointers_are_ignored() {
        let mut g = GestureController::new();
        assert!(g.handle(&PointerEvent::moved(7, 1.0, 1.0)).is_empty());
        assert!(g.handle(&PointerEvent::up(7, 1.0, 1.0)).is_empty());
    }

    #[test]
    fn disabled_controller_emits_nothing() {
        let mut g = GestureController::new();
        g.set_enabled(false);
        assert!(g.handle(&PointerEvent::down(0, 1.0, 1.0)).is_empty());
        assert_eq!(g.active_pointers(), 0);
    }

    #[test]
    fn wrap_angle_range() {
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-5);
        assert!((wrap_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        assert!((wrap_angle(PI) - PI).abs() < 1e-6);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-6);
    }
}
