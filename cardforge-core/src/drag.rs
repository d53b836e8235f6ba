//! Drag Controller - Manual Placement of Overlay Elements
//!
//! Pointer and touch gestures become manual overrides on the designated
//! overlay elements while drag mode is on. Moves are coalesced to one
//! update per animation frame. Manual placement is ephemeral: it is cleared
//! whenever drag mode turns off.

use std::collections::BTreeSet;

use crate::layout::{aspect_ratio, default_box};
use crate::schema::Orientation;
use crate::state::{CompositionState, ManualOverride, OverlayElement};

pub const MIN_SCALE: f32 = 0.2;
pub const MAX_SCALE: f32 = 5.0;
pub const WHEEL_STEP: f32 = 0.1;
/// Z-order of armed elements, above everything else on the card.
pub const ARMED_Z_INDEX: i32 = 1000;

/// Position in live preview pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragPhase {
    Idle,
    Dragging {
        element: OverlayElement,
        start: Point,
        origin: (f32, f32),
        scale: f32,
    },
}

#[derive(Debug)]
pub struct DragController {
    armed: BTreeSet<OverlayElement>,
    listeners: BTreeSet<OverlayElement>,
    phase: DragPhase,
    pending_move: Option<Point>,
    viewport_width: f32,
}

impl DragController {
    pub fn new(viewport_width: f32) -> Self {
        Self {
            armed: BTreeSet::new(),
            listeners: BTreeSet::new(),
            phase: DragPhase::Idle,
            pending_move: None,
            viewport_width,
        }
    }

    pub fn set_viewport_width(&mut self, width: f32) {
        self.viewport_width = width;
    }

    pub fn is_enabled(&self) -> bool {
        !self.armed.is_empty()
    }

    pub fn is_armed(&self, element: OverlayElement) -> bool {
        self.armed.contains(&element)
    }

    /// Whether pointer-down, touch-start and wheel listeners are attached.
    pub fn has_listeners(&self, element: OverlayElement) -> bool {
        self.listeners.contains(&element)
    }

    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    pub fn z_index(&self, element: OverlayElement) -> Option<i32> {
        self.is_armed(element).then_some(ARMED_Z_INDEX)
    }

    /// Arm every overlay element. Refused on vertical cards.
    pub fn enable(&mut self, state: &CompositionState) -> bool {
        if state.orientation() == Orientation::Vertical {
            tracing::debug!("drag mode unavailable on vertical cards");
            return false;
        }
        for element in OverlayElement::ALL {
            self.armed.insert(element);
            self.listeners.insert(element);
        }
        true
    }

    /// Detach listeners, end any gesture and drop all manual overrides.
    pub fn disable(&mut self, state: &mut CompositionState) {
        self.armed.clear();
        self.listeners.clear();
        self.phase = DragPhase::Idle;
        self.pending_move = None;
        state.clear_manual_overrides();
    }

    /// Idle -> Dragging when `element` is armed and nothing else is dragged.
    pub fn pointer_down(
        &mut self,
        state: &CompositionState,
        element: OverlayElement,
        at: Point,
    ) -> bool {
        if !self.has_listeners(element) || !self.is_armed(element) {
            return false;
        }
        if matches!(self.phase, DragPhase::Dragging { .. }) {
            return false;
        }

        let (origin, scale) = match state.manual_override(element) {
            Some(o) => ((o.x, o.y), o.scale),
            None => {
                let b = default_box(element.into(), state.orientation());
                ((b.x, b.y), 1.0)
            }
        };
        self.phase = DragPhase::Dragging { element, start: at, origin, scale };
        true
    }

    /// Record a move. Only the latest position before the next frame is kept.
    pub fn pointer_move(&mut self, at: Point) {
        if matches!(self.phase, DragPhase::Dragging { .. }) {
            self.pending_move = Some(at);
        }
    }

    /// Animation-frame tick: apply the coalesced move, if any.
    pub fn animation_frame(&mut self, state: &mut CompositionState) -> bool {
        let DragPhase::Dragging { element, start, origin, scale } = self.phase else {
            return false;
        };
        let Some(at) = self.pending_move.take() else {
            return false;
        };
        if self.viewport_width <= 0.0 {
            return false;
        }

        let height = self.viewport_width * aspect_ratio(state.orientation());
        let x = origin.0 + (at.x - start.x) / self.viewport_width;
        let y = origin.1 + (at.y - start.y) / height;
        state.set_manual_override(element, ManualOverride { x, y, scale });
        true
    }

    /// Dragging -> Idle; a pending coalesced move is dropped.
    pub fn pointer_up(&mut self) {
        self.phase = DragPhase::Idle;
        self.pending_move = None;
    }

    /// Wheel zoom on an armed element. Returns the new scale.
    pub fn wheel(
        &mut self,
        state: &mut CompositionState,
        element: OverlayElement,
        delta_y: f32,
    ) -> Option<f32> {
        if !self.is_armed(element) {
            return None;
        }

        let current = state.manual_override(element).unwrap_or_else(|| {
            let b = default_box(element.into(), state.orientation());
            ManualOverride { x: b.x, y: b.y, scale: 1.0 }
        });
        let step = if delta_y > 0.0 { -WHEEL_STEP } else { WHEEL_STEP };
        let scale = (current.scale + step).clamp(MIN_SCALE, MAX_SCALE);
        state.set_manual_override(element, ManualOverride { scale, ..current });

        if let DragPhase::Dragging { element: dragged, scale: s, .. } = &mut self.phase {
            if *dragged == element {
                *s = scale;
            }
        }
        Some(scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::CardElement;

    const WIDTH: f32 = 1600.0;

    fn armed() -> (DragController, CompositionState) {
        let state = CompositionState::default();
        let mut drag = DragController::new(WIDTH);
        assert!(drag.enable(&state));
        (drag, state)
    }

    #[test]
    fn test_moves_coalesce_to_latest() {
        let (mut drag, mut state) = armed();
        let origin = default_box(CardElement::Title, state.orientation());

        assert!(drag.pointer_down(&state, OverlayElement::Title, Point::new(100.0, 100.0)));
        drag.pointer_move(Point::new(110.0, 100.0));
        drag.pointer_move(Point::new(260.0, 100.0));
        assert!(drag.animation_frame(&mut state));
        assert!(!drag.animation_frame(&mut state));

        let o = state.manual_override(OverlayElement::Title).unwrap();
        assert!((o.x - (origin.x + 160.0 / WIDTH)).abs() < 1e-6);
        assert!((o.y - origin.y).abs() < 1e-6);
    }

    #[test]
    fn test_pointer_up_cancels_pending_move() {
        let (mut drag, mut state) = armed();
        drag.pointer_down(&state, OverlayElement::StickersGrid, Point::new(0.0, 0.0));
        drag.pointer_move(Point::new(50.0, 50.0));
        drag.pointer_up();

        assert!(!drag.animation_frame(&mut state));
        assert!(state.manual_overrides().is_empty());
        assert_eq!(drag.phase(), DragPhase::Idle);
    }

    #[test]
    fn test_unarmed_ignored() {
        let mut state = CompositionState::default();
        let mut drag = DragController::new(WIDTH);
        assert!(!drag.pointer_down(&state, OverlayElement::Title, Point::new(0.0, 0.0)));
        assert_eq!(drag.wheel(&mut state, OverlayElement::Title, -1.0), None);
        assert!(state.manual_overrides().is_empty());
    }

    #[test]
    fn test_wheel_clamps_scale() {
        let (mut drag, mut state) = armed();
        for _ in 0..100 {
            drag.wheel(&mut state, OverlayElement::ClassificationLabel, -1.0);
        }
        assert_eq!(state.manual_override(OverlayElement::ClassificationLabel).unwrap().scale, MAX_SCALE);

        for _ in 0..100 {
            drag.wheel(&mut state, OverlayElement::ClassificationLabel, 1.0);
        }
        assert_eq!(state.manual_override(OverlayElement::ClassificationLabel).unwrap().scale, MIN_SCALE);
    }

    #[test]
    fn test_disable_clears_everything() {
        let (mut drag, mut state) = armed();
        drag.pointer_down(&state, OverlayElement::Title, Point::new(0.0, 0.0));
        drag.pointer_move(Point::new(10.0, 10.0));
        drag.animation_frame(&mut state);
        drag.wheel(&mut state, OverlayElement::StickersGrid, -1.0);

        drag.disable(&mut state);
        assert!(state.manual_overrides().is_empty());
        assert_eq!(drag.phase(), DragPhase::Idle);
        for element in OverlayElement::ALL {
            assert!(!drag.has_listeners(element));
            assert!(!drag.is_armed(element));
            assert_eq!(drag.z_index(element), None);
        }
    }

    #[test]
    fn test_vertical_refuses_enable() {
        let mut state = CompositionState::default();
        state.set_orientation(Orientation::Vertical);
        let mut drag = DragController::new(WIDTH);
        assert!(!drag.enable(&state));
        assert!(!drag.is_enabled());
    }
}
