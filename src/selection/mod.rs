//! Drag selection state machine.
//!
//! Tracks pointer and keyboard input over the full-screen overlay and
//! produces a rectangle in viewport CSS pixels:
//!
//! ```text
//! Idle --down(primary)--> Dragging --up(big enough)--> Committed
//!  ^                         |
//!  +------ up(too small) ----+
//! Idle | Dragging --escape / cancel / timeout--> Cancelled
//! ```
//!
//! The session holds no UI. What the overlay should draw is derived from the
//! current state by `SelectionSession::view`.

mod overlay;

pub use overlay::OverlayView;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::CaptureError;
use crate::geometry::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// Raw input delivered by the overlay surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SelectionInput {
    PointerDown { x: f64, y: f64, button: PointerButton },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    Escape,
    ContextMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionState {
    Idle,
    Dragging,
    Committed,
    Cancelled,
}

impl SelectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SelectionState::Committed | SelectionState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CancelReason {
    Escape,
    Timeout,
    /// The host asked to stop, e.g. the user closed the popup.
    Requested,
    /// A newer capture replaced this one.
    Superseded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CancelReason::Escape => "escape pressed",
            CancelReason::Timeout => "selection timed out",
            CancelReason::Requested => "cancel requested",
            CancelReason::Superseded => "superseded by a new capture",
        };
        f.write_str(s)
    }
}

/// What a single input did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionUpdate {
    /// Nothing changed (wrong button, duplicate up, terminal session).
    Ignored,
    /// Pointer moved while idle; crosshair follows it.
    Hover(Point),
    /// Live rectangle changed during a drag.
    Live(Rect),
    /// Released below the minimum size; back to `Idle`, ready for another try.
    TooSmall(CaptureError),
    Committed(Rect),
    Cancelled(CancelReason),
    /// The host should prevent the browser's context menu.
    SuppressContextMenu,
}

/// One interactive region selection.
#[derive(Debug, Clone)]
pub struct SelectionSession {
    state: SelectionState,
    anchor: Option<Point>,
    live: Option<Rect>,
    cursor: Option<Point>,
    committed: Option<Rect>,
    rejected: Option<Rect>,
    min_size: f64,
    timeout: Duration,
    deadline: Instant,
}

impl SelectionSession {
    pub fn new(min_size: f64, timeout: Duration, now: Instant) -> Self {
        Self {
            state: SelectionState::Idle,
            anchor: None,
            live: None,
            cursor: None,
            committed: None,
            rejected: None,
            min_size,
            timeout,
            deadline: now + timeout,
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn anchor(&self) -> Option<Point> {
        self.anchor
    }

    pub fn live_rect(&self) -> Option<Rect> {
        self.live
    }

    pub fn committed_rect(&self) -> Option<Rect> {
        self.committed
    }

    /// Last release that was rejected as too small, until the next drag starts.
    pub fn rejected_rect(&self) -> Option<Rect> {
        self.rejected
    }

    pub fn cursor(&self) -> Option<Point> {
        self.cursor
    }

    pub fn min_size(&self) -> f64 {
        self.min_size
    }

    /// Instant after which the session auto-cancels. Pushed back on every input.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Feed one input. Inputs after a terminal state are ignored.
    pub fn handle(&mut self, input: SelectionInput, now: Instant) -> SelectionUpdate {
        if self.is_terminal() {
            return SelectionUpdate::Ignored;
        }
        if let Some(expired) = self.expire(now) {
            return expired;
        }
        self.deadline = now + self.timeout;

        match (self.state, input) {
            (_, SelectionInput::Escape) => self.cancel(CancelReason::Escape),
            (_, SelectionInput::ContextMenu) => SelectionUpdate::SuppressContextMenu,

            (SelectionState::Idle, SelectionInput::PointerDown { x, y, button }) => {
                if button != PointerButton::Primary {
                    return SelectionUpdate::Ignored;
                }
                let p = Point::new(x, y);
                let rect = Rect::new(x, y, 0.0, 0.0);
                self.state = SelectionState::Dragging;
                self.anchor = Some(p);
                self.cursor = Some(p);
                self.live = Some(rect);
                self.rejected = None;
                log::debug!("[SELECT] Drag started at ({:.1}, {:.1})", x, y);
                SelectionUpdate::Live(rect)
            }
            (SelectionState::Idle, SelectionInput::PointerMove { x, y }) => {
                let p = Point::new(x, y);
                self.cursor = Some(p);
                SelectionUpdate::Hover(p)
            }
            (SelectionState::Dragging, SelectionInput::PointerMove { x, y }) => {
                let p = Point::new(x, y);
                self.cursor = Some(p);
                match self.anchor {
                    Some(anchor) => {
                        let rect = Rect::from_corners(anchor, p);
                        self.live = Some(rect);
                        SelectionUpdate::Live(rect)
                    }
                    None => SelectionUpdate::Ignored,
                }
            }
            (SelectionState::Dragging, SelectionInput::PointerUp { x, y }) => {
                let p = Point::new(x, y);
                self.cursor = Some(p);
                let Some(anchor) = self.anchor.take() else {
                    self.state = SelectionState::Idle;
                    return SelectionUpdate::Ignored;
                };
                let rect = Rect::from_corners(anchor, p).rounded();
                self.live = None;

                if rect.width > self.min_size && rect.height > self.min_size {
                    self.state = SelectionState::Committed;
                    self.committed = Some(rect);
                    log::info!(
                        "[SELECT] Committed {}×{} at ({}, {})",
                        rect.width,
                        rect.height,
                        rect.x,
                        rect.y
                    );
                    SelectionUpdate::Committed(rect)
                } else {
                    self.state = SelectionState::Idle;
                    self.rejected = Some(rect);
                    log::info!(
                        "[SELECT] Rejected {}×{} (minimum {} px)",
                        rect.width,
                        rect.height,
                        self.min_size
                    );
                    SelectionUpdate::TooSmall(CaptureError::SelectionTooSmall {
                        width: rect.width,
                        height: rect.height,
                        min: self.min_size,
                    })
                }
            }
            // Second button while dragging, stray up with no drag, etc.
            _ => SelectionUpdate::Ignored,
        }
    }

    /// Cancel now if the inactivity deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Option<SelectionUpdate> {
        if self.is_terminal() || now < self.deadline {
            return None;
        }
        Some(self.cancel(CancelReason::Timeout))
    }

    /// Cancel unconditionally. No rectangle is ever emitted afterwards.
    pub fn cancel(&mut self, reason: CancelReason) -> SelectionUpdate {
        if self.is_terminal() {
            return SelectionUpdate::Ignored;
        }
        self.state = SelectionState::Cancelled;
        self.anchor = None;
        self.live = None;
        self.rejected = None;
        log::info!("[SELECT] Cancelled: {}", reason);
        SelectionUpdate::Cancelled(reason)
    }

    /// What the overlay should draw for a `viewport_width × viewport_height` viewport.
    pub fn view(&self, viewport_width: f64, viewport_height: f64) -> OverlayView {
        OverlayView::from_session(self, viewport_width, viewport_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (SelectionSession, Instant) {
        let now = Instant::now();
        (SelectionSession::new(10.0, Duration::from_secs(180), now), now)
    }

    fn down(x: f64, y: f64) -> SelectionInput {
        SelectionInput::PointerDown { x, y, button: PointerButton::Primary }
    }

    fn mv(x: f64, y: f64) -> SelectionInput {
        SelectionInput::PointerMove { x, y }
    }

    fn up(x: f64, y: f64) -> SelectionInput {
        SelectionInput::PointerUp { x, y }
    }

    #[test]
    fn down_starts_degenerate_rect_at_anchor() {
        let (mut s, now) = session();
        assert_eq!(s.handle(down(40.0, 30.0), now), SelectionUpdate::Live(Rect::new(40.0, 30.0, 0.0, 0.0)));
        assert_eq!(s.state(), SelectionState::Dragging);
        assert_eq!(s.anchor(), Some(Point::new(40.0, 30.0)));
    }

    #[test]
    fn move_tracks_bounding_box_in_any_direction() {
        let (mut s, now) = session();
        s.handle(down(100.0, 100.0), now);
        assert_eq!(
            s.handle(mv(60.5, 140.0), now),
            SelectionUpdate::Live(Rect::new(60.5, 100.0, 39.5, 40.0))
        );
    }

    #[test]
    fn commit_uses_release_point_not_last_move() {
        let (mut s, now) = session();
        s.handle(down(10.0, 10.0), now);
        s.handle(mv(300.0, 300.0), now);
        s.handle(mv(5.0, 400.0), now);
        let update = s.handle(up(110.0, 60.0), now);
        assert_eq!(update, SelectionUpdate::Committed(Rect::new(10.0, 10.0, 100.0, 50.0)));
        assert_eq!(s.committed_rect(), Some(Rect::new(10.0, 10.0, 100.0, 50.0)));
    }

    #[test]
    fn commit_rounds_sub_pixel_values() {
        let (mut s, now) = session();
        s.handle(down(10.4, 10.6), now);
        let update = s.handle(up(120.7, 61.2), now);
        assert_eq!(update, SelectionUpdate::Committed(Rect::new(10.0, 11.0, 110.0, 51.0)));
    }

    #[test]
    fn narrow_release_is_too_small_and_retryable() {
        let (mut s, now) = session();
        s.handle(down(10.0, 10.0), now);
        match s.handle(up(19.0, 60.0), now) {
            SelectionUpdate::TooSmall(CaptureError::SelectionTooSmall { width, height, min }) => {
                assert_eq!((width, height, min), (9.0, 50.0, 10.0));
            }
            other => panic!("expected TooSmall, got {:?}", other),
        }
        assert_eq!(s.state(), SelectionState::Idle);
        assert!(s.rejected_rect().is_some());

        s.handle(down(10.0, 10.0), now);
        assert!(s.rejected_rect().is_none());
        assert!(matches!(s.handle(up(60.0, 60.0), now), SelectionUpdate::Committed(_)));
    }

    #[test]
    fn exact_threshold_is_rejected() {
        let (mut s, now) = session();
        s.handle(down(0.0, 0.0), now);
        assert!(matches!(s.handle(up(10.0, 10.0), now), SelectionUpdate::TooSmall(_)));
    }

    #[test]
    fn only_primary_button_starts_drag() {
        let (mut s, now) = session();
        let right = SelectionInput::PointerDown { x: 5.0, y: 5.0, button: PointerButton::Secondary };
        assert_eq!(s.handle(right, now), SelectionUpdate::Ignored);
        assert_eq!(s.state(), SelectionState::Idle);
    }

    #[test]
    fn duplicate_pointer_up_is_noop() {
        let (mut s, now) = session();
        assert_eq!(s.handle(up(50.0, 50.0), now), SelectionUpdate::Ignored);
        s.handle(down(0.0, 0.0), now);
        s.handle(up(5.0, 5.0), now);
        assert_eq!(s.handle(up(5.0, 5.0), now), SelectionUpdate::Ignored);
        assert_eq!(s.state(), SelectionState::Idle);
    }

    #[test]
    fn escape_cancels_from_idle_and_dragging() {
        let (mut idle, now) = session();
        assert_eq!(idle.handle(SelectionInput::Escape, now), SelectionUpdate::Cancelled(CancelReason::Escape));

        let (mut dragging, now) = session();
        dragging.handle(down(0.0, 0.0), now);
        dragging.handle(mv(100.0, 100.0), now);
        assert_eq!(
            dragging.handle(SelectionInput::Escape, now),
            SelectionUpdate::Cancelled(CancelReason::Escape)
        );
        // A late release must not commit anything.
        assert_eq!(dragging.handle(up(100.0, 100.0), now), SelectionUpdate::Ignored);
        assert_eq!(dragging.committed_rect(), None);
        assert_eq!(dragging.live_rect(), None);
    }

    #[test]
    fn context_menu_is_suppressed_while_active() {
        let (mut s, now) = session();
        assert_eq!(s.handle(SelectionInput::ContextMenu, now), SelectionUpdate::SuppressContextMenu);
        s.handle(SelectionInput::Escape, now);
        assert_eq!(s.handle(SelectionInput::ContextMenu, now), SelectionUpdate::Ignored);
    }

    #[test]
    fn inactivity_times_out() {
        let (mut s, now) = session();
        s.handle(down(0.0, 0.0), now);
        assert_eq!(s.expire(now + Duration::from_secs(179)), None);
        assert_eq!(
            s.expire(now + Duration::from_secs(180)),
            Some(SelectionUpdate::Cancelled(CancelReason::Timeout))
        );
        assert_eq!(s.state(), SelectionState::Cancelled);
    }

    #[test]
    fn late_input_after_deadline_cancels_instead_of_committing() {
        let (mut s, now) = session();
        s.handle(down(0.0, 0.0), now);
        let late = now + Duration::from_secs(200);
        assert_eq!(s.handle(up(100.0, 100.0), late), SelectionUpdate::Cancelled(CancelReason::Timeout));
    }

    #[test]
    fn input_pushes_deadline_back() {
        let (mut s, now) = session();
        let later = now + Duration::from_secs(100);
        s.handle(mv(1.0, 1.0), later);
        assert_eq!(s.deadline(), later + Duration::from_secs(180));
    }

    #[test]
    fn input_deserializes_from_tagged_json() {
        let input: SelectionInput =
            serde_json::from_str(r#"{"type": "pointerDown", "x": 3, "y": 4, "button": "primary"}"#).unwrap();
        assert_eq!(input, down(3.0, 4.0));
        let esc: SelectionInput = serde_json::from_str(r#"{"type": "escape"}"#).unwrap();
        assert_eq!(esc, SelectionInput::Escape);
    }
}
