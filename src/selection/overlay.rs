//! Overlay view model, derived from a `SelectionSession`.
//!
//! The host surface draws exactly what this says: a darkened mask over the
//! unselected area, the selection box with a live "W × H" label, and
//! crosshair guides while idle.

use serde::Serialize;

use super::{SelectionSession, SelectionState};
use crate::geometry::{Point, Rect};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayView {
    pub state: SelectionState,
    /// False once the session is committed or cancelled.
    pub visible: bool,
    /// Alignment guides through the cursor. Idle only.
    pub crosshair: Option<Point>,
    pub selection_box: Option<Rect>,
    pub dimension_label: Option<String>,
    /// Darkened regions. The whole viewport when nothing is selected.
    pub mask: Vec<Rect>,
    pub hint: Option<String>,
}

impl OverlayView {
    pub(super) fn from_session(session: &SelectionSession, vw: f64, vh: f64) -> Self {
        let state = session.state();
        if state.is_terminal() {
            return Self {
                state,
                visible: false,
                crosshair: None,
                selection_box: None,
                dimension_label: None,
                mask: Vec::new(),
                hint: None,
            };
        }

        let viewport = Rect::new(0.0, 0.0, vw, vh);
        let selection_box = match state {
            SelectionState::Dragging => session.live_rect(),
            _ => None,
        };
        let crosshair = match state {
            SelectionState::Idle => session.cursor(),
            _ => None,
        };
        let mask = match selection_box {
            Some(sel) if !sel.is_null() => mask_around(&sel, &viewport),
            _ => vec![viewport],
        };
        let dimension_label = selection_box.map(|r| format!("{} × {}", r.width.round(), r.height.round()));
        let hint = session.rejected_rect().map(|r| {
            format!(
                "Selection too small ({} × {}). Drag at least {} px each way.",
                r.width,
                r.height,
                session.min_size() + 1.0
            )
        });

        Self {
            state,
            visible: true,
            crosshair,
            selection_box,
            dimension_label,
            mask,
            hint,
        }
    }
}

/// Up to four rectangles covering `viewport` minus `sel`.
fn mask_around(sel: &Rect, viewport: &Rect) -> Vec<Rect> {
    let top = sel.y.max(0.0);
    let bottom = sel.bottom().min(viewport.height);
    let left = sel.x.max(0.0);
    let right = sel.right().min(viewport.width);
    let band = (bottom - top).max(0.0);

    [
        Rect::new(0.0, 0.0, viewport.width, top),
        Rect::new(0.0, bottom, viewport.width, viewport.height - bottom),
        Rect::new(0.0, top, left, band),
        Rect::new(right, top, viewport.width - right, band),
    ]
    .into_iter()
    .filter(|r| !r.is_null())
    .collect()
}
