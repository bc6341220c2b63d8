use crate::geometry::{PromptLabel, PromptPoint};
use serde::{Deserialize, Serialize};

/// Normalized box-drag rectangle in logical image space, exposed so hosts
/// can render the in-progress selection.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Copy, Clone)]
struct DragState {
    anchor_x: f32,
    anchor_y: f32,
}

/// Ordered accumulation of point and box prompts with single-step undo.
///
/// Point order is preserved verbatim for the decoder. A finished box drag
/// always replaces the whole set with exactly two min/max-normalized corner
/// points, regardless of drag direction.
#[derive(Debug, Default, Clone)]
pub struct PromptBuilder {
    points: Vec<PromptPoint>,
    drag: Option<DragState>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, point: PromptPoint) {
        self.points.push(point);
    }

    /// Remove and return the most recently added point.
    pub fn undo_last(&mut self) -> Option<PromptPoint> {
        self.points.pop()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.drag = None;
    }

    pub fn points(&self) -> &[PromptPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Replace the whole set at once, e.g. when restoring a committed
    /// polygon's origin prompt.
    pub fn replace(&mut self, points: Vec<PromptPoint>) {
        self.points = points;
        self.drag = None;
    }

    pub fn begin_box(&mut self, x: f32, y: f32) {
        self.drag = Some(DragState {
            anchor_x: x,
            anchor_y: y,
        });
    }

    pub fn drag_active(&self) -> bool {
        self.drag.is_some()
    }

    /// Current drag rectangle for display, or `None` when no drag is active.
    pub fn update_box(&self, x: f32, y: f32) -> Option<DragRect> {
        let drag = self.drag?;
        Some(normalized_rect(drag.anchor_x, drag.anchor_y, x, y))
    }

    /// Finalize the drag: the prompt set becomes exactly the two corner
    /// points `[top-left (label 2), bottom-right (label 3)]`.
    pub fn finish_box(&mut self, x: f32, y: f32) -> Option<[PromptPoint; 2]> {
        let drag = self.drag.take()?;
        let rect = normalized_rect(drag.anchor_x, drag.anchor_y, x, y);
        let corners = [
            PromptPoint::new(rect.x, rect.y, PromptLabel::BoxTopLeft),
            PromptPoint::new(rect.x + rect.w, rect.y + rect.h, PromptLabel::BoxBottomRight),
        ];
        self.points = corners.to_vec();
        Some(corners)
    }
}

fn normalized_rect(x0: f32, y0: f32, x1: f32, y1: f32) -> DragRect {
    DragRect {
        x: x0.min(x1),
        y: y0.min(y1),
        w: (x1 - x0).abs(),
        h: (y1 - y0).abs(),
    }
}
