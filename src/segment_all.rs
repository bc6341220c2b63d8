//! Grid-driven whole-image segmentation.
//!
//! Covers the logical image with a uniform grid and issues one positive
//! single-point decode at each cell center. Cells are dispatched in
//! row-major order but never more than `max_in_flight` at a time; as each
//! response lands the session aggregates its best mask into the polygon
//! registry and the next queued cell goes out. Responses are matched by
//! request id, so out-of-order completion is fine.

use crate::geometry::{Extent, PromptPoint};
use crate::session::RequestId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentAllConfig {
    pub rows: u32,
    pub cols: u32,
    /// Upper bound on simultaneously outstanding decode requests.
    pub max_in_flight: usize,
}

impl Default for SegmentAllConfig {
    fn default() -> Self {
        Self {
            rows: 6,
            cols: 6,
            max_in_flight: 8,
        }
    }
}

/// One grid cell, row-major.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
}

/// Bookkeeping for one segment-all scan: the cells still queued, the cells
/// in flight keyed by request id, and the count of cells not yet resolved.
#[derive(Debug)]
pub struct SegmentAllOrchestrator {
    logical: Extent,
    rows: u32,
    cols: u32,
    max_in_flight: usize,
    queued: VecDeque<GridCell>,
    in_flight: HashMap<RequestId, GridCell>,
    remaining: usize,
}

impl SegmentAllOrchestrator {
    pub fn new(config: SegmentAllConfig, logical: Extent) -> Self {
        let mut queued = VecDeque::with_capacity((config.rows * config.cols) as usize);
        for row in 0..config.rows {
            for col in 0..config.cols {
                queued.push_back(GridCell { row, col });
            }
        }
        let remaining = queued.len();
        Self {
            logical,
            rows: config.rows,
            cols: config.cols,
            max_in_flight: config.max_in_flight.max(1),
            queued,
            in_flight: HashMap::new(),
            remaining,
        }
    }

    /// Positive point prompt at the cell's center in logical space.
    pub fn cell_center(&self, cell: GridCell) -> PromptPoint {
        let step_x = self.logical.w / self.cols as f32;
        let step_y = self.logical.h / self.rows as f32;
        PromptPoint::positive(
            step_x * cell.col as f32 + step_x / 2.0,
            step_y * cell.row as f32 + step_y / 2.0,
        )
    }

    /// Next cell to send, or `None` when the queue is empty or the
    /// in-flight bound is reached.
    pub fn next_dispatch(&mut self) -> Option<(GridCell, PromptPoint)> {
        if self.in_flight.len() >= self.max_in_flight {
            return None;
        }
        let cell = self.queued.pop_front()?;
        Some((cell, self.cell_center(cell)))
    }

    /// Record a dispatched cell under its request id.
    pub fn track(&mut self, id: RequestId, cell: GridCell) {
        self.in_flight.insert(id, cell);
    }

    /// Give up on a cell whose request could not be submitted.
    pub fn abandon_cell(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn owns(&self, id: RequestId) -> bool {
        self.in_flight.contains_key(&id)
    }

    /// Resolve a response: returns the cell it belongs to and counts it as
    /// done.
    pub fn take_cell(&mut self, id: RequestId) -> Option<GridCell> {
        let cell = self.in_flight.remove(&id)?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(cell)
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::*;
    use crate::session::{
        DecodeRequest, EncodeRequest, InferenceBackend, SessionController, SessionError,
        SessionState,
    };
    use crate::geometry::PromptPoint;
    use image::RgbaImage;

    fn assert_close(point: PromptPoint, x: f32, y: f32) {
        assert!(
            (point.x - x).abs() < 1e-3 && (point.y - y).abs() < 1e-3,
            "expected ({x}, {y}), got ({}, {})",
            point.x,
            point.y
        );
    }

    #[test]
    fn cells_dispatch_row_major_with_centered_prompts() {
        let mut orchestrator =
            SegmentAllOrchestrator::new(SegmentAllConfig::default(), Extent::square(1024.0));

        let (first, center) = orchestrator.next_dispatch().unwrap();
        assert_eq!(first, GridCell { row: 0, col: 0 });
        assert_close(center, 1024.0 / 12.0, 1024.0 / 12.0);

        let (second, center) = orchestrator.next_dispatch().unwrap();
        assert_eq!(second, GridCell { row: 0, col: 1 });
        assert_close(center, 256.0, 1024.0 / 12.0);
    }

    #[test]
    fn dispatch_respects_the_in_flight_bound() {
        let config = SegmentAllConfig {
            rows: 3,
            cols: 3,
            max_in_flight: 2,
        };
        let mut orchestrator = SegmentAllOrchestrator::new(config, Extent::square(1024.0));

        let (a, _) = orchestrator.next_dispatch().unwrap();
        orchestrator.track(RequestId(1), a);
        let (b, _) = orchestrator.next_dispatch().unwrap();
        orchestrator.track(RequestId(2), b);
        assert!(orchestrator.next_dispatch().is_none());

        assert_eq!(orchestrator.take_cell(RequestId(1)), Some(a));
        assert!(orchestrator.next_dispatch().is_some());
        assert_eq!(orchestrator.remaining(), 8);
    }

    #[test]
    fn full_scan_issues_every_cell_and_bounds_concurrency() {
        let mut session = ready_session();
        session.segment_all(6, 6).unwrap();

        // Only the first in-flight window goes out immediately.
        assert_eq!(session.backend().decodes.len(), 8);
        assert_eq!(session.segment_all_remaining(), Some(36));

        let first = session.backend().decodes[0].clone();
        assert_eq!(first.points.len(), 1);
        assert_close(first.points[0], 1024.0 / 12.0, 1024.0 / 12.0);
        assert!(first.mask_input.is_none());

        // Drain: answering each response releases the next queued cell.
        let mut answered = 0;
        while answered < session.backend().decodes.len() {
            let request = session.backend().decodes[answered].clone();
            session.handle_decode_result(
                request.request_id,
                request.generation,
                Ok(batch_with_scores([0.9, 0.1, 0.1], full_raster(4, 4))),
            );
            answered += 1;
            let outstanding = session.backend().decodes.len() - answered;
            assert!(outstanding <= 8, "{outstanding} requests in flight");
        }

        assert_eq!(session.backend().decodes.len(), 36);
        assert_eq!(session.segment_all_remaining(), None);
        assert_eq!(session.committed_polygons().len(), 36);
        // Auto-segmented polygons carry no origin prompt.
        assert!(session.committed_polygons()[0].origin_prompt.is_empty());
    }

    #[test]
    fn empty_cells_are_skipped_and_out_of_order_responses_land() {
        let mut session = ready_session();
        session
            .segment_all_with(SegmentAllConfig {
                rows: 2,
                cols: 2,
                max_in_flight: 8,
            })
            .unwrap();
        assert_eq!(session.backend().decodes.len(), 4);

        // Respond last-to-first; only two cells find foreground.
        for (idx, request) in session.backend().decodes.clone().iter().enumerate().rev() {
            let raster = if idx % 2 == 0 {
                full_raster(4, 4)
            } else {
                empty_raster(4, 4)
            };
            session.handle_decode_result(
                request.request_id,
                request.generation,
                Ok(batch_with_scores([0.9, 0.1, 0.1], raster)),
            );
        }

        assert_eq!(session.committed_polygons().len(), 2);
        assert_eq!(session.segment_all_remaining(), None);
    }

    #[test]
    fn scan_leaves_the_interactive_prompt_untouched() {
        let mut session = ready_session();
        session.add_point(PromptPoint::positive(512.0, 512.0)).unwrap();
        respond_last(&mut session, batch_with_scores([0.9, 0.1, 0.1], full_raster(4, 4)));
        assert_eq!(session.state(), SessionState::HasCandidates);

        session
            .segment_all_with(SegmentAllConfig {
                rows: 2,
                cols: 2,
                max_in_flight: 8,
            })
            .unwrap();
        for request in session.backend().decodes.clone().iter().skip(1) {
            session.handle_decode_result(
                request.request_id,
                request.generation,
                Ok(batch_with_scores([0.9, 0.1, 0.1], full_raster(4, 4))),
            );
        }

        assert_eq!(session.state(), SessionState::HasCandidates);
        assert_eq!(session.active_prompt(), &[PromptPoint::positive(512.0, 512.0)]);
        assert!(session.active_candidates().is_some());
        assert_eq!(session.committed_polygons().len(), 4);
    }

    #[test]
    fn concurrent_scans_are_rejected() {
        let mut session = ready_session();
        session.segment_all(2, 2).unwrap();
        assert_eq!(
            session.segment_all(2, 2),
            Err(SessionError::SegmentAllActive)
        );
        assert_eq!(session.segment_all(0, 6), Err(SessionError::SegmentAllActive));
    }

    #[test]
    fn degenerate_grids_are_rejected() {
        let mut session = ready_session();
        assert_eq!(session.segment_all(0, 6), Err(SessionError::EmptyGrid));
        assert_eq!(session.segment_all(6, 0), Err(SessionError::EmptyGrid));
        assert_eq!(session.segment_all_remaining(), None);
    }

    /// Backend whose decode queue is permanently full; encodes still land.
    #[derive(Debug, Default)]
    struct RefusingBackend;

    impl InferenceBackend for RefusingBackend {
        fn submit_encode(&mut self, _request: EncodeRequest) -> Result<(), SessionError> {
            Ok(())
        }

        fn submit_decode(&mut self, _request: DecodeRequest) -> Result<(), SessionError> {
            Err(SessionError::Backend("decode queue full".into()))
        }
    }

    #[test]
    fn scan_whose_submissions_all_fail_still_completes() {
        let mut session = SessionController::new(RefusingBackend);
        let id = session.encode_image(RgbaImage::new(4, 4)).unwrap();
        session.handle_encode_result(id, session.generation(), Ok(()));

        session.segment_all(2, 2).unwrap();
        // Every cell was abandoned at dispatch, so the scan is already over.
        assert_eq!(session.segment_all_remaining(), None);
        assert_eq!(
            session.last_error(),
            Some(&SessionError::Backend("decode queue full".into()))
        );
        assert!(session.committed_polygons().is_empty());

        // The session is not wedged: a new scan starts without a reset.
        assert!(session.segment_all(2, 2).is_ok());
        assert_eq!(session.segment_all_remaining(), None);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn restored_auto_polygon_issues_no_decode() {
        let mut session = ready_session();
        session.segment_all(1, 1).unwrap();
        let request = session.backend().decodes[0].clone();
        session.handle_decode_result(
            request.request_id,
            request.generation,
            Ok(batch_with_scores([0.9, 0.1, 0.1], full_raster(4, 4))),
        );
        assert_eq!(session.committed_polygons().len(), 1);

        let id = session.restore(400.0, 400.0).unwrap().unwrap();
        assert!(session.registry().get(id).is_none());
        // Empty origin prompt: nothing to re-decode.
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.active_prompt().is_empty());
        assert_eq!(session.backend().decodes.len(), 1);
    }
}
