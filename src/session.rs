//! Interactive segmentation session controller.
//!
//! Drives the encode → prompt → decode → candidate-select → commit cycle
//! against an injected [`InferenceBackend`]. The backend is reached purely
//! by message passing: the controller submits fire-and-forget requests and
//! the host event loop delivers responses back through the
//! `handle_*_result` methods. Every request carries the session generation,
//! so responses that outlive a reset are detected and dropped instead of
//! being applied to the wrong image.

use crate::candidates::CandidateBatch;
use crate::contour::{trace_boundary, GridPoint};
use crate::geometry::{Extent, PromptPoint, RingPoint};
use crate::polygon::{Polygon, PolygonId, PolygonRegistry};
use crate::prompt::{DragRect, PromptBuilder};
use crate::raster::MaskRaster;
use crate::segment_all::{SegmentAllConfig, SegmentAllOrchestrator};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("image is not encoded")]
    NotEncoded,
    #[error("operation not valid in state {0:?}")]
    InvalidState(SessionState),
    #[error("a decode is already in flight")]
    DecodeInFlight,
    #[error("segment-all is already running")]
    SegmentAllActive,
    #[error("segment-all grid must have at least one cell")]
    EmptyGrid,
    #[error("candidate index {0} out of range")]
    CandidateIndex(usize),
    #[error("buffer length {actual} does not match expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },
    #[error("inference backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialize(String),
}

/// Correlation identifier for one encode or decode request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Encoding,
    Ready,
    AwaitingDecode,
    HasCandidates,
}

/// Fixed coordinate-space configuration. Prompts and polygons live in
/// `logical_size` space; decode mask rasters arrive at the backend's own
/// resolution and are rescaled at commit time.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub logical_size: Extent,
    pub mask_size: Extent,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            logical_size: Extent::square(1024.0),
            mask_size: Extent::square(256.0),
        }
    }
}

/// One-shot image encode request.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub request_id: RequestId,
    pub generation: u64,
    pub image: RgbaImage,
}

/// Prompt decode request. `mask_input` carries the previous-mask raster
/// when a refinement decode should be conditioned on the prior result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeRequest {
    pub request_id: RequestId,
    pub generation: u64,
    pub points: Vec<PromptPoint>,
    pub mask_input: Option<MaskRaster>,
}

/// Capability handle for the external inference engine. Submission is
/// fire-and-forget; results come back through the controller's
/// `handle_encode_result` / `handle_decode_result`, in arbitrary order and
/// after arbitrary latency.
pub trait InferenceBackend {
    fn submit_encode(&mut self, request: EncodeRequest) -> Result<(), SessionError>;
    fn submit_decode(&mut self, request: DecodeRequest) -> Result<(), SessionError>;
}

pub struct SessionController<B> {
    backend: B,
    config: SessionConfig,
    state: SessionState,
    generation: u64,
    next_request: u64,
    prompt: PromptBuilder,
    candidates: Option<CandidateBatch>,
    selected: usize,
    prev_mask: Option<MaskRaster>,
    pending_interactive: Option<RequestId>,
    registry: PolygonRegistry,
    batch: Option<SegmentAllOrchestrator>,
    last_error: Option<SessionError>,
}

impl<B: InferenceBackend> SessionController<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, SessionConfig::default())
    }

    pub fn with_config(backend: B, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            state: SessionState::Idle,
            generation: 0,
            next_request: 0,
            prompt: PromptBuilder::new(),
            candidates: None,
            selected: 0,
            prev_mask: None,
            pending_interactive: None,
            registry: PolygonRegistry::new(),
            batch: None,
            last_error: None,
        }
    }

    // --- queries -----------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn active_prompt(&self) -> &[PromptPoint] {
        self.prompt.points()
    }

    pub fn active_candidates(&self) -> Option<&CandidateBatch> {
        self.candidates.as_ref()
    }

    /// Index of the currently selected candidate, when a batch is present.
    pub fn selected_candidate(&self) -> Option<usize> {
        self.candidates.as_ref().map(|_| self.selected)
    }

    pub fn selected_mask(&self) -> Option<&MaskRaster> {
        self.candidates
            .as_ref()
            .and_then(|batch| batch.get(self.selected))
            .map(|candidate| &candidate.raster)
    }

    pub fn committed_polygons(&self) -> &[Polygon] {
        self.registry.polygons()
    }

    pub fn registry(&self) -> &PolygonRegistry {
        &self.registry
    }

    pub fn pending_decode(&self) -> Option<RequestId> {
        self.pending_interactive
    }

    /// Cells of a running segment-all scan still awaiting a response, or
    /// `None` when no scan is active.
    pub fn segment_all_remaining(&self) -> Option<usize> {
        self.batch.as_ref().map(|b| b.remaining())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    // --- commands ----------------------------------------------------------

    /// New image: drop all prompt, candidate, mask, and polygon state and
    /// invalidate every outstanding request by bumping the generation.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = SessionState::Idle;
        self.prompt.clear();
        self.candidates = None;
        self.selected = 0;
        self.prev_mask = None;
        self.pending_interactive = None;
        self.batch = None;
        self.registry.clear();
        self.last_error = None;
        log::info!("session reset; generation {}", self.generation);
    }

    /// Submit the padded/resized image for encoding. Required once per
    /// image before any prompt can be decoded.
    pub fn encode_image(&mut self, image: RgbaImage) -> Result<RequestId, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }
        self.last_error = None;
        let request_id = self.fresh_request_id();
        log::info!(
            "submitting encode {:?} ({}x{})",
            request_id,
            image.width(),
            image.height()
        );
        self.backend.submit_encode(EncodeRequest {
            request_id,
            generation: self.generation,
            image,
        })?;
        self.state = SessionState::Encoding;
        Ok(request_id)
    }

    pub fn handle_encode_result(
        &mut self,
        request_id: RequestId,
        generation: u64,
        result: Result<(), String>,
    ) {
        if generation != self.generation {
            log::debug!(
                "dropping stale encode response {:?} (generation {} != {})",
                request_id,
                generation,
                self.generation
            );
            return;
        }
        if self.state != SessionState::Encoding {
            log::warn!("ignoring encode response {:?} in {:?}", request_id, self.state);
            return;
        }
        match result {
            Ok(()) => {
                self.state = SessionState::Ready;
                log::info!("image encoded; session ready");
            }
            Err(msg) => {
                log::warn!("encode {:?} failed: {}", request_id, msg);
                self.last_error = Some(SessionError::Backend(msg));
                self.state = SessionState::Idle;
            }
        }
    }

    /// Add a point prompt and submit a decode over the grown set. When a
    /// previous-mask raster exists the decode is a refinement conditioned
    /// on it.
    pub fn add_point(&mut self, point: PromptPoint) -> Result<RequestId, SessionError> {
        self.ensure_editable()?;
        self.last_error = None;
        self.prompt.add_point(point);
        let mask_input = self.prev_mask.clone();
        self.submit_interactive_decode(mask_input)
    }

    pub fn begin_box(&mut self, x: f32, y: f32) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.prompt.begin_box(x, y);
        Ok(())
    }

    /// Current drag rectangle for display; no state change.
    pub fn update_box(&self, x: f32, y: f32) -> Option<DragRect> {
        self.prompt.update_box(x, y)
    }

    /// Finalize a box drag: the prompt set is replaced by the normalized
    /// corner pair and decoded without the previous-mask raster.
    pub fn finish_box(&mut self, x: f32, y: f32) -> Result<Option<RequestId>, SessionError> {
        self.ensure_editable()?;
        if self.prompt.finish_box(x, y).is_none() {
            return Ok(None);
        }
        self.last_error = None;
        self.prev_mask = None;
        self.submit_interactive_decode(None).map(Some)
    }

    /// Remove the last point. With points remaining, re-decode the reduced
    /// set without the previous-mask raster (the old refinement chain was
    /// conditioned on the removed point). With none remaining, clear the
    /// active mask state; no decode is issued.
    pub fn undo_last_point(&mut self) -> Result<Option<RequestId>, SessionError> {
        self.ensure_editable()?;
        if self.prompt.undo_last().is_none() {
            return Ok(None);
        }
        self.last_error = None;
        self.prev_mask = None;
        if self.prompt.is_empty() {
            self.candidates = None;
            self.selected = 0;
            self.state = SessionState::Ready;
            return Ok(None);
        }
        self.submit_interactive_decode(None).map(Some)
    }

    /// Click-to-restore: when no prompt is active, a click inside a
    /// committed polygon removes it from the registry and makes its origin
    /// prompt the active set, re-decoding it from scratch. Auto-segmented
    /// polygons have an empty origin prompt and issue no decode.
    pub fn restore(&mut self, x: f32, y: f32) -> Result<Option<PolygonId>, SessionError> {
        if self.state != SessionState::Ready || !self.prompt.is_empty() {
            return Err(SessionError::InvalidState(self.state));
        }
        let Some(id) = self.registry.find_containing(x, y).map(|p| p.id) else {
            return Ok(None);
        };
        let Some(polygon) = self.registry.remove(id) else {
            return Ok(None);
        };
        self.last_error = None;
        self.prev_mask = None;
        log::info!("restoring polygon {:?} into the active prompt", id);
        self.prompt.replace(polygon.origin_prompt);
        if !self.prompt.is_empty() {
            self.submit_interactive_decode(None)?;
        }
        Ok(Some(id))
    }

    /// Switch the selected candidate. Pure local update: no decode, but the
    /// previous-mask raster follows the selection so the next refinement is
    /// conditioned on what the user sees.
    pub fn select_candidate(&mut self, index: usize) -> Result<(), SessionError> {
        if self.state != SessionState::HasCandidates {
            return Err(SessionError::InvalidState(self.state));
        }
        let batch = self
            .candidates
            .as_ref()
            .ok_or(SessionError::InvalidState(self.state))?;
        let candidate = batch.get(index).ok_or(SessionError::CandidateIndex(index))?;
        self.prev_mask = Some(candidate.raster.clone());
        self.selected = index;
        Ok(())
    }

    /// Commit the selected mask: trace its boundary, rescale the ring into
    /// logical space, and store it with the prompt that produced it. A mask
    /// with no foreground commits nothing and leaves the state unchanged.
    pub fn commit(&mut self) -> Result<Option<PolygonId>, SessionError> {
        match self.state {
            SessionState::HasCandidates => {}
            SessionState::Ready => return Ok(None),
            SessionState::AwaitingDecode => return Err(SessionError::DecodeInFlight),
            SessionState::Idle | SessionState::Encoding => return Err(SessionError::NotEncoded),
        }

        let (ring, raster_w, raster_h) = {
            let batch = self
                .candidates
                .as_ref()
                .ok_or(SessionError::InvalidState(self.state))?;
            let candidate = batch
                .get(self.selected)
                .ok_or(SessionError::CandidateIndex(self.selected))?;
            (
                trace_boundary(&candidate.raster),
                candidate.raster.width(),
                candidate.raster.height(),
            )
        };
        if ring.is_empty() {
            log::debug!("commit skipped: selected mask has no foreground");
            return Ok(None);
        }

        let scaled = self.scale_ring(&ring, raster_w, raster_h);
        let origin = self.prompt.points().to_vec();
        let id = self.registry.add(scaled, origin);
        self.prompt.clear();
        self.candidates = None;
        self.selected = 0;
        self.prev_mask = None;
        self.state = SessionState::Ready;
        log::info!("committed polygon {:?}", id);
        Ok(Some(id))
    }

    /// Drop the active prompt, candidates, previous mask, and committed
    /// polygons while keeping the image encoded.
    pub fn clear_prompt(&mut self) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.prompt.clear();
        self.candidates = None;
        self.selected = 0;
        self.prev_mask = None;
        self.registry.clear();
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Scan the whole image with a grid of automatic single-point prompts,
    /// default grid shape and in-flight bound.
    pub fn segment_all(&mut self, rows: u32, cols: u32) -> Result<(), SessionError> {
        self.segment_all_with(SegmentAllConfig {
            rows,
            cols,
            ..SegmentAllConfig::default()
        })
    }

    pub fn segment_all_with(&mut self, config: SegmentAllConfig) -> Result<(), SessionError> {
        self.ensure_editable()?;
        if self.batch.is_some() {
            return Err(SessionError::SegmentAllActive);
        }
        if config.rows == 0 || config.cols == 0 {
            return Err(SessionError::EmptyGrid);
        }
        self.last_error = None;
        // A fresh scan supersedes previously committed polygons.
        self.registry.clear();
        log::info!("segment-all over a {}x{} grid", config.rows, config.cols);
        self.batch = Some(SegmentAllOrchestrator::new(config, self.config.logical_size));
        self.dispatch_batch_cells();
        Ok(())
    }

    /// Deliver a decode response. Responses are routed by correlation id:
    /// segment-all cells aggregate into the registry, the interactive
    /// request updates the candidate state. Responses from a superseded
    /// generation are dropped.
    pub fn handle_decode_result(
        &mut self,
        request_id: RequestId,
        generation: u64,
        result: Result<CandidateBatch, String>,
    ) {
        if generation != self.generation {
            log::debug!(
                "dropping stale decode response {:?} (generation {} != {})",
                request_id,
                generation,
                self.generation
            );
            return;
        }

        if self.batch.as_ref().is_some_and(|b| b.owns(request_id)) {
            self.handle_batch_response(request_id, result);
            return;
        }

        if self.pending_interactive != Some(request_id) {
            log::warn!(
                "ignoring decode response {:?} with no outstanding request",
                request_id
            );
            return;
        }
        self.pending_interactive = None;

        match result {
            Ok(batch) => {
                let best = batch.best_index();
                log::debug!(
                    "decode {:?} complete; best candidate {} of {:?}",
                    request_id,
                    best,
                    batch.scores()
                );
                self.selected = best;
                self.prev_mask = batch.get(best).map(|c| c.raster.clone());
                self.candidates = Some(batch);
                self.state = SessionState::HasCandidates;
            }
            Err(msg) => {
                log::warn!("decode {:?} failed: {}", request_id, msg);
                self.last_error = Some(SessionError::Backend(msg));
                self.state = SessionState::Ready;
            }
        }
    }

    // --- internals ---------------------------------------------------------

    fn ensure_editable(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Ready | SessionState::HasCandidates => Ok(()),
            SessionState::AwaitingDecode => Err(SessionError::DecodeInFlight),
            SessionState::Idle | SessionState::Encoding => Err(SessionError::NotEncoded),
        }
    }

    fn fresh_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    fn submit_interactive_decode(
        &mut self,
        mask_input: Option<MaskRaster>,
    ) -> Result<RequestId, SessionError> {
        let request_id = self.fresh_request_id();
        let request = DecodeRequest {
            request_id,
            generation: self.generation,
            points: self.prompt.points().to_vec(),
            mask_input,
        };
        log::debug!(
            "submitting decode {:?} with {} points (refinement: {})",
            request_id,
            request.points.len(),
            request.mask_input.is_some()
        );
        self.backend.submit_decode(request)?;
        self.pending_interactive = Some(request_id);
        self.state = SessionState::AwaitingDecode;
        Ok(request_id)
    }

    fn handle_batch_response(&mut self, request_id: RequestId, result: Result<CandidateBatch, String>) {
        let Some(cell) = self.batch.as_mut().and_then(|b| b.take_cell(request_id)) else {
            return;
        };

        match result {
            Ok(batch) => {
                let candidate = batch.best();
                let ring = trace_boundary(&candidate.raster);
                if ring.is_empty() {
                    log::debug!("cell ({}, {}) produced no foreground", cell.row, cell.col);
                } else {
                    let scaled =
                        self.scale_ring(&ring, candidate.raster.width(), candidate.raster.height());
                    let id = self.registry.add(scaled, Vec::new());
                    log::debug!(
                        "cell ({}, {}) committed polygon {:?}",
                        cell.row,
                        cell.col,
                        id
                    );
                }
            }
            Err(msg) => {
                log::warn!(
                    "segment-all cell ({}, {}) failed: {}",
                    cell.row,
                    cell.col,
                    msg
                );
            }
        }

        self.dispatch_batch_cells();
    }

    /// Keep the batch pipeline full up to its in-flight bound, then retire
    /// the scan once every cell is resolved or abandoned. Completion is
    /// checked here rather than in the response handler so a scan whose
    /// submissions all fail still finishes instead of staying active with
    /// nothing in flight.
    fn dispatch_batch_cells(&mut self) {
        loop {
            let Some((cell, point)) = self.batch.as_mut().and_then(|b| b.next_dispatch()) else {
                break;
            };
            let request_id = self.fresh_request_id();
            let request = DecodeRequest {
                request_id,
                generation: self.generation,
                points: vec![point],
                mask_input: None,
            };
            match self.backend.submit_decode(request) {
                Ok(()) => {
                    if let Some(batch) = self.batch.as_mut() {
                        batch.track(request_id, cell);
                    }
                }
                Err(err) => {
                    log::warn!(
                        "segment-all dispatch for cell ({}, {}) failed: {}",
                        cell.row,
                        cell.col,
                        err
                    );
                    self.last_error = Some(err);
                    if let Some(batch) = self.batch.as_mut() {
                        batch.abandon_cell();
                    }
                }
            }
        }

        if self.batch.as_ref().is_some_and(|b| b.is_complete()) {
            log::info!("segment-all complete; {} polygons", self.registry.len());
            self.batch = None;
        }
    }

    fn scale_ring(&self, ring: &[GridPoint], raster_w: u32, raster_h: u32) -> Vec<RingPoint> {
        let sx = self.config.logical_size.w / raster_w as f32;
        let sy = self.config.logical_size.h / raster_h as f32;
        ring.iter()
            .map(|p| RingPoint::new(p.x as f32 * sx, p.y as f32 * sy))
            .collect()
    }
}
