//! Interactive promptable segmentation, host-agnostic.
//!
//! The crate drives a point/box prompted segmentation model without owning
//! the model itself: hosts plug an [`session::InferenceBackend`] into a
//! [`session::SessionController`], forward its responses back in, and read
//! the resulting candidate masks and committed polygons. Geometry runs in a
//! fixed 1024x1024 logical space so prompts, rings, and hit tests stay
//! independent of both the display size and the mask raster resolution.

pub mod candidates;
pub mod contour;
pub mod geometry;
pub mod polygon;
pub mod prompt;
pub mod raster;
pub mod segment_all;
pub mod session;

pub use candidates::{CandidateBatch, MaskCandidate, CANDIDATE_COUNT};
pub use contour::{trace_boundary, GridPoint};
pub use geometry::{
    display_to_logical, logical_to_display, resize_and_pad_box, Extent, PadBox, PromptLabel,
    PromptPoint, RingPoint,
};
pub use polygon::{Polygon, PolygonId, PolygonRegistry, RingBounds};
pub use prompt::{DragRect, PromptBuilder};
pub use raster::{binarize_logits, prepare_encoder_input, MaskRaster};
pub use segment_all::{GridCell, SegmentAllConfig};
pub use session::{
    DecodeRequest, EncodeRequest, InferenceBackend, RequestId, SessionConfig, SessionController,
    SessionError, SessionState,
};
