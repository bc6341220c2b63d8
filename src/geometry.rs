use serde::{Deserialize, Serialize};

/// Width/height pair for a raster or a logical coordinate space.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extent {
    pub w: f32,
    pub h: f32,
}

impl Extent {
    pub const fn new(w: f32, h: f32) -> Self {
        Self { w, h }
    }

    pub const fn square(side: f32) -> Self {
        Self { w: side, h: side }
    }
}

/// Prompt point label, following the SAM convention: 0/1 mark a
/// background/foreground click, 2/3 mark the corners of a box prompt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptLabel {
    Negative,
    Positive,
    BoxTopLeft,
    BoxBottomRight,
}

impl PromptLabel {
    /// Numeric value the decoder expects for this label.
    pub fn model_value(self) -> u8 {
        match self {
            PromptLabel::Negative => 0,
            PromptLabel::Positive => 1,
            PromptLabel::BoxTopLeft => 2,
            PromptLabel::BoxBottomRight => 3,
        }
    }
}

/// A single prompt input in logical image space.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPoint {
    pub x: f32,
    pub y: f32,
    pub label: PromptLabel,
}

impl PromptPoint {
    pub const fn new(x: f32, y: f32, label: PromptLabel) -> Self {
        Self { x, y, label }
    }

    pub const fn positive(x: f32, y: f32) -> Self {
        Self::new(x, y, PromptLabel::Positive)
    }

    pub const fn negative(x: f32, y: f32) -> Self {
        Self::new(x, y, PromptLabel::Negative)
    }
}

/// A polygon ring vertex in logical image space. Unlike [`PromptPoint`]
/// a ring vertex carries no label.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RingPoint {
    pub x: f32,
    pub y: f32,
}

impl RingPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Placement of a scaled source image inside a square target, preserving
/// the source aspect ratio and centering along the padded axis.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PadBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Compute where to draw `source` inside `target` so the aspect ratio is
/// preserved: portrait sources are padded left/right, landscape sources
/// top/bottom, square sources fill the target exactly.
///
/// Positive dimensions are a caller precondition; the result is undefined
/// for zero-area inputs.
pub fn resize_and_pad_box(source: Extent, target: Extent) -> PadBox {
    if source.h > source.w {
        // Portrait: pad left/right.
        let new_w = source.w / source.h * target.w;
        let pad_left = ((target.w - new_w) / 2.0).floor();
        PadBox {
            x: pad_left,
            y: 0.0,
            w: new_w,
            h: target.h,
        }
    } else if source.w > source.h {
        // Landscape: pad top/bottom.
        let new_h = source.h / source.w * target.h;
        let pad_top = ((target.h - new_h) / 2.0).floor();
        PadBox {
            x: 0.0,
            y: pad_top,
            w: target.w,
            h: new_h,
        }
    } else {
        PadBox {
            x: 0.0,
            y: 0.0,
            w: target.w,
            h: target.h,
        }
    }
}

/// Map a display-space coordinate onto the logical image space by linear
/// scaling. No clamping is performed; out-of-range inputs map out of range.
pub fn display_to_logical(x: f32, y: f32, display: Extent, logical: Extent) -> (f32, f32) {
    (x / display.w * logical.w, y / display.h * logical.h)
}

/// Inverse of [`display_to_logical`], for hosts that render logical-space
/// geometry onto a display surface.
pub fn logical_to_display(x: f32, y: f32, logical: Extent, display: Extent) -> (f32, f32) {
    (x / logical.w * display.w, y / logical.h * display.h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_source_fills_target() {
        let pad = resize_and_pad_box(Extent::new(512.0, 512.0), Extent::square(1024.0));
        assert_eq!(
            pad,
            PadBox {
                x: 0.0,
                y: 0.0,
                w: 1024.0,
                h: 1024.0
            }
        );
    }

    #[test]
    fn portrait_source_pads_left_and_right() {
        let pad = resize_and_pad_box(Extent::new(500.0, 1000.0), Extent::square(1024.0));
        assert_eq!(pad.w, 512.0);
        assert_eq!(pad.h, 1024.0);
        assert_eq!(pad.x, 256.0);
        assert_eq!(pad.y, 0.0);
    }

    #[test]
    fn landscape_source_pads_top_and_bottom() {
        let pad = resize_and_pad_box(Extent::new(1000.0, 250.0), Extent::square(1024.0));
        assert_eq!(pad.w, 1024.0);
        assert_eq!(pad.h, 256.0);
        assert_eq!(pad.x, 0.0);
        assert_eq!(pad.y, 384.0);
    }

    #[test]
    fn pad_offset_is_floored() {
        // 300/1000 * 1024 = 307.2, pad = (1024 - 307.2) / 2 = 358.4 -> 358
        let pad = resize_and_pad_box(Extent::new(300.0, 1000.0), Extent::square(1024.0));
        assert_eq!(pad.x, 358.0);
    }

    #[test]
    fn display_coordinates_scale_into_logical_space() {
        let display = Extent::new(800.0, 800.0);
        let logical = Extent::square(1024.0);
        let (x, y) = display_to_logical(400.0, 200.0, display, logical);
        assert_eq!(x, 512.0);
        assert_eq!(y, 256.0);

        let (dx, dy) = logical_to_display(x, y, logical, display);
        assert_eq!(dx, 400.0);
        assert_eq!(dy, 200.0);
    }
}
