use crate::geometry::{resize_and_pad_box, Extent};
use crate::session::SessionError;
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A mask raster at a fixed resolution with 1 to 4 interleaved channels.
///
/// A pixel is foreground iff any of its first three channels is nonzero,
/// so both single-channel model output and RGBA overlay buffers (where the
/// alpha channel is ignored) can be traced directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskRaster {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl MaskRaster {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, SessionError> {
        let expected = width as usize * height as usize * channels as usize;
        if !(1..=4).contains(&channels) || data.len() != expected {
            return Err(SessionError::BufferMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Single-channel raster; every nonzero byte is foreground.
    pub fn from_single_channel(width: u32, height: u32, data: Vec<u8>) -> Result<Self, SessionError> {
        Self::new(width, height, 1, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Foreground test with out-of-bounds coordinates reading as background,
    /// so boundary tracing degrades gracefully at the raster edge.
    pub fn foreground(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return false;
        }
        let stride = self.channels as usize;
        let idx = (y as usize * self.width as usize + x as usize) * stride;
        let samples = stride.min(3);
        self.data[idx..idx + samples].iter().any(|&v| v != 0)
    }

    pub fn foreground_count(&self) -> usize {
        let stride = self.channels as usize;
        let samples = stride.min(3);
        self.data
            .par_chunks_exact(stride)
            .filter(|px| px[..samples].iter().any(|&v| v != 0))
            .count()
    }
}

/// Threshold a plane of decoder logits into a binary raster: a pixel is
/// foreground when `sigmoid(logit)` exceeds `threshold`.
pub fn binarize_logits(
    logits: &[f32],
    width: u32,
    height: u32,
    threshold: f32,
) -> Result<MaskRaster, SessionError> {
    let expected = width as usize * height as usize;
    if logits.len() != expected {
        return Err(SessionError::BufferMismatch {
            expected,
            actual: logits.len(),
        });
    }
    let data: Vec<u8> = logits
        .par_iter()
        .map(|&logit| {
            let prob = 1.0 / (1.0 + (-logit).exp());
            u8::from(prob > threshold)
        })
        .collect();
    MaskRaster::from_single_channel(width, height, data)
}

/// Resize an arbitrary image into a `target`-sided square letterbox for the
/// encoder: aspect ratio preserved, the padded axis centered, padding left
/// as transparent black.
pub fn prepare_encoder_input(image: &DynamicImage, target: u32) -> Result<RgbaImage, SessionError> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || target == 0 {
        return Err(SessionError::BufferMismatch {
            expected: target as usize,
            actual: 0,
        });
    }

    let pad = resize_and_pad_box(
        Extent::new(w as f32, h as f32),
        Extent::square(target as f32),
    );
    let resized = image::imageops::resize(
        &image.to_rgba8(),
        (pad.w.round() as u32).max(1),
        (pad.h.round() as u32).max(1),
        FilterType::Lanczos3,
    );

    let mut canvas = RgbaImage::new(target, target);
    image::imageops::overlay(&mut canvas, &resized, pad.x as i64, pad.y as i64);
    Ok(canvas)
}
