//! Moore-Neighbor boundary tracing over binary mask rasters.
//!
//! Walks the outer edge of the first connected foreground component found
//! by a row-major scan, visiting the 8-neighborhood clockwise with a
//! rotating backtrack direction. Disjoint blobs beyond the first are
//! ignored; callers wanting several components trace one mask per prompt,
//! which is exactly what the segment-all grid does.

use crate::raster::MaskRaster;
use serde::{Deserialize, Serialize};

/// An integer pixel coordinate in the raster's own resolution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
}

// Clockwise 8-neighborhood: N, NE, E, SE, S, SW, W, NW.
const DX: [i32; 8] = [0, 1, 1, 1, 0, -1, -1, -1];
const DY: [i32; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];

/// Trace the outer boundary of the first foreground component.
///
/// Returns the boundary pixels in clockwise order. A closed loop repeats
/// the start pixel as its final element; an isolated pixel yields a
/// single-point ring; an all-background mask yields an empty ring. Tracing
/// is capped at `4 * width * height` steps, after which the partial ring
/// accumulated so far is returned.
pub fn trace_boundary(mask: &MaskRaster) -> Vec<GridPoint> {
    let budget = 4 * mask.width() as usize * mask.height() as usize;
    trace_boundary_capped(mask, budget)
}

/// The trace with an explicit step budget.
fn trace_boundary_capped(mask: &MaskRaster, max_steps: usize) -> Vec<GridPoint> {
    let width = mask.width() as i32;
    let height = mask.height() as i32;

    let mut start = None;
    'scan: for y in 0..height {
        for x in 0..width {
            if mask.foreground(x, y) {
                start = Some((x, y));
                break 'scan;
            }
        }
    }
    let Some((start_x, start_y)) = start else {
        return Vec::new();
    };

    let mut ring = vec![GridPoint {
        x: start_x,
        y: start_y,
    }];
    let mut px = start_x;
    let mut py = start_y;

    // The start pixel came from a top-left scan, so its West and North-West
    // neighbors are background; the first clockwise sweep starts at NW.
    let mut search_start = 7usize;

    for _ in 0..max_steps {
        let mut advanced = false;
        for offset in 0..8 {
            let dir = (search_start + offset) % 8;
            let nx = px + DX[dir];
            let ny = py + DY[dir];
            if mask.foreground(nx, ny) {
                px = nx;
                py = ny;
                ring.push(GridPoint { x: px, y: py });
                // Resume the sweep just past the backtrack of the arrival
                // direction so the trace keeps hugging the boundary.
                search_start = (dir + 5) % 8;
                advanced = true;
                break;
            }
        }

        if !advanced {
            // Isolated pixel: no foreground neighbor at all.
            break;
        }
        if px == start_x && py == start_y {
            break;
        }
    }

    ring
}
