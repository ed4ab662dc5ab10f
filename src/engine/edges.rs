// SPDX-License-Identifier: GPL-3.0-only

//! Edge detection on the luma plane
//!
//! Sobel gradients with L1 magnitude, non-maximum suppression along the
//! quantised gradient direction, then double-threshold hysteresis: pixels
//! above `high` seed edges, pixels above `low` join an edge only when
//! 8-connected to a seed.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_EDGE_HIGH_THRESHOLD, DEFAULT_EDGE_LOW_THRESHOLD};

/// Hysteresis thresholds on L1 gradient magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeParams {
    pub low: u16,
    pub high: u16,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            low: DEFAULT_EDGE_LOW_THRESHOLD,
            high: DEFAULT_EDGE_HIGH_THRESHOLD,
        }
    }
}

impl EdgeParams {
    /// Swap the thresholds if given in the wrong order
    pub fn normalized(self) -> Self {
        if self.low > self.high {
            Self {
                low: self.high,
                high: self.low,
            }
        } else {
            self
        }
    }
}

const EDGE: u8 = 255;

// tan(22.5°) in Q15
const TG22: i64 = 13573;

/// Detect edges in a `width` x `height` luma plane
///
/// `luma` must hold at least `width * height` bytes; callers validate this.
pub fn detect_edges(luma: &[u8], width: u32, height: u32, params: EdgeParams) -> GrayImage {
    let params = params.normalized();
    let w = width as usize;
    let h = height as usize;
    let mut out = GrayImage::new(width, height);
    if w < 3 || h < 3 {
        return out;
    }

    let mut magnitude = vec![0u16; w * h];
    let mut gradient = vec![(0i32, 0i32); w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let p = |dx: isize, dy: isize| -> i32 {
                let xx = (x as isize + dx) as usize;
                let yy = (y as isize + dy) as usize;
                luma[yy * w + xx] as i32
            };
            let gx = p(1, -1) + 2 * p(1, 0) + p(1, 1) - p(-1, -1) - 2 * p(-1, 0) - p(-1, 1);
            let gy = p(-1, 1) + 2 * p(0, 1) + p(1, 1) - p(-1, -1) - 2 * p(0, -1) - p(1, -1);
            magnitude[y * w + x] = (gx.unsigned_abs() + gy.unsigned_abs()) as u16;
            gradient[y * w + x] = (gx, gy);
        }
    }

    // 0 = suppressed, 1 = weak, 2 = strong
    let mut class = vec![0u8; w * h];
    let mut seeds = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = y * w + x;
            let m = magnitude[idx];
            if m <= params.low {
                continue;
            }
            let (gx, gy) = gradient[idx];
            let ax = gx.unsigned_abs() as i64;
            let ay = (gy.unsigned_abs() as i64) << 15;
            let tg22x = ax * TG22;
            let (a, b) = if ay < tg22x {
                (idx - 1, idx + 1)
            } else if ay > tg22x + (ax << 16) {
                (idx - w, idx + w)
            } else if (gx > 0) == (gy > 0) {
                (idx - w - 1, idx + w + 1)
            } else {
                (idx - w + 1, idx + w - 1)
            };
            if m > magnitude[a] && m >= magnitude[b] {
                if m > params.high {
                    class[idx] = 2;
                    seeds.push(idx);
                } else {
                    class[idx] = 1;
                }
            }
        }
    }

    while let Some(idx) = seeds.pop() {
        let (x, y) = ((idx % w) as u32, (idx / w) as u32);
        out.put_pixel(x, y, Luma([EDGE]));
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if class[n] == 1 {
                    class[n] = 2;
                    seeds.push(n);
                }
            }
        }
    }

    out
}
