// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion into the NV21 frame buffer
//!
//! Devices deliver whatever layout they negotiated; everything downstream of
//! the driver sees NV21 only. Each converter writes into the planes of an
//! already allocated [`FrameBuffer`] and never allocates.

use super::types::FrameBuffer;

/// Source layouts a driver can convert from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Y plane followed by interleaved V/U
    Nv21,
    /// Y plane followed by interleaved U/V
    Nv12,
    /// Packed 4:2:2, Y0 U Y1 V
    Yuyv,
}

impl SourceFormat {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"NV21" => Some(Self::Nv21),
            b"NV12" => Some(Self::Nv12),
            b"YUYV" => Some(Self::Yuyv),
            _ => None,
        }
    }

    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            Self::Nv21 => b"NV21",
            Self::Nv12 => b"NV12",
            Self::Yuyv => b"YUYV",
        }
    }

    /// Minimum stride in bytes for a row `width` pixels wide
    pub fn min_stride(&self, width: u32) -> usize {
        match self {
            Self::Nv21 | Self::Nv12 => width as usize,
            Self::Yuyv => width as usize * 2,
        }
    }

    /// Bytes a source frame of `height` rows at `stride` must contain
    pub fn required_len(&self, stride: usize, height: u32) -> usize {
        let rows = height as usize;
        match self {
            Self::Nv21 | Self::Nv12 => stride * rows + stride * rows.div_ceil(2),
            Self::Yuyv => stride * rows,
        }
    }
}

/// Convert one frame from `format` into `dst`
///
/// `stride` is the source row pitch in bytes (`bytesperline` in V4L2 terms);
/// zero means tightly packed. The frame must be at the buffer's resolution.
pub fn convert_into(
    format: SourceFormat,
    src: &[u8],
    stride: usize,
    dst: &mut FrameBuffer,
) -> Result<(), String> {
    let resolution = dst.resolution();
    let min_stride = format.min_stride(resolution.width);
    let stride = if stride == 0 { min_stride } else { stride };
    if stride < min_stride {
        return Err(format!(
            "stride {} too small for {} {}",
            stride,
            String::from_utf8_lossy(format.fourcc()),
            resolution
        ));
    }
    let required = format.required_len(stride, resolution.height);
    if src.len() < required {
        return Err(format!(
            "short frame: {} bytes, need {} for {}",
            src.len(),
            required,
            resolution
        ));
    }

    match format {
        SourceFormat::Nv21 => semi_planar_into(src, stride, dst, false),
        SourceFormat::Nv12 => semi_planar_into(src, stride, dst, true),
        SourceFormat::Yuyv => yuyv_into(src, stride, dst),
    }
    Ok(())
}

/// NV21 or NV12 (with `swap` set) to NV21, dropping row padding
fn semi_planar_into(src: &[u8], stride: usize, dst: &mut FrameBuffer, swap: bool) {
    let resolution = dst.resolution();
    let w = resolution.width as usize;
    let h = resolution.height as usize;
    let (luma, chroma) = dst.planes_mut();

    for (row, out) in luma.chunks_exact_mut(w).take(h).enumerate() {
        out.copy_from_slice(&src[row * stride..row * stride + w]);
    }

    let chroma_src = &src[stride * h..];
    for (row, out) in chroma.chunks_exact_mut(w).enumerate() {
        let line = &chroma_src[row * stride..row * stride + w];
        if swap {
            for (pair_out, pair_in) in out.chunks_exact_mut(2).zip(line.chunks_exact(2)) {
                pair_out[0] = pair_in[1];
                pair_out[1] = pair_in[0];
            }
        } else {
            out.copy_from_slice(line);
        }
    }
}

/// YUYV 4:2:2 to NV21, averaging chroma over each pair of rows
fn yuyv_into(src: &[u8], stride: usize, dst: &mut FrameBuffer) {
    let resolution = dst.resolution();
    let w = resolution.width as usize;
    let h = resolution.height as usize;
    let (luma, chroma) = dst.planes_mut();

    for row in 0..h {
        let line = &src[row * stride..row * stride + w * 2];
        for (x, out) in luma[row * w..(row + 1) * w].iter_mut().enumerate() {
            *out = line[x * 2];
        }
    }

    for (pair_row, out) in chroma.chunks_exact_mut(w).enumerate() {
        let top = pair_row * 2;
        let bottom = (top + 1).min(h - 1);
        let top_line = &src[top * stride..top * stride + w * 2];
        let bottom_line = &src[bottom * stride..bottom * stride + w * 2];
        for (i, vu) in out.chunks_exact_mut(2).enumerate() {
            let base = i * 4;
            let u = (top_line[base + 1] as u16 + bottom_line[base + 1] as u16).div_ceil(2);
            let v = (top_line[base + 3] as u16 + bottom_line[base + 3] as u16).div_ceil(2);
            vu[0] = v as u8;
            vu[1] = u as u8;
        }
    }
}
