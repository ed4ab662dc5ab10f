// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture drivers and the capture source

//! Shared types for camera capture

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::{NV21_DENOMINATOR, NV21_NUMERATOR};

/// Capture resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes one NV21 frame occupies at this resolution
    ///
    /// The luma plane is `width * height` bytes, the interleaved VU plane
    /// adds half of that again.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * NV21_NUMERATOR / NV21_DENOMINATOR
    }

    /// Number of bytes in the luma plane
    pub fn luma_size(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The single reusable frame buffer
///
/// Deliberately not `Clone`: there is exactly one buffer per negotiated
/// resolution, and whoever holds the value holds the only credit to fill it.
/// While armed it lives in the [`ArmSlot`](super::buffer::ArmSlot); during a
/// callback it is owned by the delivery thread; otherwise it is back with the
/// capture source.
pub struct FrameBuffer {
    data: Box<[u8]>,
    resolution: Resolution,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer sized for `resolution`
    pub fn new(resolution: Resolution) -> Self {
        Self {
            data: vec![0u8; resolution.frame_size()].into_boxed_slice(),
            resolution,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Luma and interleaved chroma planes, for drivers filling the buffer
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        let luma = self.resolution.luma_size();
        self.data.split_at_mut(luma)
    }

    /// Borrow the buffer as a descriptor for one handoff call
    pub fn descriptor(&self) -> FrameDescriptor<'_> {
        FrameDescriptor {
            width: self.resolution.width,
            height: self.resolution.height,
            pixels: &self.data,
        }
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameBuffer({}, {} bytes)", self.resolution, self.data.len())
    }
}

/// A delivered frame, valid only for the duration of one handoff
#[derive(Debug, Clone, Copy)]
pub struct FrameDescriptor<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

/// Capture source lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Uninitialized,
    Active,
    Paused,
    Released,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Uninitialized => write!(f, "uninitialized"),
            CaptureState::Active => write!(f, "active"),
            CaptureState::Paused => write!(f, "paused"),
            CaptureState::Released => write!(f, "released"),
        }
    }
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// An acquired device handle
///
/// Ids are unique for the lifetime of the process, so a re-opened device is
/// distinguishable from a resumed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: u64,
    pub device: String,
}

impl DeviceHandle {
    /// Mint a handle with a fresh id
    pub fn issue(device: &str) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            device: device.to_string(),
        }
    }
}

/// Capture driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackendType {
    /// Video4Linux2 device node
    #[default]
    V4l2,
    /// Generated test pattern
    Synthetic,
}

impl std::fmt::Display for CaptureBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureBackendType::V4l2 => write!(f, "v4l2"),
            CaptureBackendType::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl std::str::FromStr for CaptureBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v4l2" => Ok(CaptureBackendType::V4l2),
            "synthetic" => Ok(CaptureBackendType::Synthetic),
            other => Err(format!("unknown capture backend '{}'", other)),
        }
    }
}

/// Result type for capture operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for capture operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Device busy or absent
    DeviceUnavailable(String),
    /// The process is not allowed to use the device
    PermissionDenied(String),
    /// Device offered a pixel format we cannot convert
    FormatNotSupported(String),
    /// Operation not valid in the current capture state
    InvalidState {
        operation: &'static str,
        state: CaptureState,
    },
    /// No buffer allocated to arm
    NoBuffer,
    /// A buffer is already armed
    AlreadyArmed,
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl BackendError {
    /// Whether a later retry can reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::DeviceUnavailable(_))
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            BackendError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while capture is {}", operation, state)
            }
            BackendError::NoBuffer => write!(f, "No frame buffer allocated"),
            BackendError::AlreadyArmed => write!(f, "Frame buffer already armed"),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_is_three_halves_of_luma() {
        for (w, h) in [(1280, 720), (640, 480), (1920, 1080), (2, 2), (4, 6)] {
            let res = Resolution::new(w, h);
            assert_eq!(res.frame_size(), (w * h * 3 / 2) as usize);
            assert_eq!(FrameBuffer::new(res).len(), res.frame_size());
        }
    }

    #[test]
    fn test_planes_split_at_luma() {
        let mut buffer = FrameBuffer::new(Resolution::new(4, 2));
        let (luma, chroma) = buffer.planes_mut();
        assert_eq!(luma.len(), 8);
        assert_eq!(chroma.len(), 4);
    }

    #[test]
    fn test_handles_are_unique() {
        let a = DeviceHandle::issue("cam");
        let b = DeviceHandle::issue("cam");
        assert_ne!(a.id, b.id);
        assert!(b.id > a.id);
    }

    #[test]
    fn test_backend_type_parse() {
        assert_eq!("V4L2".parse::<CaptureBackendType>(), Ok(CaptureBackendType::V4l2));
        assert_eq!(
            "synthetic".parse::<CaptureBackendType>(),
            Ok(CaptureBackendType::Synthetic)
        );
        assert!("pipewire".parse::<CaptureBackendType>().is_err());
    }
}
