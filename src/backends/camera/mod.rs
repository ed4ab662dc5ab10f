// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ LifecycleController │  ← decides when capture runs
//! └──────────┬──────────┘
//!            │ open / close
//!            ▼
//! ┌─────────────────────┐
//! │    CaptureSource    │  ← state machine, owns the frame buffer
//! └──────────┬──────────┘
//!            │ ArmSlot (one credit) + FrameCallback
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureDriver trait │  ← device access, delivery thread
//! └──────────┬──────────┘
//!            │
//!     ┌──────┼──────────┐
//!     ▼      ▼          ▼
//!   V4L2  Synthetic   Manual
//! ```

pub mod buffer;
pub mod format_converters;
pub mod frame_loop;
pub mod manual;
pub mod source;
pub mod synthetic;
pub mod types;
pub mod v4l2;

pub use buffer::ArmSlot;
pub use source::{CaptureSource, CaptureStats, FramePort};
pub use types::*;

use std::sync::Arc;

use crate::config::Config;

/// Called by a driver, on its delivery thread, with a filled buffer
///
/// The callback takes the buffer by value and is responsible for arming it
/// again, which returns the credit to the driver.
pub type FrameCallback = Box<dyn FnMut(FrameBuffer) + Send>;

/// Device access used by [`CaptureSource`]
///
/// Drivers never allocate frame buffers. They take the armed buffer out of
/// the [`ArmSlot`], fill it with an NV21 frame at the negotiated resolution,
/// and pass it to the [`FrameCallback`]. A frame the device produces while
/// the slot is empty is dropped.
pub trait CaptureDriver: Send {
    /// Human-readable device name for logs
    fn name(&self) -> &str;

    /// Take exclusive hold of the device
    ///
    /// # Returns
    /// * `Err(BackendError::DeviceUnavailable)` - device busy or absent
    /// * `Err(BackendError::PermissionDenied)` - the OS refused access
    fn acquire(&mut self) -> BackendResult<DeviceHandle>;

    /// Ask the device for a capture resolution
    ///
    /// The device may clamp or ignore the request; callers must read
    /// [`resolution`](Self::resolution) afterwards.
    fn request_resolution(&mut self, requested: Resolution) -> BackendResult<()>;

    /// The resolution the device will actually deliver
    fn resolution(&self) -> BackendResult<Resolution>;

    /// Begin delivering frames into buffers armed in `slot`
    fn start_delivery(&mut self, slot: Arc<ArmSlot>, on_frame: FrameCallback)
    -> BackendResult<()>;

    /// Stop delivering frames
    ///
    /// Blocks until no callback is running and none will start.
    fn stop_delivery(&mut self);

    /// Give up the device
    fn release(&mut self);

    /// Frames the device produced while no buffer was armed
    fn dropped_frames(&self) -> u64 {
        0
    }
}

/// Build a driver for the configured backend
pub fn get_driver(config: &Config) -> Box<dyn CaptureDriver> {
    match config.backend {
        CaptureBackendType::V4l2 => Box::new(v4l2::V4l2Driver::new(&config.device_path)),
        CaptureBackendType::Synthetic => {
            Box::new(synthetic::SyntheticDriver::new("synthetic0", config.synthetic_fps))
        }
    }
}
