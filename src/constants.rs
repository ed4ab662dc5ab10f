// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

use crate::backends::camera::types::Resolution;

/// NV21 frame size is `width * height * NV21_NUMERATOR / NV21_DENOMINATOR`
pub const NV21_NUMERATOR: usize = 3;
pub const NV21_DENOMINATOR: usize = 2;

/// Requested capture resolution; large frames are too slow to process in real time
pub const DEFAULT_RESOLUTION: Resolution = Resolution::new(1280, 720);

/// Default V4L2 device node
pub const DEFAULT_DEVICE_PATH: &str = "/dev/video0";

/// Default render cadence (frames per second) standing in for display vsync
pub const DEFAULT_RENDER_FPS: u32 = 60;

/// Default frame rate of the synthetic test-pattern source
pub const DEFAULT_SYNTHETIC_FPS: u32 = 30;

/// Largest resolution the synthetic source accepts before clamping
pub const SYNTHETIC_MAX_RESOLUTION: Resolution = Resolution::new(1920, 1080);

/// Edge detector hysteresis thresholds on gradient magnitude
pub const DEFAULT_EDGE_LOW_THRESHOLD: u16 = 80;
pub const DEFAULT_EDGE_HIGH_THRESHOLD: u16 = 100;

/// Number of memory-mapped buffers requested from V4L2.
///
/// These are driver-side buffers; the application still holds exactly one.
pub const V4L2_STREAM_BUFFERS: u32 = 2;

/// Longest a delivery thread blocks, sleeping or waiting on the device,
/// before re-checking its stop signal
pub const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Poll interval of the interactive host's input loop
pub const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Frame statistics are logged every this many frames
pub const LOG_EVERY_N_FRAMES: u64 = 120;

/// Convert a frame rate into a tick interval, treating 0 as 1 fps
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}
