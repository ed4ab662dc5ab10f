// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic capture driver
//!
//! Produces a scrolling checkerboard at a fixed frame rate on its own
//! delivery thread, so the whole pipeline can run without camera hardware.
//! Device names are exclusive process-wide, like real device nodes: a second
//! driver acquiring the same name gets `DeviceUnavailable` until the first
//! releases it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

use super::buffer::ArmSlot;
use super::frame_loop::{DeliveryThread, LoopAction};
use super::types::*;
use super::{CaptureDriver, FrameCallback};
use crate::constants::{STOP_CHECK_INTERVAL, SYNTHETIC_MAX_RESOLUTION, frame_interval};

/// Names of synthetic devices currently held
static HELD_DEVICES: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Checker square edge length in pixels
const CHECKER_SIZE: u32 = 64;
/// Horizontal scroll per frame in pixels
const SCROLL_PER_FRAME: u32 = 4;
const DARK: u8 = 40;
const LIGHT: u8 = 200;

pub struct SyntheticDriver {
    name: String,
    fps: u32,
    held: bool,
    resolution: Option<Resolution>,
    delivery: Option<DeliveryThread>,
    dropped: Arc<AtomicU64>,
}

impl SyntheticDriver {
    pub fn new(name: &str, fps: u32) -> Self {
        Self {
            name: name.to_string(),
            fps,
            held: false,
            resolution: None,
            delivery: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Clamp a request to what the generator supports
    ///
    /// Dimensions are limited to [`SYNTHETIC_MAX_RESOLUTION`] and rounded
    /// down to even values so the chroma plane has whole pairs.
    pub fn supported_resolution(requested: Resolution) -> Resolution {
        let even = |v: u32, max: u32| (v.min(max) & !1).max(2);
        Resolution::new(
            even(requested.width, SYNTHETIC_MAX_RESOLUTION.width),
            even(requested.height, SYNTHETIC_MAX_RESOLUTION.height),
        )
    }
}

/// Fill `buffer` with frame number `sequence` of the test pattern
pub fn fill_test_pattern(buffer: &mut FrameBuffer, sequence: u64) {
    let resolution = buffer.resolution();
    let width = resolution.width as usize;
    let phase = (sequence as u32).wrapping_mul(SCROLL_PER_FRAME);
    let (luma, chroma) = buffer.planes_mut();

    for (y, row) in luma.chunks_exact_mut(width).enumerate() {
        let band_y = y as u32 / CHECKER_SIZE;
        for (x, px) in row.iter_mut().enumerate() {
            let band_x = (x as u32).wrapping_add(phase) / CHECKER_SIZE;
            *px = if (band_x + band_y) % 2 == 0 { DARK } else { LIGHT };
        }
    }
    chroma.fill(128);
}

impl CaptureDriver for SyntheticDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self) -> BackendResult<DeviceHandle> {
        if self.held {
            return Err(BackendError::DeviceUnavailable(format!(
                "{} is already held",
                self.name
            )));
        }
        let mut held = HELD_DEVICES.lock().unwrap_or_else(|e| e.into_inner());
        if held.contains(&self.name) {
            return Err(BackendError::DeviceUnavailable(format!(
                "{} is in use",
                self.name
            )));
        }
        held.push(self.name.clone());
        self.held = true;
        debug!(device = %self.name, "Synthetic device acquired");
        Ok(DeviceHandle::issue(&self.name))
    }

    fn request_resolution(&mut self, requested: Resolution) -> BackendResult<()> {
        self.resolution = Some(Self::supported_resolution(requested));
        Ok(())
    }

    fn resolution(&self) -> BackendResult<Resolution> {
        self.resolution
            .ok_or_else(|| BackendError::Other("no resolution requested".to_string()))
    }

    fn start_delivery(
        &mut self,
        slot: Arc<ArmSlot>,
        mut on_frame: FrameCallback,
    ) -> BackendResult<()> {
        if self.delivery.is_some() {
            return Err(BackendError::Other("delivery already running".to_string()));
        }
        let interval = frame_interval(self.fps);
        let dropped = Arc::clone(&self.dropped);
        let mut next_frame = Instant::now();
        let mut sequence: u64 = 0;

        info!(device = %self.name, fps = self.fps, "Starting synthetic delivery");

        let delivery = DeliveryThread::spawn("synthetic-capture", move || {
            let now = Instant::now();
            if now < next_frame {
                // Short naps keep stop() responsive at low frame rates
                thread::sleep((next_frame - now).min(STOP_CHECK_INTERVAL));
                return LoopAction::Continue;
            }

            sequence += 1;
            match slot.try_take() {
                Some(mut buffer) => {
                    fill_test_pattern(&mut buffer, sequence);
                    on_frame(buffer);
                }
                None => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }

            next_frame += interval;
            if next_frame < now {
                next_frame = now + interval;
            }
            LoopAction::Continue
        })?;

        self.delivery = Some(delivery);
        Ok(())
    }

    fn stop_delivery(&mut self) {
        if let Some(mut delivery) = self.delivery.take() {
            delivery.stop();
        }
    }

    fn release(&mut self) {
        self.stop_delivery();
        if self.held {
            let mut held = HELD_DEVICES.lock().unwrap_or_else(|e| e.into_inner());
            held.retain(|name| name != &self.name);
            self.held = false;
            debug!(device = %self.name, "Synthetic device released");
        }
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for SyntheticDriver {
    fn drop(&mut self) {
        self.release();
    }
}
