// SPDX-License-Identifier: GPL-3.0-only

//! Capture source: device handle, frame buffer, and the arm/re-arm protocol
//!
//! State machine:
//!
//! ```text
//!                  open                    close
//! Uninitialized ─────────▶ Active ───────────────────▶ Released
//!                          │   ▲                          ▲
//!                    pause │   │ open                     │
//!                          ▼   │                          │
//!                          Paused ────────────────────────┘
//!                                        close
//! ```
//!
//! Negotiation and buffer allocation happen inside `open`, before the state
//! becomes `Active`, so the buffer size never changes while frames flow.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

use super::buffer::ArmSlot;
use super::types::*;
use super::{CaptureDriver, FrameCallback};
use crate::constants::LOG_EVERY_N_FRAMES;
use crate::pipelines::FrameRelay;

/// Per-source frame counters
#[derive(Debug, Default)]
pub struct CaptureStats {
    frames: AtomicU64,
    rearm_failures: AtomicU64,
}

impl CaptureStats {
    /// Frames handed through `on_frame`
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Re-arms refused because a buffer was already armed
    pub fn rearm_failures(&self) -> u64 {
        self.rearm_failures.load(Ordering::SeqCst)
    }
}

/// Inbound port the driver calls with each filled buffer
pub struct FramePort {
    relay: FrameRelay,
    slot: Arc<ArmSlot>,
    stats: Arc<CaptureStats>,
}

impl FramePort {
    pub fn new(relay: FrameRelay, slot: Arc<ArmSlot>, stats: Arc<CaptureStats>) -> Self {
        Self { relay, slot, stats }
    }

    /// Relay the frame, then immediately re-arm the same buffer
    ///
    /// Runs on the driver's delivery thread. The relay borrows the buffer
    /// only for the duration of the call, so by the time the buffer goes back
    /// into the slot nobody else references it.
    pub fn on_frame(&mut self, buffer: FrameBuffer) {
        self.relay.relay_descriptor(buffer.descriptor());

        let frames = self.stats.frames.fetch_add(1, Ordering::SeqCst) + 1;
        if frames % LOG_EVERY_N_FRAMES == 0 {
            debug!(frames, resolution = %buffer.resolution(), "Capture statistics");
        }

        if let Err(extra) = self.slot.arm(buffer) {
            // Only reachable if a driver minted its own buffer
            self.stats.rearm_failures.fetch_add(1, Ordering::SeqCst);
            error!(buffer = ?extra, "Slot already armed, discarding surplus buffer");
        }
    }

    pub fn into_callback(mut self) -> FrameCallback {
        Box::new(move |buffer| self.on_frame(buffer))
    }
}

/// Owns one capture session's device handle and frame buffer
pub struct CaptureSource {
    driver: Box<dyn CaptureDriver>,
    state: CaptureState,
    handle: Option<DeviceHandle>,
    resolution: Option<Resolution>,
    buffer: Option<FrameBuffer>,
    slot: Arc<ArmSlot>,
    stats: Arc<CaptureStats>,
    allocations: u64,
}

impl CaptureSource {
    pub fn new(driver: Box<dyn CaptureDriver>) -> Self {
        Self {
            driver,
            state: CaptureState::Uninitialized,
            handle: None,
            resolution: None,
            buffer: None,
            slot: Arc::new(ArmSlot::new()),
            stats: Arc::new(CaptureStats::default()),
            allocations: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn handle(&self) -> Option<&DeviceHandle> {
        self.handle.as_ref()
    }

    /// Negotiated resolution, once known
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// Size of the frame buffer for the negotiated resolution
    pub fn buffer_size(&self) -> Option<usize> {
        self.resolution.map(|r| r.frame_size())
    }

    /// Number of buffer allocations over this source's lifetime
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn slot(&self) -> Arc<ArmSlot> {
        Arc::clone(&self.slot)
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.driver.dropped_frames()
    }

    /// Acquire the device (if not already held), negotiate, allocate, arm and
    /// start delivery into `relay`
    ///
    /// Valid from `Uninitialized` and `Paused`. On failure the state is left
    /// unchanged and a handle acquired by this call is released again.
    pub fn open(&mut self, requested: Resolution, relay: FrameRelay) -> BackendResult<Resolution> {
        if !matches!(
            self.state,
            CaptureState::Uninitialized | CaptureState::Paused
        ) {
            return Err(BackendError::InvalidState {
                operation: "open",
                state: self.state,
            });
        }

        let acquired_here = if self.handle.is_none() {
            let handle = self.driver.acquire()?;
            info!(device = %handle.device, handle = handle.id, "Acquired capture device");
            self.handle = Some(handle);
            true
        } else {
            false
        };

        match self.start(requested, relay) {
            Ok(actual) => {
                self.state = CaptureState::Active;
                info!(
                    device = self.driver.name(),
                    resolution = %actual,
                    buffer_size = actual.frame_size(),
                    "Capture active"
                );
                Ok(actual)
            }
            Err(e) => {
                warn!(device = self.driver.name(), error = %e, "Failed to start capture");
                if let Some(buffer) = self.slot.reclaim() {
                    self.buffer = Some(buffer);
                }
                if acquired_here {
                    self.driver.release();
                    self.handle = None;
                }
                Err(e)
            }
        }
    }

    fn start(&mut self, requested: Resolution, relay: FrameRelay) -> BackendResult<Resolution> {
        let actual = self.negotiate(requested)?;
        self.allocate_buffer(actual)?;
        self.arm()?;
        let port = FramePort::new(relay, Arc::clone(&self.slot), Arc::clone(&self.stats));
        self.driver
            .start_delivery(Arc::clone(&self.slot), port.into_callback())?;
        Ok(actual)
    }

    fn ensure_reconfigurable(&self, operation: &'static str) -> BackendResult<()> {
        let held = self.handle.is_some();
        match self.state {
            CaptureState::Uninitialized | CaptureState::Paused if held => Ok(()),
            state => Err(BackendError::InvalidState { operation, state }),
        }
    }

    /// Request a resolution and read back what the device actually chose
    ///
    /// Requires a held handle and a state of `Uninitialized` or `Paused`. A
    /// changed resolution discards the current buffer.
    pub fn negotiate(&mut self, requested: Resolution) -> BackendResult<Resolution> {
        self.ensure_reconfigurable("negotiate")?;

        self.driver.request_resolution(requested)?;
        let actual = self.driver.resolution()?;
        if actual.is_empty() {
            return Err(BackendError::FormatNotSupported(format!(
                "device reported empty resolution {}",
                actual
            )));
        }
        if actual != requested {
            info!(
                requested = %requested,
                actual = %actual,
                "Device did not honour requested resolution, using actual"
            );
        }

        if self.resolution != Some(actual) {
            self.buffer = None;
        }
        self.resolution = Some(actual);
        Ok(actual)
    }

    /// Allocate the frame buffer for the negotiated resolution
    ///
    /// A buffer that already matches is kept, so repeated calls allocate once.
    pub fn allocate_buffer(&mut self, resolution: Resolution) -> BackendResult<()> {
        self.ensure_reconfigurable("allocate buffer")?;

        if self.resolution != Some(resolution) {
            return Err(BackendError::Other(format!(
                "buffer for {} does not match negotiated resolution {:?}",
                resolution, self.resolution
            )));
        }
        if self
            .buffer
            .as_ref()
            .is_some_and(|b| b.resolution() == resolution)
        {
            return Ok(());
        }

        let buffer = FrameBuffer::new(resolution);
        debug!(resolution = %resolution, size = buffer.len(), "Allocated frame buffer");
        self.buffer = Some(buffer);
        self.allocations += 1;
        Ok(())
    }

    /// Submit the frame buffer to the driver for the next frame
    pub fn arm(&mut self) -> BackendResult<()> {
        if self.state == CaptureState::Released {
            return Err(BackendError::InvalidState {
                operation: "arm",
                state: self.state,
            });
        }
        let buffer = self.buffer.take().ok_or(BackendError::NoBuffer)?;
        if let Some(negotiated) = self.resolution {
            assert!(
                buffer.len() >= negotiated.frame_size(),
                "frame buffer of {} bytes is smaller than a {} frame",
                buffer.len(),
                negotiated
            );
        }
        if let Err(buffer) = self.slot.arm(buffer) {
            self.buffer = Some(buffer);
            return Err(BackendError::AlreadyArmed);
        }
        Ok(())
    }

    /// Stop delivery but keep the device handle
    pub fn pause(&mut self) -> BackendResult<()> {
        match self.state {
            CaptureState::Active => {
                self.driver.stop_delivery();
                self.buffer = self.slot.reclaim().or(self.buffer.take());
                self.state = CaptureState::Paused;
                info!(device = self.driver.name(), "Capture paused");
                Ok(())
            }
            CaptureState::Paused => Ok(()),
            state => Err(BackendError::InvalidState {
                operation: "pause",
                state,
            }),
        }
    }

    /// Stop delivery and release the device
    ///
    /// Blocks until the driver confirms delivery has stopped. No-op when
    /// never opened or already released.
    pub fn close(&mut self) {
        match self.state {
            CaptureState::Uninitialized | CaptureState::Released => {
                debug!(state = %self.state, "Close ignored");
                return;
            }
            CaptureState::Active => self.driver.stop_delivery(),
            CaptureState::Paused => {}
        }

        self.slot.reclaim();
        self.buffer = None;
        self.driver.release();
        let handle = self.handle.take();
        self.state = CaptureState::Released;
        info!(
            device = self.driver.name(),
            handle = handle.map(|h| h.id),
            frames = self.stats.frames(),
            dropped = self.driver.dropped_frames(),
            "Capture released"
        );
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("device", &self.driver.name())
            .field("state", &self.state)
            .field("handle", &self.handle)
            .field("resolution", &self.resolution)
            .finish()
    }
}
