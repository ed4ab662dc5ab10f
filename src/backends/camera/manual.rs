// SPDX-License-Identifier: GPL-3.0-only

//! Manually stepped capture driver
//!
//! Frames are delivered only when [`ManualFeed::deliver`] is called, on the
//! calling thread, which then plays the part of the device callback thread.
//! This makes delivery order fully deterministic, and the feed's counters
//! expose exactly how the capture source drove the device.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::buffer::ArmSlot;
use super::types::*;
use super::{CaptureDriver, FrameCallback};

struct Delivery {
    slot: Arc<ArmSlot>,
    callback: FrameCallback,
}

#[derive(Default)]
struct ManualShared {
    delivery: Mutex<Option<Delivery>>,
    busy: AtomicBool,
    held: AtomicBool,
    clamp: Mutex<Option<Resolution>>,
    last_frame_len: Mutex<Option<usize>>,
    acquires: AtomicU64,
    releases: AtomicU64,
    starts: AtomicU64,
    stops: AtomicU64,
    deliveries: AtomicU64,
    dropped: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Driver half, handed to a [`CaptureSource`](super::CaptureSource)
pub struct ManualDriver {
    name: String,
    shared: Arc<ManualShared>,
    resolution: Option<Resolution>,
}

/// Control half, kept by the caller to push frames and inspect the driver
#[derive(Clone)]
pub struct ManualFeed {
    shared: Arc<ManualShared>,
}

impl ManualDriver {
    pub fn new(name: &str) -> (Self, ManualFeed) {
        let shared = Arc::new(ManualShared::default());
        (
            Self {
                name: name.to_string(),
                shared: Arc::clone(&shared),
                resolution: None,
            },
            ManualFeed { shared },
        )
    }

    /// Another driver for the same simulated device, sharing its feed
    pub fn reopen(feed: &ManualFeed, name: &str) -> Self {
        Self {
            name: name.to_string(),
            shared: Arc::clone(&feed.shared),
            resolution: None,
        }
    }
}

impl CaptureDriver for ManualDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self) -> BackendResult<DeviceHandle> {
        if self.shared.busy.load(Ordering::SeqCst) {
            return Err(BackendError::DeviceUnavailable(format!(
                "{} is busy",
                self.name
            )));
        }
        if self.shared.held.swap(true, Ordering::SeqCst) {
            return Err(BackendError::DeviceUnavailable(format!(
                "{} is already held",
                self.name
            )));
        }
        self.shared.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceHandle::issue(&self.name))
    }

    fn request_resolution(&mut self, requested: Resolution) -> BackendResult<()> {
        let actual = match *lock(&self.shared.clamp) {
            Some(max) => Resolution::new(
                requested.width.min(max.width),
                requested.height.min(max.height),
            ),
            None => requested,
        };
        self.resolution = Some(actual);
        Ok(())
    }

    fn resolution(&self) -> BackendResult<Resolution> {
        self.resolution
            .ok_or_else(|| BackendError::Other("no resolution requested".to_string()))
    }

    fn start_delivery(
        &mut self,
        slot: Arc<ArmSlot>,
        on_frame: FrameCallback,
    ) -> BackendResult<()> {
        *lock(&self.shared.delivery) = Some(Delivery {
            slot,
            callback: on_frame,
        });
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_delivery(&mut self) {
        // Waits for an in-flight deliver() to finish
        lock(&self.shared.delivery).take();
        self.shared.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.shared.held.store(false, Ordering::SeqCst);
        self.shared.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::SeqCst)
    }
}

impl ManualFeed {
    /// Deliver one frame whose luma is `fill` and chroma neutral
    pub fn deliver(&self, fill: u8) -> bool {
        self.deliver_with(|buffer| {
            let (luma, chroma) = buffer.planes_mut();
            luma.fill(fill);
            chroma.fill(128);
        })
    }

    /// Deliver one frame filled by `fill`
    ///
    /// Returns false, without calling `fill`, if delivery is stopped or no
    /// buffer is armed (the latter counts as a dropped frame).
    pub fn deliver_with<F: FnOnce(&mut FrameBuffer)>(&self, fill: F) -> bool {
        let mut delivery = lock(&self.shared.delivery);
        let Some(delivery) = delivery.as_mut() else {
            debug!("Delivery stopped, no frame");
            return false;
        };
        let Some(mut buffer) = delivery.slot.try_take() else {
            self.shared.dropped.fetch_add(1, Ordering::SeqCst);
            return false;
        };
        fill(&mut buffer);
        *lock(&self.shared.last_frame_len) = Some(buffer.len());
        self.shared.deliveries.fetch_add(1, Ordering::SeqCst);
        (delivery.callback)(buffer);
        true
    }

    /// Make the next acquire fail with `DeviceUnavailable`
    pub fn set_busy(&self, busy: bool) {
        self.shared.busy.store(busy, Ordering::SeqCst);
    }

    /// Clamp future resolution requests to at most `max`
    pub fn clamp_to(&self, max: Resolution) {
        *lock(&self.shared.clamp) = Some(max);
    }

    pub fn is_delivering(&self) -> bool {
        lock(&self.shared.delivery).is_some()
    }

    pub fn is_held(&self) -> bool {
        self.shared.held.load(Ordering::SeqCst)
    }

    pub fn last_frame_len(&self) -> Option<usize> {
        *lock(&self.shared.last_frame_len)
    }

    pub fn acquires(&self) -> u64 {
        self.shared.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u64 {
        self.shared.releases.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> u64 {
        self.shared.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u64 {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub fn deliveries(&self) -> u64 {
        self.shared.deliveries.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::SeqCst)
    }
}
