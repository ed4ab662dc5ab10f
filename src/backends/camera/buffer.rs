// SPDX-License-Identifier: GPL-3.0-only

//! Credit-based arming slot
//!
//! The capture source and its driver share one [`ArmSlot`]. Putting the frame
//! buffer into the slot ("arming") grants the driver exactly one credit to
//! deliver a frame; the driver takes the buffer out, fills it, and hands it to
//! the frame callback, which arms it again. While the slot is empty the driver
//! has nowhere to write, so frames produced in the meantime are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::types::FrameBuffer;

#[derive(Debug, Default)]
pub struct ArmSlot {
    armed: Mutex<Option<FrameBuffer>>,
    arms: AtomicU64,
    takes: AtomicU64,
}

impl ArmSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<FrameBuffer>> {
        // The slot only ever holds an Option, a poisoned lock still has a
        // consistent value.
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Submit the buffer for the next frame
    ///
    /// Returns the buffer back if one is already armed; double submission is
    /// refused rather than silently replacing the armed buffer.
    pub fn arm(&self, buffer: FrameBuffer) -> Result<(), FrameBuffer> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(buffer);
        }
        *slot = Some(buffer);
        self.arms.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Driver side: take the armed buffer if there is one, without waiting
    pub fn try_take(&self) -> Option<FrameBuffer> {
        let buffer = self.lock().take();
        if buffer.is_some() {
            self.takes.fetch_add(1, Ordering::SeqCst);
        }
        buffer
    }

    /// Owner side: take the buffer back after delivery has stopped
    ///
    /// Does not count as a driver take.
    pub fn reclaim(&self) -> Option<FrameBuffer> {
        self.lock().take()
    }

    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }

    /// Total successful arms since creation
    pub fn arm_count(&self) -> u64 {
        self.arms.load(Ordering::SeqCst)
    }

    /// Total buffers taken by a driver since creation
    pub fn take_count(&self) -> u64 {
        self.takes.load(Ordering::SeqCst)
    }
}
