// SPDX-License-Identifier: GPL-3.0-only

//! Latest-frame slot shared by the capture and render threads

use image::GrayImage;
use std::sync::{Arc, Mutex};

/// A fully processed frame, immutable once published
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Monotonic publication counter, 0 for the blank frame
    pub sequence: u64,
    pub image: GrayImage,
}

impl ProcessedFrame {
    /// The frame shown before anything has been captured
    pub fn blank() -> Self {
        Self {
            sequence: 0,
            image: GrayImage::new(1, 1),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Single-entry slot holding the most recent [`ProcessedFrame`]
///
/// Writers build a frame completely and then swap the `Arc` in under the
/// lock; readers clone the `Arc` under the lock and render outside it. The
/// lock is therefore held only for a pointer swap on either side, and a
/// reader always sees either the previous or the next complete frame.
#[derive(Debug)]
pub struct LatestFrame {
    slot: Mutex<Arc<ProcessedFrame>>,
    next_sequence: Mutex<u64>,
}

impl Default for LatestFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestFrame {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Arc::new(ProcessedFrame::blank())),
            next_sequence: Mutex::new(1),
        }
    }

    /// Publish a new frame, returning the sequence number assigned to it
    pub fn publish(&self, image: GrayImage) -> u64 {
        let sequence = {
            let mut next = self.next_sequence.lock().unwrap_or_else(|e| e.into_inner());
            let sequence = *next;
            *next += 1;
            sequence
        };
        let frame = Arc::new(ProcessedFrame { sequence, image });
        let previous = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *slot, frame)
        };
        // The old frame is freed outside the lock, unless a reader still has it
        drop(previous);
        sequence
    }

    /// Snapshot of the current frame
    pub fn load(&self) -> Arc<ProcessedFrame> {
        Arc::clone(&self.slot.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Whether anything other than the blank frame has been published
    pub fn has_frame(&self) -> bool {
        self.load().sequence != 0
    }
}
