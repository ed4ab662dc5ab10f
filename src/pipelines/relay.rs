// SPDX-License-Identifier: GPL-3.0-only

//! Frame relay: the handoff from the capture thread to the processing engine

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::backends::camera::types::FrameDescriptor;
use crate::constants::LOG_EVERY_N_FRAMES;
use crate::engine::ProcessingEngine;

/// Counters for relayed frames
#[derive(Debug, Default)]
pub struct RelayStats {
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl RelayStats {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Forwards each delivered frame to the processing engine
///
/// There is no queue here: `relay` runs the engine synchronously on the
/// calling (capture) thread. While it runs, the frame buffer is not armed, so
/// a slow engine makes the device drop frames instead of building a backlog.
#[derive(Clone)]
pub struct FrameRelay {
    engine: Arc<dyn ProcessingEngine>,
    stats: Arc<RelayStats>,
}

impl FrameRelay {
    pub fn new(engine: Arc<dyn ProcessingEngine>) -> Self {
        Self {
            engine,
            stats: Arc::new(RelayStats::default()),
        }
    }

    /// Hand one frame to the engine; `pixels` is only borrowed for the call
    pub fn relay(&self, width: u32, height: u32, pixels: &[u8]) {
        self.engine.consume_frame(width, height, pixels);

        let frames = self.stats.frames.fetch_add(1, Ordering::Relaxed) + 1;
        self.stats
            .bytes
            .fetch_add(pixels.len() as u64, Ordering::Relaxed);
        trace!(frames, width, height, "Relayed frame");
        if frames % LOG_EVERY_N_FRAMES == 0 {
            debug!(frames, bytes = self.stats.bytes(), "Relay statistics");
        }
    }

    pub fn relay_descriptor(&self, frame: FrameDescriptor<'_>) {
        self.relay(frame.width, frame.height, frame.pixels);
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }
}

impl std::fmt::Debug for FrameRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRelay")
            .field("frames", &self.stats.frames())
            .finish()
    }
}
