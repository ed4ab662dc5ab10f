// SPDX-License-Identifier: GPL-3.0-only

//! Presentation targets for processed frames

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use super::latest::ProcessedFrame;
use crate::errors::AppResult;

/// Drawable area of the surface in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Where the engine draws; owned by the engine and only called from the
/// graphics thread
pub trait PresentSink: Send {
    /// Set up sink resources once the graphics context exists
    fn init(&mut self) -> AppResult<()>;

    /// Draw `frame` scaled into `viewport`
    fn present(&mut self, frame: &ProcessedFrame, viewport: Viewport) -> AppResult<()>;
}

/// Sink that draws nothing and counts what it was given
#[derive(Debug, Clone, Default)]
pub struct HeadlessSink {
    stats: Arc<HeadlessStats>,
}

#[derive(Debug, Default)]
pub struct HeadlessStats {
    inits: AtomicU64,
    presents: AtomicU64,
    last_sequence: AtomicU64,
    last_viewport: Mutex<Option<Viewport>>,
}

impl HeadlessStats {
    pub fn inits(&self) -> u64 {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn presents(&self) -> u64 {
        self.presents.load(Ordering::SeqCst)
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    /// Viewport of the most recent present
    pub fn last_viewport(&self) -> Option<Viewport> {
        *self.last_viewport.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters shared with every clone of this sink
    pub fn stats(&self) -> Arc<HeadlessStats> {
        Arc::clone(&self.stats)
    }
}

impl PresentSink for HeadlessSink {
    fn init(&mut self) -> AppResult<()> {
        self.stats.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn present(&mut self, frame: &ProcessedFrame, viewport: Viewport) -> AppResult<()> {
        self.stats.presents.fetch_add(1, Ordering::SeqCst);
        self.stats
            .last_sequence
            .store(frame.sequence, Ordering::SeqCst);
        *self
            .stats
            .last_viewport
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(viewport);
        Ok(())
    }
}
