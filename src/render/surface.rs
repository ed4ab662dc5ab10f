// SPDX-License-Identifier: GPL-3.0-only

//! Graphics surfaces driven by the render loop

use std::sync::{Arc, Mutex};

use crate::errors::AppResult;

/// A drawable surface owned by the graphics thread
pub trait Surface: Send {
    /// Establish the surface; called on the first running tick
    fn create(&mut self) -> AppResult<()>;

    /// Current size in pixels, polled every tick
    fn size(&mut self) -> Option<(u32, u32)>;

    /// Tear the surface down; called once when the loop stops
    fn destroy(&mut self);
}

#[derive(Debug, Default)]
struct HeadlessState {
    size: (u32, u32),
    created: u64,
    destroyed: u64,
}

/// Off-screen surface with a settable size
///
/// Clones share state, so a test can keep one clone to resize the surface
/// and observe create/destroy while the render loop owns the other.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let surface = Self::default();
        surface.resize(width, height);
        surface
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.lock().size = (width, height);
    }

    pub fn created(&self) -> u64 {
        self.lock().created
    }

    pub fn destroyed(&self) -> u64 {
        self.lock().destroyed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Surface for HeadlessSurface {
    fn create(&mut self) -> AppResult<()> {
        self.lock().created += 1;
        Ok(())
    }

    fn size(&mut self) -> Option<(u32, u32)> {
        Some(self.lock().size)
    }

    fn destroy(&mut self) {
        self.lock().destroyed += 1;
    }
}
