// SPDX-License-Identifier: GPL-3.0-only

//! Graphics-thread side of the pipeline
//!
//! [`RenderDriver`] turns surface events into engine calls and tracks the
//! surface state:
//!
//! ```text
//! NotCreated ──on_created──▶ Created ──on_resized──▶ SizeKnown ──on_draw──▶ Rendering
//!                               ▲                                              │
//!                               └─────────────── on_created ───────────────────┘
//! ```

use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::constants::LOG_EVERY_N_FRAMES;
use crate::engine::ProcessingEngine;

/// Graphics surface lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceState {
    #[default]
    NotCreated,
    Created,
    SizeKnown,
    Rendering,
}

impl std::fmt::Display for SurfaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceState::NotCreated => write!(f, "not created"),
            SurfaceState::Created => write!(f, "created"),
            SurfaceState::SizeKnown => write!(f, "size known"),
            SurfaceState::Rendering => write!(f, "rendering"),
        }
    }
}

pub struct RenderDriver {
    engine: Arc<dyn ProcessingEngine>,
    state: SurfaceState,
    size: Option<(u32, u32)>,
    draws: u64,
    ignored_draws: u64,
}

impl RenderDriver {
    pub fn new(engine: Arc<dyn ProcessingEngine>) -> Self {
        Self {
            engine,
            state: SurfaceState::NotCreated,
            size: None,
            draws: 0,
            ignored_draws: 0,
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Draws forwarded to the engine
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Draws dropped because no context existed yet
    pub fn ignored_draws(&self) -> u64 {
        self.ignored_draws
    }

    /// The graphics context was established (or re-established)
    ///
    /// Any previously known size belongs to the old context and is
    /// forgotten, so the next resize is always forwarded.
    pub fn on_created(&mut self) {
        if self.state != SurfaceState::NotCreated {
            info!(previous = %self.state, "Graphics context re-created");
        }
        self.engine.on_context_created();
        self.state = SurfaceState::Created;
        self.size = None;
    }

    /// The surface measures `width` x `height`; repeating the current size
    /// is a no-op
    pub fn on_resized(&mut self, width: u32, height: u32) {
        if self.state == SurfaceState::NotCreated {
            debug!(width, height, "Resize before context creation ignored");
            return;
        }
        if self.size == Some((width, height)) {
            return;
        }
        debug!(width, height, "Surface resized");
        self.engine.on_context_resized(width, height);
        self.size = Some((width, height));
        if self.state == SurfaceState::Created {
            self.state = SurfaceState::SizeKnown;
        }
    }

    /// One vsync tick: present the engine's latest frame
    pub fn on_draw(&mut self) {
        if self.state == SurfaceState::NotCreated {
            self.ignored_draws += 1;
            debug!(ignored = self.ignored_draws, "Draw before context creation ignored");
            return;
        }
        self.engine.on_present();
        self.state = SurfaceState::Rendering;
        self.draws += 1;
        if self.draws % LOG_EVERY_N_FRAMES == 0 {
            debug!(draws = self.draws, "Render statistics");
        } else {
            trace!(draws = self.draws, "Presented");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CallLog {
        calls: Mutex<Vec<String>>,
    }

    impl CallLog {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProcessingEngine for CallLog {
        fn consume_frame(&self, _width: u32, _height: u32, _pixels: &[u8]) {}

        fn on_context_created(&self) {
            self.calls.lock().unwrap().push("created".into());
        }

        fn on_context_resized(&self, width: u32, height: u32) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("resized {}x{}", width, height));
        }

        fn on_present(&self) {
            self.calls.lock().unwrap().push("present".into());
        }
    }

    #[test]
    fn test_draw_before_created_is_ignored() {
        let log = Arc::new(CallLog::default());
        let mut driver = RenderDriver::new(log.clone());
        driver.on_draw();
        driver.on_resized(10, 10);
        assert_eq!(driver.state(), SurfaceState::NotCreated);
        assert_eq!(driver.ignored_draws(), 1);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_state_progression() {
        let log = Arc::new(CallLog::default());
        let mut driver = RenderDriver::new(log.clone());
        driver.on_created();
        assert_eq!(driver.state(), SurfaceState::Created);
        driver.on_resized(80, 48);
        assert_eq!(driver.state(), SurfaceState::SizeKnown);
        driver.on_draw();
        assert_eq!(driver.state(), SurfaceState::Rendering);
        assert_eq!(log.calls(), vec!["created", "resized 80x48", "present"]);
    }

    #[test]
    fn test_draw_without_size_presents() {
        let log = Arc::new(CallLog::default());
        let mut driver = RenderDriver::new(log.clone());
        driver.on_created();
        driver.on_draw();
        assert_eq!(driver.draws(), 1);
        assert_eq!(log.calls(), vec!["created", "present"]);
    }

    #[test]
    fn test_recreate_forgets_size() {
        let log = Arc::new(CallLog::default());
        let mut driver = RenderDriver::new(log.clone());
        driver.on_created();
        driver.on_resized(80, 48);
        driver.on_created();
        assert_eq!(driver.size(), None);
        driver.on_resized(80, 48);
        assert_eq!(
            log.calls(),
            vec!["created", "resized 80x48", "created", "resized 80x48"]
        );
    }
}
