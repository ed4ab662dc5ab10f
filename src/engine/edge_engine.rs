// SPDX-License-Identifier: GPL-3.0-only

//! Edge-detecting processing engine

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use super::edges::{EdgeParams, detect_edges};
use super::latest::LatestFrame;
use super::sink::{PresentSink, Viewport};
use super::ProcessingEngine;

/// Render-side state owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineRenderState {
    /// `on_context_created` has run
    pub context_ready: bool,
    /// Whether the sink initialised successfully
    pub sink_ready: bool,
    /// Last size reported by `on_context_resized`
    pub viewport: Option<Viewport>,
}

/// Engine that keeps the edge map of the latest captured frame
///
/// Processing runs on the capture thread inside `consume_frame`; the result
/// is published to a [`LatestFrame`] slot that `on_present` reads from the
/// graphics thread.
pub struct EdgeEngine {
    params: EdgeParams,
    latest: LatestFrame,
    render: Mutex<EngineRenderState>,
    sink: Mutex<Box<dyn PresentSink>>,
    rejected: AtomicU64,
}

impl EdgeEngine {
    pub fn new(params: EdgeParams, sink: Box<dyn PresentSink>) -> Self {
        let params = params.normalized();
        info!(low = params.low, high = params.high, "Creating edge engine");
        Self {
            params,
            latest: LatestFrame::new(),
            render: Mutex::new(EngineRenderState::default()),
            sink: Mutex::new(sink),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn params(&self) -> EdgeParams {
        self.params
    }

    pub fn latest(&self) -> &LatestFrame {
        &self.latest
    }

    pub fn render_state(&self) -> EngineRenderState {
        *self.render_lock()
    }

    /// Frames discarded as malformed
    pub fn rejected_frames(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn render_lock(&self) -> MutexGuard<'_, EngineRenderState> {
        self.render.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sink_lock(&self) -> MutexGuard<'_, Box<dyn PresentSink>> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProcessingEngine for EdgeEngine {
    fn consume_frame(&self, width: u32, height: u32, pixels: &[u8]) {
        let luma_len = width as usize * height as usize;
        if luma_len == 0 || pixels.len() < luma_len {
            let rejected = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                width,
                height,
                len = pixels.len(),
                rejected,
                "Discarding malformed frame"
            );
            return;
        }

        let edges = detect_edges(&pixels[..luma_len], width, height, self.params);
        let sequence = self.latest.publish(edges);
        trace!(sequence, width, height, "Published edge frame");
    }

    fn on_context_created(&self) {
        let sink_ready = match self.sink_lock().init() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Present sink failed to initialise");
                false
            }
        };
        *self.render_lock() = EngineRenderState {
            context_ready: true,
            sink_ready,
            viewport: None,
        };
        debug!(sink_ready, "Engine render state initialised");
    }

    fn on_context_resized(&self, width: u32, height: u32) {
        let mut state = self.render_lock();
        if !state.context_ready {
            debug!(width, height, "Resize before context creation ignored");
            return;
        }
        state.viewport = Some(Viewport { width, height });
        debug!(width, height, "Engine viewport updated");
    }

    fn on_present(&self) {
        let state = self.render_state();
        if !state.context_ready || !state.sink_ready {
            return;
        }
        let frame = self.latest.load();
        let viewport = state.viewport.unwrap_or(Viewport {
            width: frame.width(),
            height: frame.height(),
        });
        if let Err(e) = self.sink_lock().present(&frame, viewport) {
            debug!(error = %e, sequence = frame.sequence, "Present failed");
        }
    }
}
