// SPDX-License-Identifier: GPL-3.0-only

//! Processing engine boundary
//!
//! The capture path pushes frames in through [`ProcessingEngine::consume_frame`]
//! on the device thread; the render path pulls through the three context
//! hooks on the graphics thread. The two sides never talk to each other
//! directly, only through the engine's latest-frame slot.
//!
//! ```text
//!  capture thread                       graphics thread
//!  ──────────────                       ───────────────
//!  FramePort::on_frame                  RenderDriver::on_draw
//!        │                                     │
//!        ▼                                     ▼
//!  consume_frame ──► LatestFrame ◄──────── on_present
//!                    (Arc swap)
//! ```

pub mod edge_engine;
pub mod edges;
pub mod latest;
pub mod sink;

pub use edge_engine::{EdgeEngine, EngineRenderState};
pub use edges::EdgeParams;
pub use latest::{LatestFrame, ProcessedFrame};
pub use sink::{HeadlessSink, PresentSink, Viewport};

/// Contract between the pipeline core and the image processing stage
///
/// Every call is fire-and-forget. Implementations must not retain the pixel
/// slice past the call, must not propagate failures to the caller, and must
/// tolerate context hooks arriving before any frame (presenting a blank frame
/// in that case). `consume_frame` and `on_present` are called concurrently
/// from different threads; whatever the engine stores between them must be
/// swapped atomically so a present never observes a half-written frame.
pub trait ProcessingEngine: Send + Sync {
    /// Process one NV21 frame
    fn consume_frame(&self, width: u32, height: u32, pixels: &[u8]);

    /// The graphics context was (re)created
    fn on_context_created(&self);

    /// The surface now measures `width` x `height`
    fn on_context_resized(&self, width: u32, height: u32);

    /// Present the most recently stored result
    fn on_present(&self);
}
