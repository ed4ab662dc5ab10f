// SPDX-License-Identifier: GPL-3.0-only

//! Frame pipelines
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌───────────────────┐
//! │ Capture      │ ──▶ │ FrameRelay  │ ──▶ │ ProcessingEngine  │
//! │ (NV21, 1 buf)│     │ (sync call) │     │ (latest-frame)    │
//! └──────────────┘     └─────────────┘     └───────────────────┘
//! ```

pub mod relay;

pub use relay::{FrameRelay, RelayStats};
