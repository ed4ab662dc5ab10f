// SPDX-License-Identifier: GPL-3.0-only

//! Edge Viewer - live camera edge detection
//!
//! This library captures camera frames into a single reusable NV21 buffer,
//! hands each frame to a processing engine, and renders the engine's latest
//! result on a vsync-paced loop, with a lifecycle controller starting and
//! stopping both sides on permission and foreground/background signals.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Capture source, drivers and the buffer arming protocol
//! - [`pipelines`]: Frame relay from capture to the processing engine
//! - [`engine`]: Processing engine contract and the edge-detecting engine
//! - [`render`]: Render driver, render loop and surfaces
//! - [`lifecycle`]: Lifecycle state machine and its ports
//! - [`config`]: User configuration handling

pub mod backends;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod lifecycle;
pub mod pipelines;
pub mod render;

// Re-export commonly used types
pub use backends::camera::{CaptureSource, FrameBuffer, Resolution};
pub use config::{Config, PermissionPolicy};
pub use engine::{EdgeEngine, ProcessingEngine};
pub use lifecycle::{LifecycleController, LifecycleSignal, LifecycleState};
