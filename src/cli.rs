// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available V4L2 cameras
//! - Probing the configured source's negotiated resolution

use edge_viewer::backends::camera::{CaptureSource, get_driver, v4l2};
use edge_viewer::config::Config;
use edge_viewer::engine::{EdgeEngine, HeadlessSink};
use edge_viewer::errors::AppResult;
use edge_viewer::pipelines::FrameRelay;
use std::sync::Arc;
use std::time::Duration;

/// How long `probe` lets frames flow before closing
const PROBE_DURATION: Duration = Duration::from_secs(1);

/// List all available V4L2 cameras
pub fn list_cameras() -> AppResult<()> {
    let cameras = v4l2::list_devices();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        println!("  {} {}", camera.path, camera.card);
        println!("      Driver: {}", camera.driver);
        if camera.real_path != camera.path {
            println!("      Device: {}", camera.real_path);
        }
        if let Some(format) = &camera.format {
            println!("      Format: {}", format);
        }
        println!();
    }

    Ok(())
}

/// Open the configured source, report what it negotiated, and close it
pub fn probe(config: &Config) -> AppResult<()> {
    let requested = config.resolution();
    let engine = Arc::new(EdgeEngine::new(
        config.edge_params(),
        Box::new(HeadlessSink::new()),
    ));
    let relay = FrameRelay::new(engine.clone());

    println!("Backend: {}", config.backend);
    let mut source = CaptureSource::new(get_driver(config));
    let actual = source.open(requested, relay.clone())?;

    println!("Requested: {}", requested);
    println!("Actual: {}", actual);
    println!("Buffer: {} bytes", source.buffer_size().unwrap_or(0));
    if let Some(handle) = source.handle() {
        println!("Handle: {} (#{})", handle.device, handle.id);
    }

    println!();
    println!("Capturing for {} ms...", PROBE_DURATION.as_millis());
    std::thread::sleep(PROBE_DURATION);

    let stats = source.stats();
    source.close();

    println!("Frames delivered: {}", stats.frames());
    println!("Frames dropped: {}", source.dropped_frames());
    println!("Bytes relayed: {}", relay.stats().bytes());
    println!("Edge frames published: {}", engine.latest().load().sequence);

    Ok(())
}
