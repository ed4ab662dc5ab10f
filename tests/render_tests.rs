// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the render loop and the latest-frame hand-off

use edge_viewer::engine::{
    EdgeEngine, EdgeParams, HeadlessSink, LatestFrame, ProcessingEngine, Viewport,
};
use edge_viewer::engine::sink::HeadlessStats;
use edge_viewer::errors::{AppError, AppResult};
use edge_viewer::lifecycle::RenderControl;
use edge_viewer::render::{
    HeadlessSurface, RenderCommand, RenderDriver, RenderLoop, Surface, SurfaceState,
};
use image::{GrayImage, Luma};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn edge_engine() -> Arc<EdgeEngine> {
    Arc::new(EdgeEngine::new(
        EdgeParams::default(),
        Box::new(HeadlessSink::new()),
    ))
}

fn edge_engine_with_sink() -> (Arc<EdgeEngine>, Arc<HeadlessStats>) {
    let sink = HeadlessSink::new();
    let stats = sink.stats();
    (
        Arc::new(EdgeEngine::new(EdgeParams::default(), Box::new(sink))),
        stats,
    )
}

#[derive(Default)]
struct ResizeLog(Mutex<Vec<(u32, u32)>>);

impl ProcessingEngine for ResizeLog {
    fn consume_frame(&self, _width: u32, _height: u32, _pixels: &[u8]) {}
    fn on_context_created(&self) {}
    fn on_context_resized(&self, width: u32, height: u32) {
        self.0.lock().unwrap().push((width, height));
    }
    fn on_present(&self) {}
}

#[test]
fn test_driver_forwards_each_size_once() {
    let engine = Arc::new(ResizeLog::default());
    let mut driver = RenderDriver::new(engine.clone());

    driver.on_resized(10, 10);
    driver.on_draw();
    assert_eq!(driver.state(), SurfaceState::NotCreated);
    assert_eq!(driver.ignored_draws(), 1);

    driver.on_created();
    for _ in 0..3 {
        driver.on_resized(640, 360);
        driver.on_draw();
    }
    driver.on_resized(320, 180);

    assert_eq!(*engine.0.lock().unwrap(), vec![(640, 360), (320, 180)]);
    assert_eq!(driver.state(), SurfaceState::Rendering);
    assert_eq!(driver.draws(), 3);
}

#[test]
fn test_render_loop_starts_paused() {
    let engine = edge_engine();
    let surface = HeadlessSurface::new(40, 30);
    let mut render = RenderLoop::spawn(
        RenderDriver::new(engine.clone()),
        Box::new(surface.clone()),
        200,
    )
    .unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(render.command(), RenderCommand::Pause);
    assert_eq!(render.stats().ticks(), 0);
    assert_eq!(surface.created(), 0);

    render.stop();
    // A surface that was never created is never destroyed
    assert_eq!(surface.destroyed(), 0);
    assert!(!render.is_running());
}

#[test]
fn test_render_loop_creates_resizes_and_destroys() {
    let engine = edge_engine();
    let surface = HeadlessSurface::new(80, 60);
    let mut render = RenderLoop::spawn(
        RenderDriver::new(engine.clone()),
        Box::new(surface.clone()),
        200,
    )
    .unwrap();
    let stats = render.stats();

    render.resume();
    assert!(wait_until(Duration::from_secs(2), || stats.ticks() >= 3));
    assert_eq!(surface.created(), 1);
    assert_eq!(stats.surfaces_created(), 1);
    assert!(engine.render_state().context_ready);
    assert_eq!(
        engine.render_state().viewport,
        Some(Viewport {
            width: 80,
            height: 60
        })
    );

    surface.resize(120, 40);
    assert!(wait_until(Duration::from_secs(2), || {
        engine.render_state().viewport
            == Some(Viewport {
                width: 120,
                height: 40,
            })
    }));

    // Pausing keeps the surface; resuming does not create a new one
    render.pause();
    thread::sleep(Duration::from_millis(20));
    render.resume();
    let resumed_at = stats.ticks();
    assert!(wait_until(Duration::from_secs(2), || stats.ticks() > resumed_at));
    assert_eq!(surface.created(), 1);

    render.stop();
    assert_eq!(surface.destroyed(), 1);
    drop(render);
    assert_eq!(surface.destroyed(), 1);
}

/// Fails to create the first `failures` times
struct FlakySurface {
    failures: u32,
    created: Arc<AtomicU64>,
}

impl Surface for FlakySurface {
    fn create(&mut self) -> AppResult<()> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(AppError::Render("no display".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn size(&mut self) -> Option<(u32, u32)> {
        Some((16, 16))
    }

    fn destroy(&mut self) {}
}

#[test]
fn test_surface_size_reaches_present() {
    let (engine, sink) = edge_engine_with_sink();
    let surface = HeadlessSurface::new(320, 200);
    let mut render = RenderLoop::spawn(
        RenderDriver::new(engine.clone()),
        Box::new(surface.clone()),
        200,
    )
    .unwrap();

    render.resume();
    assert!(wait_until(Duration::from_secs(2), || {
        sink.last_viewport()
            == Some(Viewport {
                width: 320,
                height: 200,
            })
    }));

    surface.resize(100, 50);
    assert!(wait_until(Duration::from_secs(2), || {
        sink.last_viewport()
            == Some(Viewport {
                width: 100,
                height: 50,
            })
    }));
    assert_eq!(sink.inits(), 1);
    render.stop();
}

#[test]
fn test_surface_failure_waits_for_next_command() {
    let created = Arc::new(AtomicU64::new(0));
    let mut render = RenderLoop::spawn(
        RenderDriver::new(edge_engine()),
        Box::new(FlakySurface {
            failures: 1,
            created: created.clone(),
        }),
        200,
    )
    .unwrap();
    let stats = render.stats();

    render.resume();
    assert!(wait_until(Duration::from_secs(2), || stats.surface_failures() == 1));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(stats.ticks(), 0, "no draws without a surface");
    assert_eq!(stats.surface_failures(), 1, "no retry until told to");

    render.resume();
    assert!(wait_until(Duration::from_secs(2), || stats.ticks() >= 1));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    render.stop();
}

#[test]
fn test_latest_frame_is_never_torn() {
    // Frame n is (8 + n % 8) pixels wide and filled with n as u8
    fn check(frame: &edge_viewer::engine::ProcessedFrame) {
        if frame.sequence == 0 {
            return;
        }
        let fill = frame.sequence as u8;
        assert_eq!(frame.width(), 8 + (frame.sequence % 8) as u32);
        assert!(frame.image.pixels().all(|p| p.0[0] == fill));
    }

    let latest = Arc::new(LatestFrame::new());
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let latest = Arc::clone(&latest);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last = 0;
                let mut reads = 0u64;
                while !done.load(Ordering::SeqCst) {
                    let frame = latest.load();
                    check(&frame);
                    assert!(frame.sequence >= last, "sequence went backwards");
                    last = frame.sequence;
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for n in 1..=2000u64 {
        let image = GrayImage::from_pixel(8 + (n % 8) as u32, 8, Luma([n as u8]));
        assert_eq!(latest.publish(image), n);
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    check(&latest.load());
    assert_eq!(latest.load().sequence, 2000);
}

#[test]
fn test_capture_and_render_run_concurrently() {
    let engine = edge_engine();
    let surface = HeadlessSurface::new(64, 48);
    let mut render = RenderLoop::spawn(
        RenderDriver::new(engine.clone()),
        Box::new(surface.clone()),
        500,
    )
    .unwrap();
    render.resume();

    let producer_engine = engine.clone();
    let producer = thread::spawn(move || {
        let pixels = vec![90u8; 64 * 48 * 3 / 2];
        for _ in 0..200 {
            producer_engine.consume_frame(64, 48, &pixels);
        }
    });
    producer.join().unwrap();

    let stats = render.stats();
    let before = stats.ticks();
    assert!(wait_until(Duration::from_secs(2), || stats.ticks() > before));
    render.stop();

    assert_eq!(engine.latest().load().sequence, 200);
    assert_eq!(engine.latest().load().image.dimensions(), (64, 48));
    assert_eq!(engine.rejected_frames(), 0);
}
