// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the lifecycle controller driving real capture
//! sessions

use edge_viewer::backends::camera::manual::{ManualDriver, ManualFeed};
use edge_viewer::backends::camera::{CaptureDriver, CaptureState, Resolution};
use edge_viewer::engine::{EdgeEngine, EdgeParams, HeadlessSink, ProcessingEngine};
use edge_viewer::lifecycle::{
    CaptureControl, CaptureSession, DriverFactory, HostNotifier, LifecycleController,
    LifecycleState, Notice, PermissionStatus, RenderControl,
};
use edge_viewer::pipelines::FrameRelay;
use edge_viewer::render::{HeadlessSurface, RenderDriver, RenderLoop};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
struct SharedNotices(Arc<Mutex<Vec<Notice>>>);

impl SharedNotices {
    fn all(&self) -> Vec<Notice> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, wanted: &Notice) -> usize {
        self.all().iter().filter(|n| *n == wanted).count()
    }
}

impl HostNotifier for SharedNotices {
    fn notify(&mut self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

#[derive(Clone, Default)]
struct RenderLog(Arc<Mutex<Vec<&'static str>>>);

impl RenderLog {
    fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

impl RenderControl for RenderLog {
    fn resume(&mut self) {
        self.0.lock().unwrap().push("resume");
    }

    fn pause(&mut self) {
        self.0.lock().unwrap().push("pause");
    }

    fn stop(&mut self) {
        self.0.lock().unwrap().push("stop");
    }
}

const REQUESTED: Resolution = Resolution::new(64, 48);

fn engine() -> Arc<EdgeEngine> {
    Arc::new(EdgeEngine::new(
        EdgeParams::default(),
        Box::new(HeadlessSink::new()),
    ))
}

fn session(engine: Arc<dyn ProcessingEngine>) -> (CaptureSession, ManualFeed) {
    let (_, feed) = ManualDriver::new("cam");
    let factory_feed = feed.clone();
    let factory: DriverFactory = Box::new(move || {
        Box::new(ManualDriver::reopen(&factory_feed, "cam")) as Box<dyn CaptureDriver>
    });
    (
        CaptureSession::new(factory, FrameRelay::new(engine), REQUESTED),
        feed,
    )
}

type TestController = LifecycleController<CaptureSession, RenderLog, SharedNotices>;

fn controller() -> (TestController, ManualFeed, RenderLog, SharedNotices) {
    let (session, feed) = session(engine());
    let render = RenderLog::default();
    let notices = SharedNotices::default();
    (
        LifecycleController::new(session, render.clone(), notices.clone()),
        feed,
        render,
        notices,
    )
}

#[test]
fn test_permission_denied_at_launch() {
    let (mut controller, feed, render, notices) = controller();

    controller.start(PermissionStatus::NotGranted);
    assert_eq!(controller.state(), LifecycleState::AwaitingPermission);
    controller.permission_denied();

    assert_eq!(controller.state(), LifecycleState::Terminated);
    assert_eq!(feed.acquires(), 0, "capture must never be opened");
    assert_eq!(notices.count(&Notice::PermissionDenied), 1);
    assert_eq!(notices.all().last(), Some(&Notice::Terminated));
    assert_eq!(render.calls(), vec!["stop"]);

    // A late grant changes nothing
    controller.permission_granted();
    assert_eq!(feed.acquires(), 0);
    assert_eq!(notices.count(&Notice::PermissionDenied), 1);
}

#[test]
fn test_grant_after_request_opens_capture() {
    let (mut controller, feed, _render, notices) = controller();

    controller.start(PermissionStatus::NotGranted);
    assert_eq!(notices.all(), vec![Notice::PermissionRequested]);
    controller.permission_granted();

    assert_eq!(controller.state(), LifecycleState::Running);
    assert_eq!(feed.acquires(), 1);
    assert!(feed.deliver(7));
    assert_eq!(notices.all()[1], Notice::CaptureStarted(REQUESTED));
}

#[test]
fn test_background_foreground_closes_once_and_opens_once() {
    let (mut controller, feed, render, _notices) = controller();
    controller.start(PermissionStatus::Granted);
    assert!(feed.deliver(1));
    assert_eq!(feed.acquires(), 1);

    controller.background();
    assert_eq!(controller.state(), LifecycleState::Suspended);
    assert_eq!(feed.stops(), 1);
    assert_eq!(feed.releases(), 1);
    assert!(!controller.capture().is_open());

    let delivered = feed.deliveries();
    for _ in 0..5 {
        assert!(!feed.deliver(2));
    }
    assert_eq!(feed.deliveries(), delivered, "no deliveries while suspended");

    // Repeated background is a no-op
    controller.background();
    assert_eq!(feed.releases(), 1);

    controller.foreground();
    assert_eq!(controller.state(), LifecycleState::Running);
    assert_eq!(feed.acquires(), 2);
    assert_eq!(feed.releases(), 1);
    assert!(feed.deliver(3));
    assert_eq!(render.calls(), vec!["resume", "pause", "resume"]);
}

#[test]
fn test_round_trip_yields_fresh_session() {
    let (mut controller, _feed, _render, _notices) = controller();
    controller.start(PermissionStatus::Granted);
    let first = controller.capture().handle().unwrap();

    controller.background();
    controller.foreground();

    let source = controller.capture().source().unwrap();
    assert_eq!(source.state(), CaptureState::Active);
    assert_eq!(source.allocations(), 1);
    assert_eq!(source.buffer_size(), Some(REQUESTED.frame_size()));
    let second = controller.capture().handle().unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(controller.capture().opens(), 2);
}

#[test]
fn test_busy_device_is_retried_on_foreground() {
    let (mut controller, feed, _render, notices) = controller();
    feed.set_busy(true);

    controller.start(PermissionStatus::Granted);
    assert_eq!(controller.state(), LifecycleState::Running);
    assert!(!controller.capture().is_open());
    assert!(matches!(notices.all()[0], Notice::DeviceUnavailable(_)));

    feed.set_busy(false);
    controller.foreground();
    assert!(controller.capture().is_open());
    assert_eq!(
        notices.all().last(),
        Some(&Notice::CaptureStarted(REQUESTED))
    );
}

#[test]
fn test_shutdown_releases_capture() {
    let (mut controller, feed, render, notices) = controller();
    controller.start(PermissionStatus::Granted);
    controller.shutdown();

    assert_eq!(controller.state(), LifecycleState::Terminated);
    assert_eq!(feed.releases(), 1);
    assert!(!feed.is_held());
    assert_eq!(render.calls(), vec!["resume", "stop"]);
    assert_eq!(notices.count(&Notice::Terminated), 1);
}

#[test]
fn test_full_pipeline_with_render_loop() {
    let engine = engine();
    let sink_engine = engine.clone();
    let (session, feed) = session(engine.clone());
    let surface = HeadlessSurface::new(80, 60);
    let render = RenderLoop::spawn(
        RenderDriver::new(engine.clone()),
        Box::new(surface.clone()),
        200,
    )
    .unwrap();
    let stats = render.stats();
    let notices = SharedNotices::default();
    let mut controller = LifecycleController::new(session, render, notices.clone());

    controller.start(PermissionStatus::Granted);
    let deadline = Instant::now() + Duration::from_secs(2);
    while stats.ticks() < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(stats.ticks() >= 3, "render loop should tick once resumed");
    assert_eq!(surface.created(), 1);

    assert!(feed.deliver(50));
    assert!(sink_engine.latest().has_frame());

    controller.background();
    thread::sleep(Duration::from_millis(30));
    let paused_ticks = stats.ticks();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(stats.ticks(), paused_ticks, "no ticks while suspended");

    controller.shutdown();
    assert_eq!(surface.destroyed(), 1);
    assert_eq!(notices.count(&Notice::Terminated), 1);
}
