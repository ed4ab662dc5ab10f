// SPDX-License-Identifier: GPL-3.0-only

//! Lifecycle controller
//!
//! Starts and stops capture and rendering in lockstep with permission and
//! foreground/background/shutdown signals from the host.
//!
//! ```text
//!            start(NotGranted)                 denied
//!   Init ─────────────────────▶ AwaitingPermission ──────────▶ Terminated
//!    │                                │ granted                    ▲
//!    │ start(Granted)                 ▼                            │
//!    └──────────────────────────▶  Running ◀──────┐           shutdown
//!                                     │ background │ foreground  (any state)
//!                                     ▼            │
//!                                  Suspended ──────┘
//! ```
//!
//! The controller talks to the rest of the system only through three ports,
//! [`CaptureControl`], [`RenderControl`] and [`HostNotifier`], and runs on
//! the host's control thread.

pub mod session;

pub use session::{CaptureSession, DriverFactory};

use tracing::{debug, info, warn};

use crate::backends::camera::{BackendError, BackendResult, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Init,
    AwaitingPermission,
    Running,
    Suspended,
    Terminated,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Init => write!(f, "init"),
            LifecycleState::AwaitingPermission => write!(f, "awaiting permission"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Suspended => write!(f, "suspended"),
            LifecycleState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Signals the host feeds into the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    PermissionGranted,
    PermissionDenied,
    Foreground,
    Background,
    Shutdown,
}

/// Camera permission as known at launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    NotGranted,
}

/// User-visible events reported to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The host should ask the user for camera access
    PermissionRequested,
    /// Camera access was refused; the controller is shutting down
    PermissionDenied,
    /// The device is busy or absent; retried on the next foreground
    DeviceUnavailable(String),
    /// Opening capture failed for another reason; retried on the next foreground
    CaptureFailed(String),
    /// Frames are flowing at this resolution
    CaptureStarted(Resolution),
    /// The controller reached its final state
    Terminated,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::PermissionRequested => write!(f, "Camera permission required"),
            Notice::PermissionDenied => write!(f, "Camera permission denied"),
            Notice::DeviceUnavailable(reason) => write!(f, "Camera unavailable: {}", reason),
            Notice::CaptureFailed(reason) => write!(f, "Camera failed: {}", reason),
            Notice::CaptureStarted(resolution) => write!(f, "Capturing at {}", resolution),
            Notice::Terminated => write!(f, "Stopped"),
        }
    }
}

/// Capture side of the pipeline as seen by the controller
pub trait CaptureControl {
    /// Open a capture session; no-op returning the current resolution when
    /// one is already open
    fn open(&mut self) -> BackendResult<Resolution>;

    /// Close the session and release the device; no-op when closed
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Render side of the pipeline as seen by the controller
pub trait RenderControl {
    fn resume(&mut self);
    fn pause(&mut self);
    /// Stop for good, blocking until the render thread has exited
    fn stop(&mut self);
}

/// Receives user-visible notices
pub trait HostNotifier {
    fn notify(&mut self, notice: Notice);
}

pub struct LifecycleController<C, R, N> {
    capture: C,
    render: R,
    notifier: N,
    state: LifecycleState,
}

impl<C, R, N> LifecycleController<C, R, N>
where
    C: CaptureControl,
    R: RenderControl,
    N: HostNotifier,
{
    pub fn new(capture: C, render: R, notifier: N) -> Self {
        Self {
            capture,
            render,
            notifier,
            state: LifecycleState::Init,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn render(&self) -> &R {
        &self.render
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Leave `Init`, either waiting for permission or running right away
    pub fn start(&mut self, permission: PermissionStatus) {
        if self.state != LifecycleState::Init {
            debug!(state = %self.state, "Start ignored");
            return;
        }
        match permission {
            PermissionStatus::Granted => self.enter_running(),
            PermissionStatus::NotGranted => {
                self.transition(LifecycleState::AwaitingPermission);
                self.notifier.notify(Notice::PermissionRequested);
            }
        }
    }

    pub fn handle(&mut self, signal: LifecycleSignal) {
        use LifecycleSignal::*;
        use LifecycleState::*;

        match (self.state, signal) {
            (Terminated, _) => debug!(?signal, "Signal after termination ignored"),
            (_, Shutdown) => self.shutdown(),
            (AwaitingPermission, PermissionGranted) => self.enter_running(),
            (AwaitingPermission, PermissionDenied) => self.deny(),
            (Running, Background) => {
                self.render.pause();
                self.capture.close();
                self.transition(Suspended);
            }
            (Suspended, Foreground) => self.enter_running(),
            (Running, Foreground) if !self.capture.is_open() => {
                info!("Retrying capture");
                self.start_capture();
            }
            (state, signal) => debug!(%state, ?signal, "Signal has no effect"),
        }
    }

    pub fn permission_granted(&mut self) {
        self.handle(LifecycleSignal::PermissionGranted);
    }

    pub fn permission_denied(&mut self) {
        self.handle(LifecycleSignal::PermissionDenied);
    }

    pub fn foreground(&mut self) {
        self.handle(LifecycleSignal::Foreground);
    }

    pub fn background(&mut self) {
        self.handle(LifecycleSignal::Background);
    }

    /// Release capture, stop rendering, and terminate
    pub fn shutdown(&mut self) {
        if self.state == LifecycleState::Terminated {
            return;
        }
        self.capture.close();
        self.render.stop();
        self.transition(LifecycleState::Terminated);
        self.notifier.notify(Notice::Terminated);
    }

    fn transition(&mut self, next: LifecycleState) {
        info!(from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
    }

    fn enter_running(&mut self) {
        self.transition(LifecycleState::Running);
        self.render.resume();
        self.start_capture();
    }

    fn deny(&mut self) {
        warn!("Camera permission denied");
        self.notifier.notify(Notice::PermissionDenied);
        self.shutdown();
    }

    fn start_capture(&mut self) {
        match self.capture.open() {
            Ok(resolution) => self.notifier.notify(Notice::CaptureStarted(resolution)),
            Err(BackendError::PermissionDenied(reason)) => {
                warn!(reason = %reason, "Device refused access");
                self.deny();
            }
            Err(BackendError::DeviceUnavailable(reason)) => {
                warn!(reason = %reason, "Camera unavailable, will retry on foreground");
                self.notifier.notify(Notice::DeviceUnavailable(reason));
            }
            Err(e) => {
                warn!(error = %e, "Capture failed to open");
                self.notifier.notify(Notice::CaptureFailed(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeCapture {
        open: bool,
        failures: VecDeque<BackendError>,
        log: Vec<&'static str>,
    }

    impl CaptureControl for FakeCapture {
        fn open(&mut self) -> BackendResult<Resolution> {
            self.log.push("open");
            if let Some(err) = self.failures.pop_front() {
                return Err(err);
            }
            self.open = true;
            Ok(Resolution::new(640, 480))
        }

        fn close(&mut self) {
            if self.open {
                self.log.push("close");
            }
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    #[derive(Default)]
    struct FakeRender {
        log: Vec<&'static str>,
    }

    impl RenderControl for FakeRender {
        fn resume(&mut self) {
            self.log.push("resume");
        }

        fn pause(&mut self) {
            self.log.push("pause");
        }

        fn stop(&mut self) {
            self.log.push("stop");
        }
    }

    #[derive(Default)]
    struct Notices(Vec<Notice>);

    impl HostNotifier for Notices {
        fn notify(&mut self, notice: Notice) {
            self.0.push(notice);
        }
    }

    fn controller() -> LifecycleController<FakeCapture, FakeRender, Notices> {
        LifecycleController::new(FakeCapture::default(), FakeRender::default(), Notices::default())
    }

    #[test]
    fn test_start_granted_resumes_then_opens() {
        let mut c = controller();
        c.start(PermissionStatus::Granted);
        assert_eq!(c.state(), LifecycleState::Running);
        assert_eq!(c.render().log, vec!["resume"]);
        assert_eq!(c.capture().log, vec!["open"]);
        assert_eq!(
            c.notifier().0,
            vec![Notice::CaptureStarted(Resolution::new(640, 480))]
        );
    }

    #[test]
    fn test_start_not_granted_requests_permission() {
        let mut c = controller();
        c.start(PermissionStatus::NotGranted);
        assert_eq!(c.state(), LifecycleState::AwaitingPermission);
        assert_eq!(c.notifier().0, vec![Notice::PermissionRequested]);
        assert!(c.capture().log.is_empty());
    }

    #[test]
    fn test_awaiting_ignores_visibility_changes() {
        let mut c = controller();
        c.start(PermissionStatus::NotGranted);
        c.background();
        c.foreground();
        assert_eq!(c.state(), LifecycleState::AwaitingPermission);
        assert!(c.render().log.is_empty());
    }

    #[test]
    fn test_background_pauses_then_closes() {
        let mut c = controller();
        c.start(PermissionStatus::Granted);
        c.background();
        assert_eq!(c.state(), LifecycleState::Suspended);
        assert_eq!(c.render().log, vec!["resume", "pause"]);
        assert_eq!(c.capture().log, vec!["open", "close"]);
    }

    #[test]
    fn test_unavailable_device_stays_running_and_retries() {
        let mut c = controller();
        c.capture
            .failures
            .push_back(BackendError::DeviceUnavailable("busy".into()));
        c.start(PermissionStatus::Granted);
        assert_eq!(c.state(), LifecycleState::Running);
        assert!(!c.capture().is_open());
        assert_eq!(c.notifier().0, vec![Notice::DeviceUnavailable("busy".into())]);

        c.foreground();
        assert!(c.capture().is_open());
        assert_eq!(c.render().log, vec!["resume"]);
    }

    #[test]
    fn test_foreground_while_open_is_noop() {
        let mut c = controller();
        c.start(PermissionStatus::Granted);
        c.foreground();
        assert_eq!(c.capture().log, vec!["open"]);
    }

    #[test]
    fn test_device_permission_denied_terminates() {
        let mut c = controller();
        c.capture
            .failures
            .push_back(BackendError::PermissionDenied("EACCES".into()));
        c.start(PermissionStatus::Granted);
        assert_eq!(c.state(), LifecycleState::Terminated);
        assert_eq!(
            c.notifier().0,
            vec![Notice::PermissionDenied, Notice::Terminated]
        );
        assert_eq!(c.render().log, vec!["resume", "stop"]);
    }

    #[test]
    fn test_other_failure_reports_capture_failed() {
        let mut c = controller();
        c.capture
            .failures
            .push_back(BackendError::FormatNotSupported("MJPG only".into()));
        c.start(PermissionStatus::Granted);
        assert_eq!(c.state(), LifecycleState::Running);
        assert!(matches!(c.notifier().0[0], Notice::CaptureFailed(_)));
    }

    #[test]
    fn test_terminated_absorbs_everything() {
        let mut c = controller();
        c.start(PermissionStatus::Granted);
        c.shutdown();
        c.foreground();
        c.permission_granted();
        c.shutdown();
        c.start(PermissionStatus::Granted);
        assert_eq!(c.state(), LifecycleState::Terminated);
        assert_eq!(c.capture().log, vec!["open", "close"]);
        assert_eq!(c.render().log, vec!["resume", "stop"]);
        assert_eq!(c.notifier().0.last(), Some(&Notice::Terminated));
        assert_eq!(c.notifier().0.len(), 2);
    }

    #[test]
    fn test_shutdown_from_suspended() {
        let mut c = controller();
        c.start(PermissionStatus::Granted);
        c.background();
        c.shutdown();
        assert_eq!(c.state(), LifecycleState::Terminated);
        assert_eq!(c.capture().log, vec!["open", "close"]);
        assert_eq!(c.render().log, vec!["resume", "pause", "stop"]);
    }
}
