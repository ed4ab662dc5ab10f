// SPDX-License-Identifier: GPL-3.0-only

//! Capture port backed by real capture sources

use tracing::{debug, info};

use super::CaptureControl;
use crate::backends::camera::{
    BackendResult, CaptureDriver, CaptureSource, CaptureState, DeviceHandle, Resolution,
};
use crate::pipelines::FrameRelay;

/// Builds a driver for each new capture session
pub type DriverFactory = Box<dyn FnMut() -> Box<dyn CaptureDriver> + Send>;

/// One [`CaptureSource`] per open
///
/// A released source cannot be reopened, so every open builds a fresh source
/// around a fresh driver: each session negotiates, allocates and acquires
/// from scratch and holds a new handle. Closing drops the source together
/// with its driver.
pub struct CaptureSession {
    factory: DriverFactory,
    relay: FrameRelay,
    requested: Resolution,
    source: Option<CaptureSource>,
    opens: u64,
}

impl CaptureSession {
    pub fn new(factory: DriverFactory, relay: FrameRelay, requested: Resolution) -> Self {
        Self {
            factory,
            relay,
            requested,
            source: None,
            opens: 0,
        }
    }

    /// The live source, if a session is open
    pub fn source(&self) -> Option<&CaptureSource> {
        self.source.as_ref()
    }

    pub fn handle(&self) -> Option<DeviceHandle> {
        self.source.as_ref().and_then(|s| s.handle().cloned())
    }

    /// Successful opens so far
    pub fn opens(&self) -> u64 {
        self.opens
    }

    pub fn requested(&self) -> Resolution {
        self.requested
    }
}

impl CaptureControl for CaptureSession {
    fn open(&mut self) -> BackendResult<Resolution> {
        if let Some(source) = &self.source
            && source.state() == CaptureState::Active
            && let Some(resolution) = source.resolution()
        {
            debug!("Capture session already open");
            return Ok(resolution);
        }

        let mut source = CaptureSource::new((self.factory)());
        let resolution = source.open(self.requested, self.relay.clone())?;
        self.opens += 1;
        info!(session = self.opens, resolution = %resolution, "Capture session opened");
        self.source = Some(source);
        Ok(resolution)
    }

    fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            info!(session = self.opens, "Capture session closed");
        }
    }

    fn is_open(&self) -> bool {
        self.source.is_some()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::manual::{ManualDriver, ManualFeed};
    use crate::engine::ProcessingEngine;
    use std::sync::Arc;

    struct NullEngine;

    impl ProcessingEngine for NullEngine {
        fn consume_frame(&self, _width: u32, _height: u32, _pixels: &[u8]) {}
        fn on_context_created(&self) {}
        fn on_context_resized(&self, _width: u32, _height: u32) {}
        fn on_present(&self) {}
    }

    fn session() -> (CaptureSession, ManualFeed) {
        let (_, feed) = ManualDriver::new("cam");
        let factory_feed = feed.clone();
        let factory: DriverFactory = Box::new(move || {
            Box::new(ManualDriver::reopen(&factory_feed, "cam")) as Box<dyn CaptureDriver>
        });
        let relay = FrameRelay::new(Arc::new(NullEngine));
        (
            CaptureSession::new(factory, relay, Resolution::new(320, 240)),
            feed,
        )
    }

    #[test]
    fn test_open_is_idempotent() {
        let (mut session, feed) = session();
        session.open().unwrap();
        session.open().unwrap();
        assert_eq!(session.opens(), 1);
        assert_eq!(feed.acquires(), 1);
    }

    #[test]
    fn test_reopen_uses_new_handle() {
        let (mut session, feed) = session();
        session.open().unwrap();
        let first = session.handle().unwrap();
        session.close();
        assert!(!session.is_open());
        session.open().unwrap();
        let second = session.handle().unwrap();
        assert!(second.id > first.id);
        assert_eq!(feed.acquires(), 2);
        assert_eq!(feed.releases(), 1);
    }

    #[test]
    fn test_failed_open_leaves_session_closed() {
        let (mut session, feed) = session();
        feed.set_busy(true);
        assert!(session.open().is_err());
        assert!(!session.is_open());
        feed.set_busy(false);
        assert!(session.open().is_ok());
    }
}
