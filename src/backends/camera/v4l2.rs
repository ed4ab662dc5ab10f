// SPDX-License-Identifier: GPL-3.0-only

//! Video4Linux2 capture driver
//!
//! Opens a `/dev/video*` node, negotiates a YUV 4:2:0 format (NV12 preferred,
//! YUYV as fallback) and runs a memory-mapped stream on a delivery thread.
//! Each dequeued frame is converted into the armed NV21 buffer, or counted as
//! dropped when nothing is armed.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use tracing::{debug, info, trace, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

use super::buffer::ArmSlot;
use super::format_converters::{self, SourceFormat};
use super::frame_loop::{DeliveryThread, LoopAction};
use super::types::*;
use super::{CaptureDriver, FrameCallback};
use crate::constants::{STOP_CHECK_INTERVAL, V4L2_STREAM_BUFFERS};

/// Consecutive dequeue errors after which the stream is considered dead
const MAX_CONSECUTIVE_ERRORS: u32 = 30;

/// Decide whether the stream survives a failed dequeue
///
/// A timeout only means no frame arrived within [`STOP_CHECK_INTERVAL`]; it
/// hands control back to the delivery loop so the stop flag is seen, and
/// does not count towards the error limit.
fn dequeue_failed(errors: &mut u32, error: &io::Error, path: &str) -> LoopAction {
    if error.kind() == io::ErrorKind::TimedOut {
        trace!(path = %path, "No frame within dequeue timeout");
        return LoopAction::Continue;
    }
    *errors += 1;
    warn!(path = %path, error = %error, errors = *errors, "Failed to dequeue frame");
    if *errors >= MAX_CONSECUTIVE_ERRORS {
        warn!(path = %path, "Too many capture errors, stopping stream");
        return LoopAction::Stop;
    }
    LoopAction::Continue
}

/// Formats requested in order of preference
const PREFERRED_FORMATS: [SourceFormat; 3] =
    [SourceFormat::Nv12, SourceFormat::Nv21, SourceFormat::Yuyv];

/// A V4L2 capture node found on the system
#[derive(Debug, Clone)]
pub struct V4l2DeviceInfo {
    pub path: String,
    pub real_path: String,
    pub card: String,
    pub driver: String,
    /// Current format, e.g. `640x480 YUYV`
    pub format: Option<String>,
}

/// Enumerate `/dev/video*` nodes that answer QUERYCAP
pub fn list_devices() -> Vec<V4l2DeviceInfo> {
    let mut paths: Vec<_> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("video"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    paths
        .iter()
        .filter_map(|path| {
            let dev = Device::with_path(path).ok()?;
            let caps = dev.query_caps().ok()?;
            let path_str = path.to_string_lossy().to_string();
            let real_path = std::fs::canonicalize(path)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| path_str.clone());
            let format = dev
                .format()
                .ok()
                .map(|f| format!("{}x{} {}", f.width, f.height, f.fourcc));
            debug!(path = %path_str, card = %caps.card, "Found V4L2 device");
            Some(V4l2DeviceInfo {
                path: path_str,
                real_path,
                card: caps.card,
                driver: caps.driver,
                format,
            })
        })
        .collect()
}

/// Map an open/ioctl error onto the capture error vocabulary
fn map_device_error(path: &str, err: io::Error) -> BackendError {
    match err.kind() {
        io::ErrorKind::NotFound => {
            BackendError::DeviceUnavailable(format!("{} not present", path))
        }
        io::ErrorKind::PermissionDenied => BackendError::PermissionDenied(format!(
            "no access to {}: {}",
            path, err
        )),
        _ if err.raw_os_error() == Some(libc::EBUSY) => {
            BackendError::DeviceUnavailable(format!("{} is busy", path))
        }
        _ if err.raw_os_error() == Some(libc::ENODEV) => {
            BackendError::DeviceUnavailable(format!("{} disappeared", path))
        }
        _ => BackendError::IoError(format!("{}: {}", path, err)),
    }
}

/// State owned by the delivery thread
struct StreamState {
    stream: Stream<'static>,
    _device: Arc<Device>,
    errors: u32,
}

pub struct V4l2Driver {
    path: String,
    device: Option<Arc<Device>>,
    format: Option<(Format, SourceFormat)>,
    delivery: Option<DeliveryThread>,
    dropped: Arc<AtomicU64>,
}

impl V4l2Driver {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            device: None,
            format: None,
            delivery: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn device(&self) -> BackendResult<Arc<Device>> {
        self.device
            .clone()
            .ok_or_else(|| BackendError::Other(format!("{} not acquired", self.path)))
    }
}

impl CaptureDriver for V4l2Driver {
    fn name(&self) -> &str {
        &self.path
    }

    fn acquire(&mut self) -> BackendResult<DeviceHandle> {
        if self.device.is_some() {
            return Err(BackendError::DeviceUnavailable(format!(
                "{} is already held",
                self.path
            )));
        }
        if !Path::new(&self.path).exists() {
            return Err(BackendError::DeviceUnavailable(format!(
                "{} not present",
                self.path
            )));
        }
        let device =
            Device::with_path(&self.path).map_err(|e| map_device_error(&self.path, e))?;
        if let Ok(caps) = device.query_caps() {
            info!(path = %self.path, card = %caps.card, driver = %caps.driver, "Opened V4L2 device");
        }
        self.device = Some(Arc::new(device));
        Ok(DeviceHandle::issue(&self.path))
    }

    fn request_resolution(&mut self, requested: Resolution) -> BackendResult<()> {
        let device = self.device()?;

        for candidate in PREFERRED_FORMATS {
            let wanted = Format::new(
                requested.width,
                requested.height,
                FourCC::new(candidate.fourcc()),
            );
            let actual = match device.set_format(&wanted) {
                Ok(f) => f,
                Err(e) => {
                    let mapped = map_device_error(&self.path, e);
                    if mapped.is_transient() {
                        return Err(mapped);
                    }
                    debug!(fourcc = ?candidate, error = %mapped, "Format rejected");
                    continue;
                }
            };
            if let Some(source_format) = SourceFormat::from_fourcc(&actual.fourcc.repr) {
                info!(
                    width = actual.width,
                    height = actual.height,
                    fourcc = %actual.fourcc,
                    stride = actual.stride,
                    "V4L2 format configured"
                );
                self.format = Some((actual, source_format));
                return Ok(());
            }
            debug!(requested = ?candidate, got = %actual.fourcc, "Device substituted format");
        }

        Err(BackendError::FormatNotSupported(format!(
            "{} offers none of NV12, NV21, YUYV",
            self.path
        )))
    }

    fn resolution(&self) -> BackendResult<Resolution> {
        self.format
            .as_ref()
            .map(|(f, _)| Resolution::new(f.width, f.height))
            .ok_or_else(|| BackendError::Other("no format negotiated".to_string()))
    }

    fn start_delivery(
        &mut self,
        slot: Arc<ArmSlot>,
        mut on_frame: FrameCallback,
    ) -> BackendResult<()> {
        if self.delivery.is_some() {
            return Err(BackendError::Other("delivery already running".to_string()));
        }
        let device = self.device()?;
        let (format, source_format) = self
            .format
            .clone()
            .ok_or_else(|| BackendError::Other("no format negotiated".to_string()))?;
        let stride = format.stride as usize;
        let dropped = Arc::clone(&self.dropped);
        let path = self.path.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), io::Error>>(1);

        // The stream is created on the delivery thread, which then owns it
        // until stop.
        let mut delivery = DeliveryThread::spawn_with_init(
            "v4l2-capture",
            move || match Stream::with_buffers(&device, Type::VideoCapture, V4L2_STREAM_BUFFERS) {
                Ok(mut stream) => {
                    // Bounded dequeue so a stalled device cannot block stop()
                    stream.set_timeout(STOP_CHECK_INTERVAL);
                    let _ = ready_tx.send(Ok(()));
                    Ok(StreamState {
                        stream,
                        _device: device,
                        errors: 0,
                    })
                }
                Err(e) => {
                    let message = e.to_string();
                    let _ = ready_tx.send(Err(e));
                    Err(message)
                }
            },
            move |state: &mut StreamState| {
                let (data, _meta) = match state.stream.next() {
                    Ok(frame) => frame,
                    Err(e) => return dequeue_failed(&mut state.errors, &e, &path),
                };
                state.errors = 0;

                let Some(mut buffer) = slot.try_take() else {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    return LoopAction::Continue;
                };
                match format_converters::convert_into(source_format, data, stride, &mut buffer) {
                    Ok(()) => on_frame(buffer),
                    Err(e) => {
                        warn!(path = %path, error = %e, "Discarding malformed frame");
                        dropped.fetch_add(1, Ordering::Relaxed);
                        // Return the credit so the next frame can be delivered
                        let _ = slot.arm(buffer);
                    }
                }
                LoopAction::Continue
            },
        )?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.delivery = Some(delivery);
                Ok(())
            }
            Ok(Err(e)) => {
                delivery.join();
                Err(map_device_error(&self.path, e))
            }
            Err(_) => {
                delivery.join();
                Err(BackendError::Other("capture thread exited early".to_string()))
            }
        }
    }

    fn stop_delivery(&mut self) {
        if let Some(mut delivery) = self.delivery.take() {
            delivery.stop();
            debug!(path = %self.path, "V4L2 stream stopped");
        }
    }

    fn release(&mut self) {
        self.stop_delivery();
        if self.device.take().is_some() {
            self.format = None;
            debug!(path = %self.path, "V4L2 device closed");
        }
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for V4l2Driver {
    fn drop(&mut self) {
        self.release();
    }
}
