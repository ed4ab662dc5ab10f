// SPDX-License-Identifier: GPL-3.0-only
//! Delivery thread lifecycle
//!
//! Threaded drivers run their frame delivery on a dedicated thread that plays
//! the role of the device callback thread. [`DeliveryThread`] owns that
//! thread and gives `stop_delivery` its blocking guarantee: once `stop()`
//! returns, the loop body will never run again, so no frame callback can
//! race a later open.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Returned by the loop body to control the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Handle to a running delivery loop
pub struct DeliveryThread {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl DeliveryThread {
    /// Spawn a loop calling `loop_fn` until it returns [`LoopAction::Stop`]
    /// or [`stop`](Self::stop) is called
    pub fn spawn<F>(name: &str, mut loop_fn: F) -> io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn_with_init(name, || Ok(()), move |_: &mut ()| loop_fn())
    }

    /// Spawn a loop whose state is built on the delivery thread itself
    ///
    /// `init_fn` runs once on the new thread. If it fails the thread exits
    /// without running the loop; the error is logged.
    pub fn spawn_with_init<S, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> io::Result<Self>
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting delivery thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init_fn() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(name = %thread_name, error = %e, "Delivery thread initialisation failed");
                        return;
                    }
                };

                while !stop.load(Ordering::SeqCst) {
                    if loop_fn(&mut state) == LoopAction::Stop {
                        debug!(name = %thread_name, "Loop requested stop");
                        break;
                    }
                }

                info!(name = %thread_name, "Delivery thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop and wait until the thread has exited
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.join();
    }

    /// Wait for the thread to finish without signalling it
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for delivery thread");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Delivery thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for DeliveryThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}
