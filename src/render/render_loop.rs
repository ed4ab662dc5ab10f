// SPDX-License-Identifier: GPL-3.0-only

//! Vsync-paced render loop
//!
//! Runs a [`RenderDriver`] on a dedicated graphics thread. The thread drives
//! a current-thread tokio runtime whose interval ticker stands in for the
//! display's vsync; each tick is one draw. The loop starts paused and is
//! controlled through a watch channel, so only the latest command matters.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::driver::RenderDriver;
use super::surface::Surface;
use crate::constants::frame_interval;
use crate::lifecycle::RenderControl;

/// Commands accepted by the render thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderCommand {
    Run,
    Pause,
    Stop,
}

/// Counters shared with the render thread
#[derive(Debug, Default)]
pub struct RenderStats {
    ticks: AtomicU64,
    surfaces_created: AtomicU64,
    surface_failures: AtomicU64,
}

impl RenderStats {
    /// Vsync ticks that reached the driver
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn surfaces_created(&self) -> u64 {
        self.surfaces_created.load(Ordering::SeqCst)
    }

    pub fn surface_failures(&self) -> u64 {
        self.surface_failures.load(Ordering::SeqCst)
    }
}

pub struct RenderLoop {
    control: watch::Sender<RenderCommand>,
    thread: Option<JoinHandle<()>>,
    stats: Arc<RenderStats>,
}

impl RenderLoop {
    /// Start the graphics thread, paused, ticking at `fps` once resumed
    pub fn spawn(driver: RenderDriver, surface: Box<dyn Surface>, fps: u32) -> io::Result<Self> {
        let (control, commands) = watch::channel(RenderCommand::Pause);
        let stats = Arc::new(RenderStats::default());
        let thread_stats = Arc::clone(&stats);
        let cadence = frame_interval(fps);

        info!(fps, "Starting render loop");

        let thread = thread::Builder::new()
            .name("render".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(error = %e, "Failed to build render runtime");
                        return;
                    }
                };
                runtime.block_on(run(driver, surface, commands, cadence, thread_stats));
            })?;

        Ok(Self {
            control,
            thread: Some(thread),
            stats,
        })
    }

    pub fn stats(&self) -> Arc<RenderStats> {
        Arc::clone(&self.stats)
    }

    /// The command the loop is currently following
    pub fn command(&self) -> RenderCommand {
        *self.control.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn send(&self, command: RenderCommand) {
        let previous = self.control.send_replace(command);
        if previous != command {
            debug!(?previous, ?command, "Render command");
        }
    }
}

impl RenderControl for RenderLoop {
    fn resume(&mut self) {
        self.send(RenderCommand::Run);
    }

    fn pause(&mut self) {
        self.send(RenderCommand::Pause);
    }

    /// Stop the loop and wait for the graphics thread to destroy the surface
    fn stop(&mut self) {
        self.send(RenderCommand::Stop);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Render thread panicked");
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

async fn run(
    mut driver: RenderDriver,
    mut surface: Box<dyn Surface>,
    mut commands: watch::Receiver<RenderCommand>,
    cadence: Duration,
    stats: Arc<RenderStats>,
) {
    let mut ticker = tokio::time::interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut created = false;

    loop {
        let command = *commands.borrow_and_update();
        match command {
            RenderCommand::Stop => break,
            RenderCommand::Pause => {
                if commands.changed().await.is_err() {
                    break;
                }
                continue;
            }
            RenderCommand::Run => {}
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = commands.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        if !created {
            if let Err(e) = surface.create() {
                stats.surface_failures.fetch_add(1, Ordering::SeqCst);
                error!(error = %e, "Failed to create render surface");
                // Wait for the next command rather than retrying every tick
                if commands.changed().await.is_err() {
                    break;
                }
                continue;
            }
            created = true;
            stats.surfaces_created.fetch_add(1, Ordering::SeqCst);
            driver.on_created();
        }

        if let Some((width, height)) = surface.size() {
            driver.on_resized(width, height);
        }
        driver.on_draw();
        stats.ticks.fetch_add(1, Ordering::SeqCst);
    }

    if created {
        surface.destroy();
    }
    info!(draws = driver.draws(), "Render loop stopped");
}
