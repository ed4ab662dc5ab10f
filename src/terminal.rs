// SPDX-License-Identifier: GPL-3.0-only

//! Terminal edge viewer
//!
//! Hosts the pipeline in the terminal: the lifecycle controller runs on the
//! main thread and is fed from keyboard and focus events, the permission
//! prompt, and Ctrl+C.

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use edge_viewer::backends::camera::get_driver;
use edge_viewer::config::{Config, PermissionPolicy};
use edge_viewer::constants::INPUT_POLL_INTERVAL;
use edge_viewer::engine::EdgeEngine;
use edge_viewer::lifecycle::{
    CaptureSession, DriverFactory, HostNotifier, LifecycleController, LifecycleSignal,
    LifecycleState, Notice, PermissionStatus,
};
use edge_viewer::pipelines::FrameRelay;
use edge_viewer::render::{RenderDriver, RenderLoop, StatusLine, TerminalSink, TerminalSurface};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use tracing::{debug, info};

const KEY_HINTS: &str = "'b' background | 'f' foreground | 'q' quit";

/// Forwards notices to the main loop and mirrors them in the status bar
struct ChannelNotifier {
    sender: mpsc::Sender<Notice>,
    status: StatusLine,
}

impl HostNotifier for ChannelNotifier {
    fn notify(&mut self, notice: Notice) {
        info!(%notice, "Notice");
        self.status.set(&format!("{} | {}", notice, KEY_HINTS));
        let _ = self.sender.send(notice);
    }
}

/// Run the terminal edge viewer
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let status = StatusLine::new("Starting...");
    let engine = Arc::new(EdgeEngine::new(
        config.edge_params(),
        Box::new(TerminalSink::new(status.clone())),
    ));

    let driver_config = config.clone();
    let factory: DriverFactory = Box::new(move || get_driver(&driver_config));
    let session = CaptureSession::new(factory, FrameRelay::new(engine.clone()), config.resolution());
    let render = RenderLoop::spawn(
        RenderDriver::new(engine.clone()),
        Box::new(TerminalSurface::new()),
        config.render_fps,
    )?;

    let (sender, notices) = mpsc::channel();
    let notifier = ChannelNotifier {
        sender,
        status: status.clone(),
    };
    let mut controller = LifecycleController::new(session, render, notifier);

    // Ctrl+C outside raw mode (e.g. at the permission prompt)
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::SeqCst);
    })?;

    let permission = match config.permission {
        PermissionPolicy::Granted => PermissionStatus::Granted,
        PermissionPolicy::Ask | PermissionPolicy::Denied => PermissionStatus::NotGranted,
    };
    controller.start(permission);

    let mut denied = false;
    let mut last_problem: Option<String> = None;

    while controller.state() != LifecycleState::Terminated {
        while let Ok(notice) = notices.try_recv() {
            match notice {
                Notice::PermissionRequested => {
                    let granted = match config.permission {
                        PermissionPolicy::Ask => prompt_permission()?,
                        PermissionPolicy::Granted => true,
                        PermissionPolicy::Denied => false,
                    };
                    if interrupted.load(Ordering::SeqCst) {
                        controller.shutdown();
                    } else if granted {
                        controller.permission_granted();
                    } else {
                        controller.permission_denied();
                    }
                }
                Notice::PermissionDenied => denied = true,
                Notice::DeviceUnavailable(reason) | Notice::CaptureFailed(reason) => {
                    last_problem = Some(reason);
                }
                Notice::CaptureStarted(_) => last_problem = None,
                Notice::Terminated => {}
            }
        }

        if controller.state() == LifecycleState::Terminated {
            break;
        }
        if interrupted.load(Ordering::SeqCst) {
            controller.shutdown();
            continue;
        }

        if let Some(signal) = poll_signal()? {
            debug!(?signal, "Input signal");
            controller.handle(signal);
        }
    }

    if denied {
        println!("Camera permission denied, exiting.");
    } else if let Some(reason) = last_problem {
        println!("Camera was not available: {}", reason);
    }

    Ok(())
}

/// Ask for camera access on the (still cooked) terminal
fn prompt_permission() -> io::Result<bool> {
    print!("Allow edge-viewer to use the camera? [y/N] ");
    io::stdout().flush()?;

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Wait up to one poll interval for an input event and map it to a signal
fn poll_signal() -> io::Result<Option<LifecycleSignal>> {
    if !event::poll(INPUT_POLL_INTERVAL)? {
        return Ok(None);
    }

    let signal = match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(LifecycleSignal::Shutdown)
            }
            KeyCode::Char('q') | KeyCode::Esc => Some(LifecycleSignal::Shutdown),
            KeyCode::Char('b') => Some(LifecycleSignal::Background),
            KeyCode::Char('f') => Some(LifecycleSignal::Foreground),
            _ => None,
        },
        Event::FocusLost => Some(LifecycleSignal::Background),
        Event::FocusGained => Some(LifecycleSignal::Foreground),
        _ => None,
    };
    Ok(signal)
}
