// SPDX-License-Identifier: GPL-3.0-only

//! Rendering: surface state, the vsync-paced render loop, and surfaces

pub mod driver;
pub mod render_loop;
pub mod surface;
pub mod terminal;

pub use driver::{RenderDriver, SurfaceState};
pub use render_loop::{RenderCommand, RenderLoop, RenderStats};
pub use surface::{HeadlessSurface, Surface};
pub use terminal::{StatusLine, TerminalSink, TerminalSurface};
