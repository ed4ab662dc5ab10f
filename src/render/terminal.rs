// SPDX-License-Identifier: GPL-3.0-only

//! Terminal surface and sink
//!
//! Renders processed frames to the terminal using Unicode half-block
//! characters, two vertical pixels per cell, with a one-line status bar at
//! the bottom.

use crossterm::{
    cursor::{Hide, Show},
    event::{DisableFocusChange, EnableFocusChange},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    style::Style, widgets::Widget,
};
use std::io::{Stdout, stdout};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::surface::Surface;
use crate::engine::{PresentSink, ProcessedFrame, Viewport};
use crate::errors::{AppError, AppResult};

/// Text shown in the status bar, shared between the host and the sink
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    text: Arc<Mutex<String>>,
}

impl StatusLine {
    pub fn new(text: &str) -> Self {
        let line = Self::default();
        line.set(text);
        line
    }

    pub fn set(&self, text: &str) {
        let mut current = self.text.lock().unwrap_or_else(|e| e.into_inner());
        current.clear();
        current.push_str(text);
    }

    pub fn get(&self) -> String {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// The terminal in raw mode on the alternate screen
///
/// Size is reported in half-block pixels, excluding the status line.
#[derive(Debug, Default)]
pub struct TerminalSurface {
    active: bool,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Surface for TerminalSurface {
    fn create(&mut self) -> AppResult<()> {
        enable_raw_mode().map_err(|e| AppError::Render(format!("raw mode: {}", e)))?;
        if let Err(e) = execute!(stdout(), EnterAlternateScreen, EnableFocusChange, Hide) {
            let _ = disable_raw_mode();
            return Err(AppError::Render(format!("alternate screen: {}", e)));
        }
        self.active = true;
        debug!("Terminal surface created");
        Ok(())
    }

    fn size(&mut self) -> Option<(u32, u32)> {
        let (cols, rows) = terminal::size().ok()?;
        Some((cols as u32, rows.saturating_sub(1) as u32 * 2))
    }

    fn destroy(&mut self) {
        if !self.active {
            return;
        }
        if let Err(e) = execute!(stdout(), DisableFocusChange, LeaveAlternateScreen, Show) {
            warn!(error = %e, "Failed to leave alternate screen");
        }
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "Failed to restore terminal mode");
        }
        self.active = false;
        debug!("Terminal surface destroyed");
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Present sink drawing into the terminal surface
pub struct TerminalSink {
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    status: StatusLine,
}

impl TerminalSink {
    pub fn new(status: StatusLine) -> Self {
        Self {
            terminal: None,
            status,
        }
    }
}

impl PresentSink for TerminalSink {
    fn init(&mut self) -> AppResult<()> {
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))
            .map_err(|e| AppError::Render(e.to_string()))?;
        terminal
            .clear()
            .map_err(|e| AppError::Render(e.to_string()))?;
        self.terminal = Some(terminal);
        Ok(())
    }

    fn present(&mut self, frame: &ProcessedFrame, viewport: Viewport) -> AppResult<()> {
        let terminal = self
            .terminal
            .as_mut()
            .ok_or_else(|| AppError::Render("terminal sink not initialised".to_string()))?;
        let status = self.status.get();

        terminal
            .draw(|f| draw_frame(f, frame, viewport, &status))
            .map_err(|e| AppError::Render(e.to_string()))?;
        Ok(())
    }
}

/// Cells covered by `viewport` inside the frame area above the status line
///
/// The viewport is in half-block pixels: one column per pixel, one row per
/// two pixels. It is centered and clipped to the available area.
pub fn viewport_area(area: Rect, viewport: Viewport) -> Rect {
    let available = Rect {
        height: area.height.saturating_sub(1),
        ..area
    };
    let width = viewport.width.min(available.width as u32) as u16;
    let height = viewport.height.div_ceil(2).min(available.height as u32) as u16;
    Rect {
        x: available.x + (available.width - width) / 2,
        y: available.y + (available.height - height) / 2,
        width,
        height,
    }
}

/// Draw one frame into `viewport` and the status line below it
pub fn draw_frame(f: &mut Frame, frame: &ProcessedFrame, viewport: Viewport, status: &str) {
    let area = f.area();
    f.render_widget(&FrameWidget { frame }, viewport_area(area, viewport));

    let status_area = Rect {
        x: area.x,
        y: area.y + area.height.saturating_sub(1),
        width: area.width,
        height: area.height.min(1),
    };
    f.render_widget(StatusBar { message: status }, status_area);
}

/// Widget that renders a grayscale frame using half-block characters
pub struct FrameWidget<'a> {
    pub frame: &'a ProcessedFrame,
}

impl Widget for &FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let frame = self.frame;
        if frame.sequence == 0 {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        }
        if area.width == 0 || area.height == 0 {
            return;
        }

        // Fit the frame, each cell holding two vertical pixels
        let frame_aspect = frame.width() as f64 / frame.height() as f64;
        let term_width = area.width as f64;
        let term_height = (area.height as f64) * 2.0;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            ((h * frame_aspect) as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            (w as u16, (w / frame_aspect / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;
        let x_scale = frame.width() as f64 / display_width as f64;
        let y_scale = frame.height() as f64 / (display_height as f64 * 2.0);

        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(frame, src_x, src_y_top));
                    cell.set_bg(sample_pixel(frame, src_x, src_y_bottom));
                }
            }
        }
    }
}

fn sample_pixel(frame: &ProcessedFrame, x: u32, y: u32) -> Color {
    let x = x.min(frame.width() - 1);
    let y = y.min(frame.height() - 1);
    let v = frame.image.get_pixel(x, y).0[0];
    Color::Rgb(v, v, v)
}

/// Status bar widget
pub struct StatusBar<'a> {
    pub message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use ratatui::backend::TestBackend;

    fn frame(width: u32, height: u32, value: u8) -> ProcessedFrame {
        ProcessedFrame {
            sequence: 1,
            image: GrayImage::from_pixel(width, height, image::Luma([value])),
        }
    }

    #[test]
    fn test_frame_widget_fills_with_half_blocks() {
        let frame = frame(8, 8, 255);
        let area = Rect::new(0, 0, 4, 2);
        let mut buf = Buffer::empty(area);
        (&FrameWidget { frame: &frame }).render(area, &mut buf);
        let cell = &buf[(0u16, 0u16)];
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.fg, Color::Rgb(255, 255, 255));
        assert_eq!(cell.bg, Color::Rgb(255, 255, 255));
    }

    fn drawn_cells(viewport: Viewport) -> usize {
        let mut terminal = Terminal::new(TestBackend::new(20, 11)).unwrap();
        let frame = frame(8, 8, 200);
        terminal
            .draw(|f| draw_frame(f, &frame, viewport, "status"))
            .unwrap();
        let buffer = terminal.backend().buffer();
        (0..10u16)
            .flat_map(|y| (0..20u16).map(move |x| (x, y)))
            .filter(|&pos| buffer[pos].symbol() == "▀")
            .count()
    }

    #[test]
    fn test_smaller_viewport_shrinks_drawn_region() {
        let full = drawn_cells(Viewport {
            width: 20,
            height: 20,
        });
        let small = drawn_cells(Viewport {
            width: 8,
            height: 8,
        });
        assert_eq!(full, 20 * 10);
        assert_eq!(small, 8 * 4);
    }

    #[test]
    fn test_viewport_area_is_centered_and_clipped() {
        let area = Rect::new(0, 0, 20, 11);
        assert_eq!(
            viewport_area(
                area,
                Viewport {
                    width: 8,
                    height: 7
                }
            ),
            Rect::new(6, 3, 8, 4)
        );
        assert_eq!(
            viewport_area(
                area,
                Viewport {
                    width: 500,
                    height: 500
                }
            ),
            Rect::new(0, 0, 20, 10)
        );
    }

    #[test]
    fn test_blank_frame_shows_placeholder() {
        let blank = ProcessedFrame::blank();
        let area = Rect::new(0, 0, 30, 3);
        let mut buf = Buffer::empty(area);
        (&FrameWidget { frame: &blank }).render(area, &mut buf);
        let row: String = (0..30u16).map(|x| buf[(x, 1u16)].symbol().to_string()).collect();
        assert!(row.contains("Waiting for camera"));
    }

    #[test]
    fn test_status_bar_truncates() {
        let area = Rect::new(0, 0, 5, 1);
        let mut buf = Buffer::empty(area);
        StatusBar {
            message: "edge viewer running",
        }
        .render(area, &mut buf);
        let row: String = (0..5u16).map(|x| buf[(x, 0u16)].symbol().to_string()).collect();
        assert_eq!(row, "edge ");
    }

    #[test]
    fn test_status_line_is_shared() {
        let line = StatusLine::new("starting");
        let clone = line.clone();
        clone.set("running");
        assert_eq!(line.get(), "running");
    }
}
