//! Slot-grid viewer: the thin consumer that drives the pipeline.
//!
//! Lays the requested images out in a grid of slots, fetches them through
//! the worker pool, and runs the render loop: text cells through ratatui's
//! diffing buffer, pixels through the sixel compositor, both flushed inside
//! one synchronized-update pair per cycle.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::buffer::Buffer;
use ratatui::layout::Position;
use ratatui::style::{Color, Style};
use ratatui::DefaultTerminal;
use tracing::debug;
use unicode_width::UnicodeWidthChar;

use muon::fetch::{FetchEvent, Fetcher, SlotId};
use muon::surface::CellRect;
use muon::{Bitmap, CellMetrics, ImageProcessor, ImageSlot, SixelScreen, TextGrid};

/// Begin/end synchronized update, so supporting terminals present the text
/// diff and the sixel overlay atomically.
const BEGIN_SYNC: &[u8] = b"\x1bP=1s\x1b\\";
const END_SYNC: &[u8] = b"\x1bP=2s\x1b\\";

const SELECTED_BG: Color = Color::DarkGray;

struct Slot {
    url: String,
    bitmap: Option<Arc<Bitmap>>,
    image: ImageSlot,
    /// Fetch outstanding or resolved; failed slots stay text-only.
    resolved: bool,
}

pub struct Viewer {
    fetcher: Fetcher,
    events: Receiver<FetchEvent>,
    processor: ImageProcessor,
    metrics: CellMetrics,
    slots: Vec<Slot>,
    columns: u16,
    selected: usize,
}

impl Viewer {
    pub fn new(
        fetcher: Fetcher,
        events: Receiver<FetchEvent>,
        processor: ImageProcessor,
        metrics: CellMetrics,
        urls: Vec<String>,
        columns: u16,
    ) -> Self {
        let slots = urls
            .into_iter()
            .map(|url| Slot {
                url,
                bitmap: None,
                image: ImageSlot::new(),
                resolved: false,
            })
            .collect();
        Viewer {
            fetcher,
            events,
            processor,
            metrics,
            slots,
            columns: columns.max(1),
            selected: 0,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> io::Result<()> {
        for (i, slot) in self.slots.iter().enumerate() {
            self.fetcher.request(&slot.url, i as SlotId);
        }

        let mut screen = SixelScreen::new();
        let mut full_redraw = true;
        loop {
            self.drain_fetch_events();
            self.encode_pending();

            let mut out = io::stdout();
            out.write_all(BEGIN_SYNC)?;
            let metrics = self.metrics;
            let columns = self.columns;
            let selected = self.selected;
            let status = format!(
                "q quit  arrows select  [{} scaling]",
                self.processor.backend_name()
            );
            let slots = &mut self.slots;
            terminal.draw(|frame| {
                let buffer = frame.buffer_mut();
                render_slots(buffer, slots, &metrics, columns, selected, full_redraw, &mut screen);
                let area = buffer.area;
                if area.height > 0 {
                    buffer.set_stringn(
                        0,
                        area.height - 1,
                        &status,
                        usize::from(area.width),
                        Style::default().fg(Color::DarkGray),
                    );
                }
            })?;
            screen.write(&mut out)?;
            screen.reset();
            out.write_all(END_SYNC)?;
            out.flush()?;
            full_redraw = false;

            if event::poll(Duration::from_millis(100))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Left | KeyCode::Char('h') => {
                            self.selected = self.selected.saturating_sub(1);
                        }
                        KeyCode::Right | KeyCode::Char('l') => {
                            if self.selected + 1 < self.slots.len() {
                                self.selected += 1;
                            }
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let cols = usize::from(self.columns);
                            self.selected = self.selected.saturating_sub(cols);
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            let cols = usize::from(self.columns);
                            if self.selected + cols < self.slots.len() {
                                self.selected += cols;
                            }
                        }
                        _ => {}
                    },
                    Event::Resize(_, _) => {
                        self.handle_resize(terminal)?;
                        full_redraw = true;
                    }
                    _ => {}
                }
            }
        }
    }

    fn drain_fetch_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            let Some(slot) = self.slots.get_mut(event.tag as usize) else {
                continue;
            };
            debug!(url = %event.url, ok = event.bitmap.is_some(), "fetch resolved for slot");
            slot.resolved = true;
            slot.bitmap = event.bitmap;
            slot.image.clear_image();
        }
    }

    /// Encode any slot that has a decoded bitmap but no sixel data yet.
    fn encode_pending(&mut self) {
        let (slot_w, slot_h) = self.slot_size();
        if slot_h < 2 {
            return;
        }
        let (max_w, max_h) = self.metrics.pixel_box(slot_w, slot_h - 1);
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.image.has_image() {
                continue;
            }
            let Some(bitmap) = &slot.bitmap else { continue };
            match self.processor.process(i as SlotId, bitmap, max_w, max_h) {
                Some(sixel) => slot.image.set_image(sixel),
                None => {
                    // Fatal to this placement only; render the slot text-only.
                    slot.bitmap = None;
                    self.processor.release(i as SlotId);
                }
            }
        }
    }

    fn handle_resize(&mut self, terminal: &mut DefaultTerminal) -> io::Result<()> {
        if let Ok(metrics) = CellMetrics::detect() {
            self.metrics = metrics;
        }
        // Every scaled bitmap and placement derives from the old geometry.
        self.processor.clear();
        for slot in &mut self.slots {
            slot.image.invalidate();
        }
        terminal.clear()
    }

    fn slot_size(&self) -> (u16, u16) {
        let grid_rows = (self.slots.len() as u16).div_ceil(self.columns).max(1);
        let width = self.metrics.cols / self.columns;
        // Keep the last terminal row free for status output.
        let height = self.metrics.rows.saturating_sub(1) / grid_rows;
        (width, height)
    }
}

fn render_slots(
    buffer: &mut Buffer,
    slots: &mut [Slot],
    metrics: &CellMetrics,
    columns: u16,
    selected: usize,
    full_redraw: bool,
    screen: &mut SixelScreen,
) {
    let grid_rows = (slots.len() as u16).div_ceil(columns).max(1);
    let slot_w = metrics.cols / columns;
    let slot_h = metrics.rows.saturating_sub(1) / grid_rows;
    if slot_w == 0 || slot_h < 2 {
        return;
    }
    for (i, slot) in slots.iter_mut().enumerate() {
        let col = (i as u16) % columns;
        let row = (i as u16) / columns;
        let x = col * slot_w;
        let y = row * slot_h;
        let is_selected = i == selected;

        let title = match (&slot.bitmap, slot.resolved) {
            (Some(_), _) => slot.url.as_str(),
            (None, true) => "(no image)",
            (None, false) => "(fetching)",
        };
        let style = if is_selected {
            Style::default().bg(SELECTED_BG)
        } else {
            Style::default()
        };
        buffer.set_stringn(
            x,
            y + slot_h - 1,
            truncate_to_width(title, usize::from(slot_w)),
            usize::from(slot_w),
            style,
        );

        let area = CellRect {
            x: i32::from(x),
            y: i32::from(y),
            width: slot_w,
            height: slot_h - 1,
        };
        let mut grid = BufferGrid {
            buffer: &mut *buffer,
        };
        slot.image
            .draw(&mut grid, metrics, area, is_selected, full_redraw, screen);
    }
}

fn truncate_to_width(text: &str, max: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if width + w > max {
            break;
        }
        width += w;
        out.push(ch);
    }
    out
}

/// The render loop's cell buffer viewed as the tracked text layer.
struct BufferGrid<'a> {
    buffer: &'a mut Buffer,
}

impl TextGrid for BufferGrid<'_> {
    fn size(&self) -> (u16, u16) {
        (self.buffer.area.width, self.buffer.area.height)
    }

    fn glyph(&self, x: u16, y: u16) -> char {
        self.buffer
            .cell(Position::new(x, y))
            .and_then(|cell| cell.symbol().chars().next())
            .unwrap_or(' ')
    }

    fn set_glyph(&mut self, x: u16, y: u16, glyph: char, selected: bool) {
        if let Some(cell) = self.buffer.cell_mut(Position::new(x, y)) {
            cell.set_char(glyph);
            cell.set_bg(if selected { SELECTED_BG } else { Color::Reset });
        }
    }
}
