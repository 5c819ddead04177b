//! Per-slot placement tracking and dirty-region erasure.
//!
//! The text-cell renderer diffs its own buffer and repaints only cells whose
//! content changed; it knows nothing about the pixels a sixel write put on
//! top of those cells. Erasing a stale image therefore means forcing a
//! content transition over its footprint: every cell gets a visually blank
//! filler glyph, alternating between two different blank code points so
//! that erasing the same region twice in a row still registers as a change.
//!
//! The tracker also owns the skip logic that makes a steady-state redraw
//! free: when a slot's anchor cell and selection state are unchanged, no
//! erase, no re-encode and no placement happen at all.

use tracing::trace;

use crate::geometry::CellMetrics;
use crate::sixel::{SixelImage, SixelScreen};

/// Braille blank; first of the two alternating filler glyphs.
pub const ERASE_PRIMARY: char = '\u{2800}';
/// Figure space; second filler glyph.
pub const ERASE_SECONDARY: char = '\u{2007}';

/// The tracked text layer the erasure writes through. Implemented on the
/// application's cell buffer; tests use an in-memory grid.
pub trait TextGrid {
    /// Grid size in cells (cols, rows).
    fn size(&self) -> (u16, u16);
    fn glyph(&self, x: u16, y: u16) -> char;
    fn set_glyph(&mut self, x: u16, y: u16, glyph: char, selected: bool);
}

/// A rectangle of cells. `x`/`y` may be negative when a slot is partially
/// scrolled off the top of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub x: i32,
    pub y: i32,
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    col: i32,
    row: i32,
    selected: bool,
}

/// One visual slot's image state: the prepared encoding plus the record of
/// what was last put on screen.
#[derive(Debug, Default)]
pub struct ImageSlot {
    sixel: Option<SixelImage>,
    last: Option<Placement>,
    footprint: Option<CellRect>,
}

impl ImageSlot {
    pub fn new() -> Self {
        ImageSlot::default()
    }

    /// Install a freshly encoded image; the next draw places it.
    pub fn set_image(&mut self, sixel: SixelImage) {
        self.sixel = Some(sixel);
        self.last = None;
    }

    /// Drop the image; the next draw erases whatever is still on screen.
    pub fn clear_image(&mut self) {
        self.sixel = None;
    }

    /// Forget everything without erasing. For geometry changes, where the
    /// whole screen is cleared and every cached encoding is stale.
    pub fn invalidate(&mut self) {
        self.sixel = None;
        self.last = None;
        self.footprint = None;
    }

    pub fn has_image(&self) -> bool {
        self.sixel.is_some()
    }

    /// Draw this slot for the current frame.
    ///
    /// `area` is the cell region the image may occupy; the image is
    /// horizontally centered in it. Returns true when a placement was added
    /// to `screen`.
    pub fn draw<G: TextGrid>(
        &mut self,
        grid: &mut G,
        metrics: &CellMetrics,
        area: CellRect,
        selected: bool,
        full_redraw: bool,
        screen: &mut SixelScreen,
    ) -> bool {
        let cell_w = metrics.cell_width().max(1);
        let cell_h = metrics.cell_height().max(1);

        let Some(sixel) = &self.sixel else {
            // No image (not yet fetched, failed, or cleared): make sure no
            // stale pixels survive.
            if let Some(footprint) = self.footprint.take() {
                erase_region(grid, footprint, selected);
            }
            self.last = None;
            return false;
        };

        let (px_w, px_h) = sixel.bounds();
        let image_cols = (px_w / cell_w) as i32;
        let offset = ((i32::from(area.width) - image_cols) / 2).max(0);
        let placement = Placement {
            col: area.x + offset,
            row: area.y,
            selected,
        };

        let unchanged = self.last == Some(placement);
        if unchanged && !full_redraw {
            trace!(col = placement.col, row = placement.row, "placement unchanged, skipping");
            return false;
        }
        if !unchanged {
            if let Some(footprint) = self.footprint.take() {
                erase_region(grid, footprint, selected);
            }
        }

        let col = placement.col.max(0) as u16;
        if placement.row < 0 {
            // Top of the image is above the viewport: anchor at row 0 and
            // drop the hidden leading bands.
            let hidden_px = cell_h * placement.row.unsigned_abs();
            let leave_upper = hidden_px.div_ceil(6) as usize;
            screen.add(sixel, col, 0, leave_upper, 0);
        } else {
            let row = placement.row as u16;
            let bottom_px = u32::from(row) * cell_h + px_h;
            if bottom_px > metrics.y_pixel {
                let leave_lower = (bottom_px - metrics.y_pixel).div_ceil(6) as usize;
                screen.add(sixel, col, row, 0, leave_lower);
            } else {
                screen.add(sixel, col, row, 0, 0);
            }
        }

        self.footprint = Some(CellRect {
            x: placement.col,
            y: placement.row,
            width: px_w.div_ceil(cell_w).min(u32::from(u16::MAX)) as u16,
            height: px_h.div_ceil(cell_h).min(u32::from(u16::MAX)) as u16,
        });
        self.last = Some(placement);
        true
    }
}

/// Force a tracked-layer transition over `region` by writing filler glyphs,
/// toggling per cell between the two blank code points.
fn erase_region<G: TextGrid>(grid: &mut G, region: CellRect, selected: bool) {
    let (cols, rows) = grid.size();
    for y in region.y..region.y + i32::from(region.height) {
        if y < 0 || y >= i32::from(rows) {
            continue;
        }
        for x in region.x..region.x + i32::from(region.width) {
            if x < 0 || x >= i32::from(cols) {
                continue;
            }
            let (x, y) = (x as u16, y as u16);
            let next = if grid.glyph(x, y) == ERASE_PRIMARY {
                ERASE_SECONDARY
            } else {
                ERASE_PRIMARY
            };
            grid.set_glyph(x, y, next, selected);
        }
    }
}
