//! Terminal geometry in character cells and pixels.
//!
//! Sixel placement math needs to know how many pixels one text cell covers.
//! The primary source is the kernel's window-size report (crossterm wraps
//! the TIOCGWINSZ ioctl); terminals that report zero pixel dimensions would
//! need the CSI `14t`/`18t` escape queries instead, which require reading
//! the response off the tty and are left to the embedding application.

use std::io;

/// Terminal size in cells and pixels, with per-cell pixel derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMetrics {
    pub cols: u16,
    pub rows: u16,
    pub x_pixel: u32,
    pub y_pixel: u32,
}

impl CellMetrics {
    pub fn new(cols: u16, rows: u16, x_pixel: u32, y_pixel: u32) -> Self {
        CellMetrics {
            cols,
            rows,
            x_pixel,
            y_pixel,
        }
    }

    /// Read the current terminal size. Fails when the terminal does not
    /// report pixel dimensions, which leaves sixel placement impossible.
    pub fn detect() -> io::Result<Self> {
        let ws = crossterm::terminal::window_size()?;
        if ws.width == 0 || ws.height == 0 || ws.columns == 0 || ws.rows == 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "terminal does not report its pixel resolution",
            ));
        }
        Ok(CellMetrics::new(
            ws.columns,
            ws.rows,
            u32::from(ws.width),
            u32::from(ws.height),
        ))
    }

    /// Pixel width of one character cell. Zero cell counts (possible via
    /// `new`, rejected by `detect`) yield zero instead of dividing by zero.
    pub fn cell_width(&self) -> u32 {
        self.x_pixel / u32::from(self.cols.max(1))
    }

    /// Pixel height of one character cell.
    pub fn cell_height(&self) -> u32 {
        self.y_pixel / u32::from(self.rows.max(1))
    }

    /// Pixel bounding box covered by a rectangle of cells.
    pub fn pixel_box(&self, width_cells: u16, height_cells: u16) -> (u32, u32) {
        (
            u32::from(width_cells) * self.cell_width(),
            u32::from(height_cells) * self.cell_height(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_derivation() {
        let metrics = CellMetrics::new(80, 24, 1920, 1080);
        assert_eq!(metrics.cell_width(), 24);
        assert_eq!(metrics.cell_height(), 45);
    }

    #[test]
    fn test_pixel_box() {
        let metrics = CellMetrics::new(80, 24, 1920, 1080);
        assert_eq!(metrics.pixel_box(10, 4), (240, 180));
        assert_eq!(metrics.pixel_box(0, 0), (0, 0));
    }

    #[test]
    fn test_zero_cell_counts_do_not_panic() {
        let metrics = CellMetrics::new(0, 0, 0, 0);
        assert_eq!(metrics.cell_width(), 0);
        assert_eq!(metrics.cell_height(), 0);
        assert_eq!(metrics.pixel_box(3, 3), (0, 0));
    }

    #[test]
    fn test_uneven_division_truncates() {
        // 1278 px over 80 cols: cells are 15 px wide, the remainder is dead
        // space at the terminal edge.
        let metrics = CellMetrics::new(80, 24, 1278, 1080);
        assert_eq!(metrics.cell_width(), 15);
    }
}
