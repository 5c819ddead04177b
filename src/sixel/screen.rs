//! Frame-level sixel compositor.
//!
//! All placements for one frame are accumulated and flushed as a single
//! terminal write, so the render loop can wrap text and pixels in one
//! synchronized-update pair. The compositor performs no deduplication:
//! deciding whether a placement is worth emitting at all is the placement
//! tracker's job.

use std::io::{self, Write};

use super::SixelImage;

/// Collects the sixel placements of the current frame.
#[derive(Debug, Default)]
pub struct SixelScreen {
    frame: Vec<u8>,
    placements: usize,
}

impl SixelScreen {
    pub fn new() -> Self {
        SixelScreen::default()
    }

    /// Append a placement: cursor positioning escape for the anchor cell
    /// (0-based) followed by the clipped encoding. Placements are flushed
    /// in insertion order.
    pub fn add(
        &mut self,
        image: &SixelImage,
        col: u16,
        row: u16,
        leave_upper: usize,
        leave_lower: usize,
    ) {
        if image.is_empty() {
            return;
        }
        // CUP is 1-based.
        self.frame
            .extend_from_slice(format!("\x1b[{};{}H", row + 1, col + 1).as_bytes());
        let result = if leave_upper > 0 {
            image.write_leave_upper(&mut self.frame, leave_upper)
        } else if leave_lower > 0 {
            image.write_leave_lower(&mut self.frame, leave_lower)
        } else {
            image.write(&mut self.frame)
        };
        // Writing into a Vec cannot fail.
        debug_assert!(result.is_ok());
        self.placements += 1;
    }

    /// Number of placements accumulated since the last `reset`.
    pub fn placements(&self) -> usize {
        self.placements
    }

    /// Flush the frame's placements as one write.
    pub fn write(&self, out: &mut impl Write) -> io::Result<()> {
        if !self.frame.is_empty() {
            out.write_all(&self.frame)?;
        }
        Ok(())
    }

    /// Clear for the next frame.
    pub fn reset(&mut self) {
        self.frame.clear();
        self.placements = 0;
    }
}
