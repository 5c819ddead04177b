//! Sixel wire-format encoder.
//!
//! Pixels are emitted in 6-row horizontal bands. Within a band each palette
//! color present gets a `#i` selection followed by run-length column data
//! (`!N` repeats for runs longer than three), a `$` carriage return between
//! colors, and a `-` band advance. The stream opens with the DCS introducer
//! plus raster attributes and palette definitions and closes with ST.
//!
//! The encoding is stored with one byte chunk per band so the partial
//! emission modes are cheap: the sixel protocol anchors at the cursor cell
//! and the terminal cannot clip it, so off-screen rows must be dropped from
//! the byte stream itself.

use std::io::{self, Write};

use crate::resize::cpu::{quantize_gray, quantize_rgba};
use crate::resize::{ScaledImage, ScaledPixels};

const INTRODUCER: &[u8] = b"\x1bP0;1;0q";
const TERMINATOR: &[u8] = b"\x1b\\";

/// An encoded image: palette definitions + band chunks + pixel bounds.
/// The introducer and raster attributes are rendered at write time, so a
/// clipped emission advertises the height it actually transmits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SixelImage {
    palette: Vec<u8>,
    bands: Vec<Vec<u8>>,
    width: u32,
    height: u32,
}

impl SixelImage {
    /// Encode a scaled bitmap. RGB input is quantized to an adaptive
    /// 256-color palette, grayscale to an even luminance ramp; palettized
    /// input uses its palette as-is.
    pub fn encode(scaled: &ScaledImage) -> Self {
        if scaled.is_empty() {
            return SixelImage {
                palette: Vec::new(),
                bands: Vec::new(),
                width: 0,
                height: 0,
            };
        }
        let (indices, palette) = match &scaled.pixels {
            ScaledPixels::Indexed { indices, palette } => (indices.clone(), palette.clone()),
            ScaledPixels::Rgba(data) => quantize_rgba(data, 256),
            ScaledPixels::Gray(data) => quantize_gray(data, 256),
        };
        let width = scaled.width as usize;
        let height = scaled.height as usize;

        let mut defs = Vec::with_capacity(palette.len() * 12);
        for (i, [r, g, b, _]) in palette.iter().enumerate() {
            // Sixel palette components are on a 0-100 scale.
            defs.extend_from_slice(
                format!(
                    "#{};2;{};{};{}",
                    i,
                    u32::from(*r) * 100 / 255,
                    u32::from(*g) * 100 / 255,
                    u32::from(*b) * 100 / 255,
                )
                .as_bytes(),
            );
        }

        let mut bands = Vec::with_capacity(height.div_ceil(6));
        let mut present = vec![false; palette.len()];
        for band_start in (0..height).step_by(6) {
            let band_rows = 6.min(height - band_start);
            present.fill(false);
            for row in 0..band_rows {
                for &idx in &indices[(band_start + row) * width..(band_start + row + 1) * width] {
                    present[idx as usize] = true;
                }
            }

            let mut chunk = Vec::new();
            for (color, _) in present.iter().enumerate().filter(|(_, p)| **p) {
                chunk.extend_from_slice(format!("#{}", color).as_bytes());
                let mut run_char = 0u8;
                let mut run_len = 0u32;
                for x in 0..width {
                    let mut bits = 0u8;
                    for row in 0..band_rows {
                        if indices[(band_start + row) * width + x] as usize == color {
                            bits |= 1 << row;
                        }
                    }
                    let ch = 0x3F + bits;
                    if run_len > 0 && ch == run_char {
                        run_len += 1;
                    } else {
                        flush_run(&mut chunk, run_char, run_len);
                        run_char = ch;
                        run_len = 1;
                    }
                }
                flush_run(&mut chunk, run_char, run_len);
                chunk.push(b'$');
            }
            chunk.push(b'-');
            bands.push(chunk);
        }

        SixelImage {
            palette: defs,
            bands,
            width: scaled.width,
            height: scaled.height,
        }
    }

    /// Pixel bounds of the encoded image.
    pub fn bounds(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Emit the full encoding.
    pub fn write(&self, out: &mut impl Write) -> io::Result<()> {
        self.write_clipped(out, 0, 0)
    }

    /// Emit the encoding minus the first `rows` bands, for images whose top
    /// is above the visible area.
    pub fn write_leave_upper(&self, out: &mut impl Write, rows: usize) -> io::Result<()> {
        self.write_clipped(out, rows, 0)
    }

    /// Emit the encoding minus the last `rows` bands, for images whose
    /// bottom would overflow the terminal's pixel height.
    pub fn write_leave_lower(&self, out: &mut impl Write, rows: usize) -> io::Result<()> {
        self.write_clipped(out, 0, rows)
    }

    fn write_clipped(&self, out: &mut impl Write, upper: usize, lower: usize) -> io::Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let first = upper.min(self.bands.len());
        let last = self.bands.len().saturating_sub(lower).max(first);
        // Advertise only the rows actually transmitted; the last band may
        // be partial.
        let emitted_h = if last == self.bands.len() {
            (self.height as usize).saturating_sub(first * 6)
        } else {
            (last - first) * 6
        };
        out.write_all(INTRODUCER)?;
        out.write_all(format!("\"1;1;{};{}", self.width, emitted_h).as_bytes())?;
        out.write_all(&self.palette)?;
        for band in &self.bands[first..last] {
            out.write_all(band)?;
        }
        out.write_all(TERMINATOR)
    }
}

fn flush_run(chunk: &mut Vec<u8>, ch: u8, len: u32) {
    match len {
        0 => {}
        1..=3 => chunk.extend(std::iter::repeat(ch).take(len as usize)),
        _ => chunk.extend_from_slice(format!("!{}{}", len, ch as char).as_bytes()),
    }
}
