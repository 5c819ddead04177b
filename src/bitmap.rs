//! Decoded bitmaps as they come out of the fetch layer.
//!
//! A `Bitmap` is immutable once produced and shared by reference with any
//! number of resize sessions. Grayscale sources stay single-channel (the
//! native backend scales them without the RGBA expansion); everything else
//! is normalized to RGBA.

use image::DynamicImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One byte per pixel.
    Gray,
    /// Four bytes per pixel, RGBA order.
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Raw decoded pixels plus their layout.
#[derive(Debug, Clone)]
pub struct Bitmap {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Bitmap {
    /// Normalize a freshly decoded image into the pipeline's two layouts.
    pub fn from_decoded(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => {
                let (width, height) = gray.dimensions();
                Bitmap {
                    data: gray.into_raw(),
                    width,
                    height,
                    format: PixelFormat::Gray,
                }
            }
            other => {
                let rgba = other.to_rgba8();
                let (width, height) = rgba.dimensions();
                Bitmap {
                    data: rgba.into_raw(),
                    width,
                    height,
                    format: PixelFormat::Rgba,
                }
            }
        }
    }

    /// Build a bitmap from raw RGBA bytes. Used by tests and by callers that
    /// already hold decoded pixels.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len() as u32, width * height * 4);
        Bitmap {
            data,
            width,
            height,
            format: PixelFormat::Rgba,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes per pixel row. The decode path produces tightly packed rows.
    pub fn row_pitch(&self) -> u32 {
        self.width * self.format.bytes_per_pixel()
    }
}
