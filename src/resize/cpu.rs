//! CPU resize backend built on `image::imageops`.

use std::sync::Arc;

use color_quant::NeuQuant;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

use crate::bitmap::{Bitmap, PixelFormat};
use crate::error::ResizeError;

use super::{fit_size, ResizeBackend, ResizeSession, ScaledImage, ScaledPixels};

/// Stateless software scaler; `open` just pins the source bitmap.
pub struct CpuResizer;

impl ResizeBackend for CpuResizer {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn supports_palettized(&self) -> bool {
        false
    }

    fn open(&self, bitmap: Arc<Bitmap>) -> Result<Box<dyn ResizeSession>, ResizeError> {
        Ok(Box::new(CpuSession { bitmap }))
    }
}

struct CpuSession {
    bitmap: Arc<Bitmap>,
}

impl ResizeSession for CpuSession {
    fn resize(&mut self, max_width: u32, max_height: u32) -> Result<ScaledImage, ResizeError> {
        let (out_w, out_h) = fit_size(
            self.bitmap.width(),
            self.bitmap.height(),
            max_width,
            max_height,
        );
        if out_w == 0 || out_h == 0 {
            return Ok(ScaledImage::empty());
        }
        let pixels = match self.bitmap.format() {
            PixelFormat::Gray => {
                let src = GrayImage::from_raw(
                    self.bitmap.width(),
                    self.bitmap.height(),
                    self.bitmap.data().to_vec(),
                )
                .expect("bitmap buffer matches its dimensions");
                let out = imageops::resize(&src, out_w, out_h, FilterType::Triangle);
                ScaledPixels::Gray(out.into_raw())
            }
            PixelFormat::Rgba => {
                let src = RgbaImage::from_raw(
                    self.bitmap.width(),
                    self.bitmap.height(),
                    self.bitmap.data().to_vec(),
                )
                .expect("bitmap buffer matches its dimensions");
                let out = imageops::resize(&src, out_w, out_h, FilterType::Triangle);
                ScaledPixels::Rgba(out.into_raw())
            }
        };
        Ok(ScaledImage {
            width: out_w,
            height: out_h,
            pixels,
        })
    }

    fn resize_palettized(
        &mut self,
        colors: u32,
        max_width: u32,
        max_height: u32,
    ) -> Result<ScaledImage, ResizeError> {
        let scaled = self.resize(max_width, max_height)?;
        if scaled.is_empty() {
            return Ok(scaled);
        }
        let colors = colors.clamp(2, 256) as usize;
        let (indices, palette) = match scaled.pixels {
            ScaledPixels::Gray(data) => quantize_gray(&data, colors),
            ScaledPixels::Rgba(data) => quantize_rgba(&data, colors),
            indexed @ ScaledPixels::Indexed { .. } => {
                return Ok(ScaledImage {
                    width: scaled.width,
                    height: scaled.height,
                    pixels: indexed,
                })
            }
        };
        Ok(ScaledImage {
            width: scaled.width,
            height: scaled.height,
            pixels: ScaledPixels::Indexed { indices, palette },
        })
    }
}

/// Adaptive palette via NeuQuant, the same quantizer the image ecosystem
/// uses for GIF output.
pub(crate) fn quantize_rgba(rgba: &[u8], colors: usize) -> (Vec<u8>, Vec<[u8; 4]>) {
    let quant = NeuQuant::new(10, colors, rgba);
    let indices = rgba
        .chunks_exact(4)
        .map(|px| quant.index_of(px) as u8)
        .collect();
    let map = quant.color_map_rgba();
    let palette = map.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect();
    (indices, palette)
}

/// Grayscale needs no adaptive pass: an even luminance ramp is exact.
pub(crate) fn quantize_gray(gray: &[u8], colors: usize) -> (Vec<u8>, Vec<[u8; 4]>) {
    let steps = colors.min(256) as u32;
    let palette = (0..steps)
        .map(|i| {
            let v = (i * 255 / (steps - 1).max(1)) as u8;
            [v, v, v, 255]
        })
        .collect();
    let indices = gray
        .iter()
        .map(|&v| (u32::from(v) * (steps - 1) / 255) as u8)
        .collect();
    (indices, palette)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn solid_bitmap(width: u32, height: u32, rgba: [u8; 4]) -> Arc<Bitmap> {
        let data = rgba.repeat((width * height) as usize);
        Arc::new(Bitmap::from_rgba(data, width, height))
    }

    #[test]
    fn test_resize_fits_box() {
        let backend = CpuResizer;
        let mut session = backend.open(solid_bitmap(800, 600, [200, 10, 10, 255])).unwrap();
        let scaled = session.resize(320, 180).unwrap();
        assert_eq!((scaled.width, scaled.height), (240, 180));
        match scaled.pixels {
            ScaledPixels::Rgba(data) => assert_eq!(data.len(), 240 * 180 * 4),
            other => panic!("expected RGBA output, got {other:?}"),
        }
    }

    #[test]
    fn test_resize_zero_box_is_empty() {
        let backend = CpuResizer;
        let mut session = backend.open(solid_bitmap(16, 16, [0, 0, 0, 255])).unwrap();
        let scaled = session.resize(0, 0).unwrap();
        assert!(scaled.is_empty());
    }

    #[test]
    fn test_resize_preserves_solid_color() {
        let backend = CpuResizer;
        let mut session = backend.open(solid_bitmap(64, 64, [10, 200, 30, 255])).unwrap();
        let scaled = session.resize(32, 32).unwrap();
        match scaled.pixels {
            ScaledPixels::Rgba(data) => {
                assert_eq!(&data[..4], &[10, 200, 30, 255]);
                assert_eq!(&data[data.len() - 4..], &[10, 200, 30, 255]);
            }
            other => panic!("expected RGBA output, got {other:?}"),
        }
    }

    #[test]
    fn test_palettized_resize_bounds_palette() {
        let backend = CpuResizer;
        let mut session = backend.open(solid_bitmap(64, 64, [10, 200, 30, 255])).unwrap();
        let scaled = session.resize_palettized(16, 32, 32).unwrap();
        match scaled.pixels {
            ScaledPixels::Indexed { indices, palette } => {
                assert_eq!(indices.len(), 32 * 32);
                assert!(palette.len() <= 16);
                let idx = indices[0] as usize;
                let [r, g, b, _] = palette[idx];
                // NeuQuant converges close to the single input color.
                assert!((i32::from(r) - 10).abs() < 32);
                assert!((i32::from(g) - 200).abs() < 32);
                assert!((i32::from(b) - 30).abs() < 32);
            }
            other => panic!("expected indexed output, got {other:?}"),
        }
    }

    #[test]
    fn test_gray_ramp_quantization() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(8, 8, image::Luma([255])));
        let backend = CpuResizer;
        let mut session = backend.open(Arc::new(Bitmap::from_decoded(gray))).unwrap();
        let scaled = session.resize_palettized(256, 8, 8).unwrap();
        match scaled.pixels {
            ScaledPixels::Indexed { indices, palette } => {
                assert_eq!(palette[indices[0] as usize], [255, 255, 255, 255]);
            }
            other => panic!("expected indexed output, got {other:?}"),
        }
    }
}
