//! Polymorphic bitmap scaling.
//!
//! Two backends implement the same contract: a pure-CPU path built on the
//! `image` crate and an optional native-accelerated path loaded from a
//! shared library at startup. The native probe failing for any reason
//! silently selects the CPU path; the rest of the pipeline cannot tell the
//! difference.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::bitmap::Bitmap;
use crate::error::ResizeError;

pub mod cpu;
pub mod native;

pub use cpu::CpuResizer;
pub use native::NativeResizer;

/// Scaled output pixels in one of the layouts the sixel encoder accepts.
#[derive(Debug, Clone)]
pub enum ScaledPixels {
    Gray(Vec<u8>),
    Rgba(Vec<u8>),
    /// Palette-indexed pixels plus an RGBA color table of at most 256 entries.
    Indexed {
        indices: Vec<u8>,
        palette: Vec<[u8; 4]>,
    },
}

/// One resize result. A zero-area target yields an empty image, not an
/// error.
#[derive(Debug, Clone)]
pub struct ScaledImage {
    pub width: u32,
    pub height: u32,
    pub pixels: ScaledPixels,
}

impl ScaledImage {
    pub fn empty() -> Self {
        ScaledImage {
            width: 0,
            height: 0,
            pixels: ScaledPixels::Rgba(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A backend-specific resource bound to exactly one source bitmap. The
/// native session owns an uploaded copy of the pixels and releases it on
/// drop; the CPU session is stateless.
pub trait ResizeSession {
    fn resize(&mut self, max_width: u32, max_height: u32) -> Result<ScaledImage, ResizeError>;

    /// Identical scaling plus on-the-fly quantization to at most `colors`
    /// palette entries.
    fn resize_palettized(
        &mut self,
        colors: u32,
        max_width: u32,
        max_height: u32,
    ) -> Result<ScaledImage, ResizeError>;
}

/// Backend chosen once at startup.
pub trait ResizeBackend {
    fn name(&self) -> &'static str;

    /// Whether sessions can produce indexed output directly. When false the
    /// encoder quantizes RGB output itself.
    fn supports_palettized(&self) -> bool;

    fn open(&self, bitmap: Arc<Bitmap>) -> Result<Box<dyn ResizeSession>, ResizeError>;
}

/// Aspect-preserving fit into a bounding box.
///
/// The ratio is followed even above 1.0, so a box larger than the source
/// upscales. Whether upscaling is intended policy is an open product
/// question; callers that want to forbid it can clamp the box first.
pub fn fit_size(orig_w: u32, orig_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if orig_w == 0 || orig_h == 0 || max_w == 0 || max_h == 0 {
        return (0, 0);
    }
    let ratio = (f64::from(max_w) / f64::from(orig_w)).min(f64::from(max_h) / f64::from(orig_h));
    (
        (f64::from(orig_w) * ratio).round() as u32,
        (f64::from(orig_h) * ratio).round() as u32,
    )
}

/// Pick the resize backend for this process. Any native failure falls back
/// to the CPU path without surfacing an error to the user.
pub fn select_backend(
    native_lib: Option<&Path>,
    force_cpu: bool,
    verbose: bool,
) -> Box<dyn ResizeBackend> {
    if force_cpu {
        return Box::new(CpuResizer);
    }
    let path = native_lib.unwrap_or_else(|| Path::new(native::DEFAULT_LIBRARY));
    match NativeResizer::probe(path, verbose) {
        Ok(backend) => {
            info!(path = %path.display(), "native image resizer loaded");
            Box::new(backend)
        }
        Err(err) => {
            info!(error = %err, "native image resizer unavailable, scaling on CPU");
            Box::new(CpuResizer)
        }
    }
}
