//! Native-accelerated resize backend.
//!
//! Binds the four-entry-point ABI of the accelerator shared library:
//!
//! ```c
//! int   init(int verbose);
//! void *createImageResizer(unsigned w, unsigned h, unsigned rowPitch,
//!                          unsigned pixelSize, void *data, int *status);
//! int   resize(void *handle, unsigned outW, unsigned outH, void *out);
//! int   resize_paletted(void *handle, unsigned outW, unsigned outH,
//!                       void *out, void *palette, unsigned paletteSize);
//! int   releaseImageResizer(void *handle);
//! ```
//!
//! Any nonzero status is a recoverable `ResizeError::Backend` for that call
//! only. The handle returned by `createImageResizer` is a foreign resource
//! with a manual lifetime; here it is owned by `NativeSession`, whose `Drop`
//! releases it exactly once, so use-after-release and double-release cannot
//! be expressed.

use std::ffi::{c_int, c_uint, c_void};
use std::path::Path;
use std::sync::Arc;

use libloading::Library;
use tracing::warn;

use crate::bitmap::{Bitmap, PixelFormat};
use crate::error::ResizeError;

use super::{fit_size, ResizeBackend, ResizeSession, ScaledImage, ScaledPixels};

/// Library probed when no explicit path is configured.
pub const DEFAULT_LIBRARY: &str = "libclir.so";

type InitFn = unsafe extern "C" fn(c_int) -> c_int;
type CreateFn =
    unsafe extern "C" fn(c_uint, c_uint, c_uint, c_uint, *const c_void, *mut c_int) -> *mut c_void;
type ResizeFn = unsafe extern "C" fn(*mut c_void, c_uint, c_uint, *mut c_void) -> c_int;
type ResizePalettedFn = unsafe extern "C" fn(
    *mut c_void,
    c_uint,
    c_uint,
    *mut c_void,
    *mut c_void,
    c_uint,
) -> c_int;
type ReleaseFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// Resolved entry points. The raw symbols are plain function pointers that
/// stay valid for as long as `_library` is alive, which the owning `Arc`
/// guarantees for every session.
struct NativeLib {
    _library: Library,
    create: libloading::os::unix::Symbol<CreateFn>,
    resize: libloading::os::unix::Symbol<ResizeFn>,
    resize_paletted: libloading::os::unix::Symbol<ResizePalettedFn>,
    release: libloading::os::unix::Symbol<ReleaseFn>,
}

/// Backend wrapping the accelerator library. Construct via [`probe`].
///
/// [`probe`]: NativeResizer::probe
pub struct NativeResizer {
    lib: Arc<NativeLib>,
}

impl NativeResizer {
    /// Load the library and run its capability probe. Every failure mode
    /// (missing library, missing symbol, nonzero init status) maps to a
    /// `ResizeError` the caller treats as "use the CPU".
    pub fn probe(path: &Path, verbose: bool) -> Result<Self, ResizeError> {
        let unavailable =
            |err: String| ResizeError::Unavailable(path.to_path_buf(), err);
        unsafe {
            let library = Library::new(path).map_err(|e| unavailable(e.to_string()))?;
            let init = library
                .get::<InitFn>(b"init\0")
                .map_err(|e| unavailable(e.to_string()))?;
            let status = init(c_int::from(verbose));
            if status != 0 {
                return Err(ResizeError::Backend(status));
            }
            let create = library
                .get::<CreateFn>(b"createImageResizer\0")
                .map_err(|e| unavailable(e.to_string()))?
                .into_raw();
            let resize = library
                .get::<ResizeFn>(b"resize\0")
                .map_err(|e| unavailable(e.to_string()))?
                .into_raw();
            let resize_paletted = library
                .get::<ResizePalettedFn>(b"resize_paletted\0")
                .map_err(|e| unavailable(e.to_string()))?
                .into_raw();
            let release = library
                .get::<ReleaseFn>(b"releaseImageResizer\0")
                .map_err(|e| unavailable(e.to_string()))?
                .into_raw();
            Ok(NativeResizer {
                lib: Arc::new(NativeLib {
                    _library: library,
                    create,
                    resize,
                    resize_paletted,
                    release,
                }),
            })
        }
    }
}

impl ResizeBackend for NativeResizer {
    fn name(&self) -> &'static str {
        "native"
    }

    fn supports_palettized(&self) -> bool {
        true
    }

    /// Uploads the pixel data once; subsequent resizes of the same bitmap
    /// reuse the uploaded copy.
    fn open(&self, bitmap: Arc<Bitmap>) -> Result<Box<dyn ResizeSession>, ResizeError> {
        let mut status: c_int = 0;
        let handle = unsafe {
            (self.lib.create)(
                bitmap.width(),
                bitmap.height(),
                bitmap.row_pitch(),
                bitmap.format().bytes_per_pixel(),
                bitmap.data().as_ptr().cast(),
                &mut status,
            )
        };
        if status != 0 || handle.is_null() {
            return Err(ResizeError::Backend(status));
        }
        Ok(Box::new(NativeSession {
            lib: Arc::clone(&self.lib),
            handle,
            width: bitmap.width(),
            height: bitmap.height(),
            format: bitmap.format(),
        }))
    }
}

/// Owns one uploaded image. Not `Send`: the handle stays on the thread
/// that created it.
struct NativeSession {
    lib: Arc<NativeLib>,
    handle: *mut c_void,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl ResizeSession for NativeSession {
    fn resize(&mut self, max_width: u32, max_height: u32) -> Result<ScaledImage, ResizeError> {
        let (out_w, out_h) = fit_size(self.width, self.height, max_width, max_height);
        if out_w == 0 || out_h == 0 {
            return Ok(ScaledImage::empty());
        }
        let mut out = vec![0u8; (out_w * out_h * self.format.bytes_per_pixel()) as usize];
        let status =
            unsafe { (self.lib.resize)(self.handle, out_w, out_h, out.as_mut_ptr().cast()) };
        if status != 0 {
            return Err(ResizeError::Backend(status));
        }
        let pixels = match self.format {
            PixelFormat::Gray => ScaledPixels::Gray(out),
            PixelFormat::Rgba => ScaledPixels::Rgba(out),
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
        let (out_w, out_h) = fit_size(self.width, self.height, max_width, max_height);
        if out_w == 0 || out_h == 0 {
            return Ok(ScaledImage::empty());
        }
        let colors = colors.clamp(2, 256);
        let mut indices = vec![0u8; (out_w * out_h) as usize];
        let mut palette_data = vec![0u8; (colors * 4) as usize];
        let status = unsafe {
            (self.lib.resize_paletted)(
                self.handle,
                out_w,
                out_h,
                indices.as_mut_ptr().cast(),
                palette_data.as_mut_ptr().cast(),
                colors,
            )
        };
        if status != 0 {
            return Err(ResizeError::Backend(status));
        }
        let palette = palette_data
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Ok(ScaledImage {
            width: out_w,
            height: out_h,
            pixels: ScaledPixels::Indexed { indices, palette },
        })
    }
}

impl Drop for NativeSession {
    fn drop(&mut self) {
        let status = unsafe { (self.lib.release)(self.handle) };
        if status != 0 {
            warn!(status, "releasing native resize handle failed");
        }
    }
}
