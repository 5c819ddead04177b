//! muon - asynchronous image pipeline for sixel-capable terminal UIs
//!
//! The crate turns remote images into sixel byte streams that coexist with a
//! redrawn text-cell grid: deduplicated fetch + decode on a worker pool,
//! CPU or native-accelerated scaling, band-oriented sixel encoding with
//! off-screen clipping, and per-slot placement tracking that erases stale
//! pixels the text renderer cannot see.

pub mod bitmap;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod pipeline;
pub mod resize;
pub mod sixel;
pub mod surface;

pub use bitmap::{Bitmap, PixelFormat};
pub use error::{FetchError, ResizeError};
pub use fetch::{FetchEvent, Fetcher, HttpLoader, Loader, SlotId};
pub use geometry::CellMetrics;
pub use pipeline::ImageProcessor;
pub use resize::{fit_size, select_backend, ResizeBackend, ScaledImage, ScaledPixels};
pub use sixel::{SixelImage, SixelScreen};
pub use surface::{ImageSlot, TextGrid};
