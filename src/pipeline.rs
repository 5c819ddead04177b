//! Resize-and-encode orchestration.
//!
//! Owns the resize backend chosen at startup and keeps one open session per
//! visual slot, so re-laying-out the same bitmap (scroll, column change)
//! reuses the backend's uploaded copy instead of re-creating it. A terminal
//! geometry change calls `clear`, which drops every session and with it
//! every outstanding native handle.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::bitmap::Bitmap;
use crate::fetch::SlotId;
use crate::resize::{ResizeBackend, ResizeSession};
use crate::sixel::SixelImage;

/// Palette size requested from palettized-capable backends.
const PALETTE_COLORS: u32 = 256;

struct SlotSession {
    session: Box<dyn ResizeSession>,
    /// The bitmap the session was opened for. Held here so the identity
    /// `process` compares can never be a recycled allocation; backend
    /// sessions do not keep their own reference.
    source: Arc<Bitmap>,
}

/// Turns decoded bitmaps into sixel encodings sized for a pixel box.
pub struct ImageProcessor {
    backend: Box<dyn ResizeBackend>,
    sessions: HashMap<SlotId, SlotSession>,
}

impl ImageProcessor {
    pub fn new(backend: Box<dyn ResizeBackend>) -> Self {
        ImageProcessor {
            backend,
            sessions: HashMap::new(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Scale `bitmap` to fit the pixel box and encode it.
    ///
    /// Returns `None` for a zero-area target or any backend failure; a
    /// failed resize is fatal to this one placement only, so the error is
    /// logged and the slot simply has no image this frame.
    pub fn process(
        &mut self,
        slot: SlotId,
        bitmap: &Arc<Bitmap>,
        max_width: u32,
        max_height: u32,
    ) -> Option<SixelImage> {
        let reuse = self
            .sessions
            .get(&slot)
            .is_some_and(|open| Arc::ptr_eq(&open.source, bitmap));
        if !reuse {
            self.sessions.remove(&slot);
            match self.backend.open(Arc::clone(bitmap)) {
                Ok(session) => {
                    self.sessions.insert(
                        slot,
                        SlotSession {
                            session,
                            source: Arc::clone(bitmap),
                        },
                    );
                }
                Err(err) => {
                    warn!(slot, error = %err, "opening resize session failed");
                    return None;
                }
            }
        }
        let open = self.sessions.get_mut(&slot)?;
        let scaled = if self.backend.supports_palettized() {
            open.session
                .resize_palettized(PALETTE_COLORS, max_width, max_height)
        } else {
            open.session.resize(max_width, max_height)
        };
        match scaled {
            Ok(scaled) if scaled.is_empty() => None,
            Ok(scaled) => Some(SixelImage::encode(&scaled)),
            Err(err) => {
                warn!(slot, error = %err, "resize failed");
                self.sessions.remove(&slot);
                None
            }
        }
    }

    /// Drop the session (and any native handle) held for one slot.
    pub fn release(&mut self, slot: SlotId) {
        self.sessions.remove(&slot);
    }

    /// Release every outstanding session. Called when the terminal
    /// geometry changes and all scaled output is stale.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResizeError;
    use crate::resize::{CpuResizer, ScaledImage, ScaledPixels};

    /// Backend whose sessions, like the native one, keep no reference to
    /// the source bitmap after `open`; the session only remembers the
    /// first byte it saw.
    struct SnapshotResizer;

    struct SnapshotSession {
        shade: u8,
    }

    impl ResizeBackend for SnapshotResizer {
        fn name(&self) -> &'static str {
            "snapshot"
        }

        fn supports_palettized(&self) -> bool {
            false
        }

        fn open(&self, bitmap: Arc<Bitmap>) -> Result<Box<dyn ResizeSession>, ResizeError> {
            Ok(Box::new(SnapshotSession {
                shade: bitmap.data()[0],
            }))
        }
    }

    impl ResizeSession for SnapshotSession {
        fn resize(&mut self, _max_w: u32, _max_h: u32) -> Result<ScaledImage, ResizeError> {
            Ok(ScaledImage {
                width: 1,
                height: 1,
                pixels: ScaledPixels::Indexed {
                    indices: vec![0],
                    palette: vec![[self.shade, 0, 0, 255]],
                },
            })
        }

        fn resize_palettized(
            &mut self,
            _colors: u32,
            max_w: u32,
            max_h: u32,
        ) -> Result<ScaledImage, ResizeError> {
            self.resize(max_w, max_h)
        }
    }

    fn solid(width: u32, height: u32) -> Arc<Bitmap> {
        Arc::new(Bitmap::from_rgba(
            [40u8, 80, 120, 255].repeat((width * height) as usize),
            width,
            height,
        ))
    }

    #[test]
    fn test_process_produces_fit_encoding() {
        let mut processor = ImageProcessor::new(Box::new(CpuResizer));
        let image = processor.process(1, &solid(800, 600), 320, 180).unwrap();
        assert_eq!(image.bounds(), (240, 180));
    }

    #[test]
    fn test_zero_target_yields_no_image() {
        let mut processor = ImageProcessor::new(Box::new(CpuResizer));
        assert!(processor.process(1, &solid(10, 10), 0, 0).is_none());
    }

    #[test]
    fn test_session_reused_for_same_bitmap() {
        let mut processor = ImageProcessor::new(Box::new(CpuResizer));
        let bitmap = solid(100, 100);
        processor.process(7, &bitmap, 50, 50).unwrap();
        assert_eq!(processor.sessions.len(), 1);
        processor.process(7, &bitmap, 80, 80).unwrap();
        assert_eq!(processor.sessions.len(), 1);
    }

    #[test]
    fn test_new_bitmap_replaces_session() {
        let mut processor = ImageProcessor::new(Box::new(CpuResizer));
        processor.process(7, &solid(100, 100), 50, 50).unwrap();
        processor.process(7, &solid(60, 60), 50, 50).unwrap();
        assert_eq!(processor.sessions.len(), 1);
    }

    #[test]
    fn test_replaced_bitmap_never_reuses_stale_session() {
        let mut processor = ImageProcessor::new(Box::new(SnapshotResizer));
        let first = Arc::new(Bitmap::from_rgba(vec![10, 0, 0, 255], 1, 1));
        let image_a = processor.process(1, &first, 8, 8).unwrap();

        // Drop the bitmap and allocate an identically sized one right
        // after, so the allocator is likely to hand back the same address.
        drop(first);
        let second = Arc::new(Bitmap::from_rgba(vec![200, 0, 0, 255], 1, 1));
        let image_b = processor.process(1, &second, 8, 8).unwrap();

        assert_ne!(image_a, image_b, "session from the dead bitmap served");
    }

    #[test]
    fn test_backend_name_reports_choice() {
        let processor = ImageProcessor::new(Box::new(CpuResizer));
        assert_eq!(processor.backend_name(), "cpu");
    }

    #[test]
    fn test_clear_drops_all_sessions() {
        let mut processor = ImageProcessor::new(Box::new(CpuResizer));
        processor.process(1, &solid(10, 10), 5, 5).unwrap();
        processor.process(2, &solid(10, 10), 5, 5).unwrap();
        processor.clear();
        assert!(processor.sessions.is_empty());
    }
}
