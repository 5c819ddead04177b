//! Deduplicated, cached, concurrent image acquisition.
//!
//! A fixed pool of worker threads drains a job queue of URLs; each worker
//! performs the HTTP GET, decodes the body, and publishes the bitmap into
//! the shared cache. Requests arriving while a fetch is in flight are
//! coalesced onto the pending entry instead of issuing duplicate network
//! I/O. Workers never touch rendering state: completion is reported as
//! `FetchEvent`s over a channel that the render loop drains.
//!
//! A failed fetch removes the cache entry, so the next request for the same
//! URL retries instead of silently receiving no image forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::bitmap::Bitmap;
use crate::error::FetchError;

/// Opaque identifier a consumer attaches to a request so it can route the
/// completion event back to the right visual slot.
pub type SlotId = u64;

/// Completion notice for one `request` call. `bitmap` is `None` when the
/// fetch or decode failed; the slot simply renders without an image.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub tag: SlotId,
    pub url: String,
    pub bitmap: Option<Arc<Bitmap>>,
}

/// The blocking fetch-and-decode step, separated out so tests can stand in
/// for the network.
pub trait Loader: Send + Sync + 'static {
    fn load(&self, url: &str) -> Result<Bitmap, FetchError>;
}

/// Production loader: HTTP GET plus decode against the supported formats
/// (PNG, JPEG, GIF, WEBP).
pub struct HttpLoader {
    client: reqwest::blocking::Client,
}

impl HttpLoader {
    pub fn new() -> Self {
        HttpLoader {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader for HttpLoader {
    fn load(&self, url: &str) -> Result<Bitmap, FetchError> {
        let body = self.client.get(url).send()?.error_for_status()?.bytes()?;
        let decoded = image::load_from_memory(&body)?;
        Ok(Bitmap::from_decoded(decoded))
    }
}

enum CacheEntry {
    /// Fetch dispatched; tags of every caller waiting on it.
    Pending(Vec<SlotId>),
    Ready(Arc<Bitmap>),
}

type Cache = Arc<Mutex<HashMap<String, CacheEntry>>>;

/// Deduplicating image fetcher. `request` never blocks the caller.
pub struct Fetcher {
    cache: Cache,
    jobs: Sender<String>,
    events: Sender<FetchEvent>,
}

impl Fetcher {
    /// Spawn a worker pool sized to host parallelism.
    pub fn new(loader: Arc<dyn Loader>, events: Sender<FetchEvent>) -> Self {
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        Self::with_workers(loader, events, workers)
    }

    pub fn with_workers(
        loader: Arc<dyn Loader>,
        events: Sender<FetchEvent>,
        workers: usize,
    ) -> Self {
        let cache: Cache = Arc::new(Mutex::new(HashMap::new()));
        let (jobs, job_rx) = unbounded::<String>();
        for _ in 0..workers.max(1) {
            let loader = Arc::clone(&loader);
            let cache = Arc::clone(&cache);
            let events = events.clone();
            let job_rx: Receiver<String> = job_rx.clone();
            thread::spawn(move || {
                for url in job_rx.iter() {
                    fetch_one(&*loader, &cache, &events, &url);
                }
            });
        }
        Fetcher {
            cache,
            jobs,
            events,
        }
    }

    /// Request the image behind `url` for the slot identified by `tag`.
    ///
    /// A cached bitmap produces an immediate event from the calling thread;
    /// a pending fetch coalesces the request; otherwise a fetch job is
    /// enqueued. Exactly one `FetchEvent` per call is eventually delivered.
    pub fn request(&self, url: &str, tag: SlotId) {
        let hit = {
            let mut cache = self.cache.lock().unwrap();
            match cache.get_mut(url) {
                Some(CacheEntry::Ready(bitmap)) => Some(Arc::clone(bitmap)),
                Some(CacheEntry::Pending(waiters)) => {
                    waiters.push(tag);
                    return;
                }
                None => {
                    cache.insert(url.to_string(), CacheEntry::Pending(vec![tag]));
                    None
                }
            }
        };
        match hit {
            Some(bitmap) => {
                let _ = self.events.send(FetchEvent {
                    tag,
                    url: url.to_string(),
                    bitmap: Some(bitmap),
                });
            }
            None => {
                let _ = self.jobs.send(url.to_string());
            }
        }
    }
}

fn fetch_one(loader: &dyn Loader, cache: &Cache, events: &Sender<FetchEvent>, url: &str) {
    let result = loader.load(url);
    let (bitmap, waiters) = {
        let mut cache = cache.lock().unwrap();
        match result {
            Ok(decoded) => {
                let bitmap = Arc::new(decoded);
                let waiters = match cache.insert(url.to_string(), CacheEntry::Ready(Arc::clone(&bitmap))) {
                    Some(CacheEntry::Pending(waiters)) => waiters,
                    _ => Vec::new(),
                };
                (Some(bitmap), waiters)
            }
            Err(err) => {
                warn!(url, error = %err, "image fetch failed");
                // Drop the entry entirely so a later request retries.
                let waiters = match cache.remove(url) {
                    Some(CacheEntry::Pending(waiters)) => waiters,
                    _ => Vec::new(),
                };
                (None, waiters)
            }
        }
    };
    debug!(url, waiters = waiters.len(), ok = bitmap.is_some(), "fetch resolved");
    for tag in waiters {
        let _ = events.send(FetchEvent {
            tag,
            url: url.to_string(),
            bitmap: bitmap.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Loader that blocks on a gate and counts how many loads it ran.
    struct GatedLoader {
        gate: Receiver<()>,
        loads: AtomicUsize,
        fail: bool,
    }

    impl GatedLoader {
        fn pair(fail: bool) -> (Arc<Self>, Sender<()>) {
            let (tx, rx) = unbounded();
            (
                Arc::new(GatedLoader {
                    gate: rx,
                    loads: AtomicUsize::new(0),
                    fail,
                }),
                tx,
            )
        }
    }

    impl Loader for GatedLoader {
        fn load(&self, _url: &str) -> Result<Bitmap, FetchError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.recv_timeout(Duration::from_secs(5));
            if self.fail {
                Err(FetchError::Decode(image::ImageError::Unsupported(
                    image::error::UnsupportedError::from_format_and_kind(
                        image::error::ImageFormatHint::Unknown,
                        image::error::UnsupportedErrorKind::GenericFeature(
                            "test failure".to_string(),
                        ),
                    ),
                )))
            } else {
                Ok(Bitmap::from_rgba(vec![0; 4], 1, 1))
            }
        }
    }

    #[test]
    fn test_concurrent_requests_coalesce_to_one_load() {
        let (loader, gate) = GatedLoader::pair(false);
        let (event_tx, event_rx) = unbounded();
        let fetcher = Fetcher::with_workers(loader.clone(), event_tx, 2);

        for tag in 0..3 {
            fetcher.request("http://example.com/a.png", tag);
        }
        gate.send(()).unwrap();

        for _ in 0..3 {
            let event = event_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(event.bitmap.is_some());
            assert_eq!(event.url, "http://example.com/a.png");
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_entry_answers_immediately() {
        let (loader, gate) = GatedLoader::pair(false);
        let (event_tx, event_rx) = unbounded();
        let fetcher = Fetcher::with_workers(loader.clone(), event_tx, 1);

        fetcher.request("http://example.com/b.png", 1);
        gate.send(()).unwrap();
        let first = event_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.bitmap.is_some());

        // Second request hits the cache; no new load, event arrives without
        // opening the gate again.
        fetcher.request("http://example.com/b.png", 2);
        let second = event_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(second.tag, 2);
        assert!(second.bitmap.is_some());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_fetch_removes_entry_and_retries() {
        let (loader, gate) = GatedLoader::pair(true);
        let (event_tx, event_rx) = unbounded();
        let fetcher = Fetcher::with_workers(loader.clone(), event_tx, 1);

        fetcher.request("http://example.com/c.png", 1);
        gate.send(()).unwrap();
        let event = event_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(event.bitmap.is_none());

        // Entry was removed: the same URL fetches again.
        fetcher.request("http://example.com/c.png", 2);
        gate.send(()).unwrap();
        let event = event_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.tag, 2);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }
}
