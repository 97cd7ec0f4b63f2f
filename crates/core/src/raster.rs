//! Page raster cache
//!
//! One write-once slot per page. A slot is filled by whichever render
//! finishes first; later writes for the same page are discarded. Slots are
//! never invalidated while the session lives, so readers can hold on to the
//! returned `Arc` freely.

use pdf_engine::RgbaImage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Pixel size of a page's base raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewportRecord {
    pub width: u32,
    pub height: u32,
}

/// A rendered page together with its viewport record.
#[derive(Debug, Clone)]
pub struct PageRaster {
    pub page_index: u32,
    pub image: RgbaImage,
    pub viewport: ViewportRecord,
}

impl PageRaster {
    pub fn new(page_index: u32, image: RgbaImage) -> Self {
        let viewport = ViewportRecord { width: image.width(), height: image.height() };
        Self { page_index, image, viewport }
    }
}

#[derive(Debug)]
pub struct RasterCache {
    slots: Vec<OnceLock<Arc<PageRaster>>>,
    failures: Mutex<BTreeMap<u32, String>>,
    signal: Mutex<()>,
    filled: Condvar,
}

impl RasterCache {
    pub fn new(page_count: u32) -> Self {
        Self {
            slots: (0..page_count).map(|_| OnceLock::new()).collect(),
            failures: Mutex::new(BTreeMap::new()),
            signal: Mutex::new(()),
            filled: Condvar::new(),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Stores a raster. Returns `false` when the slot was already filled, in
    /// which case the new raster is dropped.
    pub fn insert(&self, raster: PageRaster) -> bool {
        let page = raster.page_index;
        let Some(slot) = self.slots.get(page as usize) else {
            log::warn!("raster for page {page} is outside the document, ignoring");
            return false;
        };

        let stored = slot.set(Arc::new(raster)).is_ok();
        if stored {
            if let Ok(mut failures) = self.failures.lock() {
                failures.remove(&page);
            }
            let _guard = self.signal.lock();
            self.filled.notify_all();
        } else {
            log::debug!("page {page} already rendered, discarding duplicate");
        }
        stored
    }

    pub fn get(&self, page: u32) -> Option<Arc<PageRaster>> {
        self.slots.get(page as usize)?.get().cloned()
    }

    pub fn is_filled(&self, page: u32) -> bool {
        self.slots.get(page as usize).is_some_and(|slot| slot.get().is_some())
    }

    /// The viewport record exists iff the slot is filled.
    pub fn viewport(&self, page: u32) -> Option<ViewportRecord> {
        self.slots.get(page as usize)?.get().map(|raster| raster.viewport)
    }

    pub fn record_failure(&self, page: u32, reason: impl Into<String>) {
        if self.is_filled(page) {
            return;
        }
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(page, reason.into());
        }
        let _guard = self.signal.lock();
        self.filled.notify_all();
    }

    pub fn failure(&self, page: u32) -> Option<String> {
        self.failures.lock().ok()?.get(&page).cloned()
    }

    pub fn failures(&self) -> BTreeMap<u32, String> {
        self.failures.lock().map(|failures| failures.clone()).unwrap_or_default()
    }

    pub fn filled_pages(&self) -> Vec<u32> {
        (0..self.page_count()).filter(|&page| self.is_filled(page)).collect()
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Blocks until the page is filled, its render fails, or `timeout` passes.
    pub fn wait_for(&self, page: u32, timeout: Duration) -> Option<Arc<PageRaster>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.signal.lock().ok()?;

        loop {
            if let Some(raster) = self.get(page) {
                return Some(raster);
            }
            if page >= self.page_count() || self.failure(page).is_some() {
                return None;
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            guard = self.filled.wait_timeout(guard, remaining).ok()?.0;
        }
    }
}
