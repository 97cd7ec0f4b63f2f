use serde::Serialize;
use std::ops::Range;

/// Documents with more pages than this switch to on-demand rendering.
pub const LARGE_DOCUMENT_THRESHOLD: u32 = 50;
pub const INITIAL_PAGES: u32 = 3;
pub const RENDER_BATCH_SIZE: usize = 3;
/// Absolute page bound of the automatic prefetch for large documents.
pub const PREFETCH_LIMIT: u32 = 10;
pub const OCR_BATCH_SIZE: usize = 4;
pub const LARGE_DOCUMENT_SCALE: f32 = 1.2;
pub const SMALL_DOCUMENT_SCALE: f32 = 1.5;

/// Per-document render policy, derived once from the page count.
///
/// Page indices are zero-based throughout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderConfig {
    pub page_count: u32,
    pub large: bool,
    pub scale: f32,
}

impl RenderConfig {
    pub fn for_page_count(page_count: u32) -> Self {
        let large = page_count > LARGE_DOCUMENT_THRESHOLD;
        let scale = if large { LARGE_DOCUMENT_SCALE } else { SMALL_DOCUMENT_SCALE };
        Self { page_count, large, scale }
    }

    /// Pages rendered synchronously while opening.
    pub fn initial_pages(&self) -> Range<u32> {
        0..self.page_count.min(INITIAL_PAGES)
    }

    /// Pages the background stream renders after the initial ones.
    pub fn background_pages(&self) -> Range<u32> {
        self.initial_pages().end..self.automatic_end()
    }

    /// Whether a page is only rendered when scrolled to or jumped to.
    pub fn is_on_demand(&self, page_index: u32) -> bool {
        page_index >= self.automatic_end() && page_index < self.page_count
    }

    fn automatic_end(&self) -> u32 {
        if self.large {
            self.page_count.min(PREFETCH_LIMIT)
        } else {
            self.page_count
        }
    }
}

/// Splits a page range into consecutive, ascending batches.
pub fn plan_batches(pages: Range<u32>, batch_size: usize) -> Vec<Vec<u32>> {
    let pages: Vec<u32> = pages.collect();
    pages.chunks(batch_size.max(1)).map(<[u32]>::to_vec).collect()
}
