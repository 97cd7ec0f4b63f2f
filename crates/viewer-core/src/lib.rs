//! Pure viewer logic: render policy, page geometry and view state.
//!
//! Nothing in this crate touches a document or a thread; every decision the
//! preview session makes about which pages to render and which page is
//! current is a plain function here.

mod layout;
mod render_config;
mod view_state;

pub use layout::{
    most_visible_page, vertical_overlap, visible_pages, PageLayout, Rect, ScrollTracker,
    ScrollUpdate,
};
pub use render_config::{
    plan_batches, RenderConfig, INITIAL_PAGES, LARGE_DOCUMENT_SCALE, LARGE_DOCUMENT_THRESHOLD,
    OCR_BATCH_SIZE, PREFETCH_LIMIT, RENDER_BATCH_SIZE, SMALL_DOCUMENT_SCALE,
};
pub use view_state::{parse_page_input, ViewState, DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM, ZOOM_STEP};
