//! Preview session
//!
//! One session owns everything derived from a loaded document: the handle,
//! the raster, text and layer caches, and the background streams feeding
//! them. Loading another file builds a new session under a new generation;
//! the old session's streams notice at their next batch boundary and stop,
//! and whatever they still write lands in caches nobody reads any more.
//!
//! Rendering is progressive:
//!
//! 1. The first `min(3, N)` pages render synchronously inside [`PreviewSession::open`].
//! 2. A background stream renders the remaining automatic pages in batches
//!    of three, ascending (all pages for small documents, up to page ten for
//!    large ones).
//! 3. Pages of large documents past the prefetch window render on demand,
//!    one thread per page, when they scroll into view or are jumped to.

use crate::error::PreviewError;
use crate::events::{EventSink, SessionEvent};
use crate::ocr::{OcrPipeline, Recognizer, TextCache};
use crate::raster::{PageRaster, RasterCache};
use crate::renderer::PageRenderer;
use crate::text_layer::{build_text_layer, LayerTransform, PlacedTextLayer, TextLayerCache};
use docpeek_scheduler::{spawn_stream, BatchReport, BatchRunner, GenerationToken, WorkerPanicked};
use pdf_engine::{DocumentHandle, OpenSource, PdfEngine};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use viewer_core::{plan_batches, RenderConfig, RENDER_BATCH_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Loading,
    Ready,
    Paginating,
    Extracting,
}

/// Snapshot of a session for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub generation: u64,
    pub page_count: u32,
    pub large: bool,
    pub scale: f32,
    pub scanned: bool,
    pub phase: SessionPhase,
    pub rendered_pages: Vec<u32>,
    pub failed_pages: BTreeMap<u32, String>,
    pub extracted_pages: usize,
}

type RenderOutcome = Result<Result<PageRaster, PreviewError>, WorkerPanicked>;

struct SessionInner {
    document: DocumentHandle,
    config: RenderConfig,
    renderer: PageRenderer,
    rasters: RasterCache,
    texts: TextCache,
    layers: TextLayerCache,
    in_flight: Mutex<HashSet<u32>>,
    scanned: bool,
    events: EventSink,
    paginating: AtomicBool,
    extracting: AtomicBool,
    streams: Mutex<Vec<JoinHandle<()>>>,
    runner: BatchRunner,
}

/// Handle to a preview session; clones share the same session.
#[derive(Clone)]
pub struct PreviewSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for PreviewSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewSession")
            .field("generation", &self.generation())
            .field("config", &self.inner.config)
            .field("scanned", &self.inner.scanned)
            .field("rendered", &self.inner.rasters.filled_count())
            .finish()
    }
}

impl PreviewSession {
    /// Parses the document and renders its first pages before returning.
    ///
    /// # Errors
    /// `PreviewError::Load` when the document cannot be opened. Failures of
    /// individual initial pages are recorded, not returned.
    pub fn open(
        engine: &dyn PdfEngine,
        source: OpenSource,
        events: EventSink,
    ) -> Result<Self, PreviewError> {
        events.emit(SessionEvent::PhaseChanged {
            generation: events.generation(),
            phase: SessionPhase::Loading,
        });

        let document = engine.open(source).map_err(PreviewError::from_load)?;
        let page_count = document.page_count();
        let config = RenderConfig::for_page_count(page_count);
        log::info!(
            "opened document: {page_count} pages, large={}, scale={}",
            config.large,
            config.scale
        );

        let scanned = detect_scanned(&document, &config);
        let session = Self {
            inner: Arc::new(SessionInner {
                renderer: PageRenderer::new(Arc::clone(&document), config.scale),
                document,
                config,
                rasters: RasterCache::new(page_count),
                texts: TextCache::new(page_count),
                layers: TextLayerCache::new(page_count),
                in_flight: Mutex::new(HashSet::new()),
                scanned,
                events,
                paginating: AtomicBool::new(false),
                extracting: AtomicBool::new(false),
                streams: Mutex::new(Vec::new()),
                runner: BatchRunner::new("render"),
            }),
        };

        session.render_batches(plan_batches(config.initial_pages(), RENDER_BATCH_SIZE));
        session.emit_phase();
        Ok(session)
    }

    pub fn generation(&self) -> u64 {
        self.inner.events.generation()
    }

    pub fn token(&self) -> &GenerationToken {
        self.inner.events.token()
    }

    pub fn page_count(&self) -> u32 {
        self.inner.config.page_count
    }

    pub fn render_config(&self) -> RenderConfig {
        self.inner.config
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.inner.document
    }

    /// No embedded text on any of the first pages.
    pub fn is_scanned(&self) -> bool {
        self.inner.scanned
    }

    pub fn rasters(&self) -> &RasterCache {
        &self.inner.rasters
    }

    pub fn raster(&self, page_index: u32) -> Option<Arc<PageRaster>> {
        self.inner.rasters.get(page_index)
    }

    pub fn texts(&self) -> &TextCache {
        &self.inner.texts
    }

    pub fn phase(&self) -> SessionPhase {
        if self.inner.extracting.load(Ordering::Acquire) {
            SessionPhase::Extracting
        } else if self.inner.paginating.load(Ordering::Acquire) {
            SessionPhase::Paginating
        } else {
            SessionPhase::Ready
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            generation: self.generation(),
            page_count: self.page_count(),
            large: self.inner.config.large,
            scale: self.inner.config.scale,
            scanned: self.inner.scanned,
            phase: self.phase(),
            rendered_pages: self.inner.rasters.filled_pages(),
            failed_pages: self.inner.rasters.failures(),
            extracted_pages: self.inner.texts.filled_count(),
        }
    }

    /// Page sizes in base raster pixels, from the viewport record when the
    /// page is rendered and from the page geometry otherwise.
    pub fn page_sizes_px(&self) -> Vec<(f32, f32)> {
        let scale = self.inner.config.scale;
        (0..self.page_count())
            .map(|page| match self.inner.rasters.viewport(page) {
                Some(viewport) => (viewport.width as f32, viewport.height as f32),
                None => {
                    let size = self.inner.document.page_size(page).unwrap_or_default();
                    (size.width_pt * scale, size.height_pt * scale)
                }
            })
            .collect()
    }

    /// Starts the background stream for the remaining automatic pages.
    ///
    /// Returns `false` when there is nothing left to prefetch or the stream
    /// is already running.
    pub fn start_background(&self) -> Result<bool, PreviewError> {
        let pages = self.inner.config.background_pages();
        if pages.is_empty() || self.inner.paginating.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.emit_phase();

        let session = self.clone();
        let batches = plan_batches(pages, RENDER_BATCH_SIZE);
        let handle = spawn_stream(format!("docpeek-prefetch-{}", self.generation()), move || {
            let outcome = session.render_batches(batches);
            if outcome.superseded {
                log::info!("prefetch for generation {} superseded", session.generation());
            }
            session.inner.paginating.store(false, Ordering::Release);
            session.emit_phase();
        });

        match handle {
            Ok(handle) => {
                self.track(handle);
                Ok(true)
            }
            Err(err) => {
                self.inner.paginating.store(false, Ordering::Release);
                Err(PreviewError::PageRender {
                    page: self.inner.config.initial_pages().end,
                    reason: format!("failed to start prefetch: {err}"),
                })
            }
        }
    }

    /// Schedules on-demand renders for visible pages of a large document.
    ///
    /// Pages inside the automatic window, already rendered, already in
    /// flight, or previously failed are skipped. Returns the pages that were
    /// scheduled.
    pub fn request_visible(&self, pages: &[u32]) -> Vec<u32> {
        let config = self.inner.config;
        if !config.large {
            return Vec::new();
        }

        let mut scheduled = Vec::new();
        for &page in pages {
            if !config.is_on_demand(page)
                || self.inner.rasters.is_filled(page)
                || self.inner.rasters.failure(page).is_some()
                || !self.mark_in_flight(page)
            {
                continue;
            }

            let session = self.clone();
            let spawned = spawn_stream(format!("docpeek-page-{}", page + 1), move || {
                let outcome = session.inner.renderer.render(page);
                session.publish_one(page, outcome);
                session.clear_in_flight(page);
            });
            match spawned {
                Ok(handle) => {
                    self.track(handle);
                    scheduled.push(page);
                }
                Err(err) => {
                    log::error!("failed to start render for page {}: {err}", page + 1);
                    self.clear_in_flight(page);
                }
            }
        }

        if !scheduled.is_empty() {
            log::debug!("on-demand render scheduled for {scheduled:?}");
        }
        scheduled
    }

    /// Renders `page_index` synchronously unless it is already cached.
    ///
    /// A page that failed before is retried: a jump is an explicit request.
    pub fn jump_to(&self, page_index: u32) -> Result<Arc<PageRaster>, PreviewError> {
        self.ensure_rendered(page_index)
    }

    /// Returns the cached raster, rendering and caching it first if needed.
    pub fn ensure_rendered(&self, page_index: u32) -> Result<Arc<PageRaster>, PreviewError> {
        if let Some(raster) = self.inner.rasters.get(page_index) {
            return Ok(raster);
        }
        let outcome = self.inner.renderer.render(page_index);
        self.publish_one(page_index, outcome);

        self.inner.rasters.get(page_index).ok_or_else(|| PreviewError::PageRender {
            page: page_index,
            reason: self
                .inner
                .rasters
                .failure(page_index)
                .unwrap_or_else(|| "page is outside the document".to_owned()),
        })
    }

    /// Text layers for the requested pages at the given zoom.
    ///
    /// Pages without a raster yet, or whose layer cannot be built, map to
    /// `None`. Geometry is built once per page; only the transform depends
    /// on `zoom_percent`.
    pub fn text_layers(
        &self,
        pages: &[u32],
        zoom_percent: u16,
    ) -> Vec<(u32, Option<PlacedTextLayer>)> {
        let transform = LayerTransform::for_zoom_percent(zoom_percent);
        let document = self.inner.document.as_ref();
        let scale = self.inner.config.scale;

        pages
            .iter()
            .map(|&page| {
                let placed = self.inner.rasters.viewport(page).and_then(|viewport| {
                    self.inner
                        .layers
                        .get_or_build(page, || build_text_layer(document, page, scale, viewport))
                        .map(|layer| PlacedTextLayer { layer, transform })
                });
                (page, placed)
            })
            .collect()
    }

    /// Embedded text of one page, runs joined by spaces.
    pub fn embedded_text(&self, page_index: u32) -> Result<String, PreviewError> {
        let spans = self
            .inner
            .document
            .text_spans(page_index)
            .map_err(|err| PreviewError::Extraction(err.to_string()))?;
        Ok(spans
            .iter()
            .map(|span| span.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Starts OCR over every page on a background stream.
    ///
    /// Returns `Ok(false)` when extraction is already running or complete.
    ///
    /// # Errors
    /// `PreviewError::Extraction` when no recognizer is available or the
    /// first page raster cannot be obtained within `start_timeout`.
    pub fn start_extraction(
        &self,
        recognizer: Arc<dyn Recognizer>,
        start_timeout: Duration,
    ) -> Result<bool, PreviewError> {
        if self.inner.texts.is_complete() || self.inner.extracting.load(Ordering::Acquire) {
            return Ok(false);
        }
        if !recognizer.is_available() {
            return Err(self.extraction_failed(format!(
                "text recognizer '{}' is not available",
                recognizer.name()
            )));
        }
        if self.page_count() > 0 && self.first_raster(start_timeout).is_none() {
            return Err(self.extraction_failed("first page could not be rendered".to_owned()));
        }
        if self.inner.extracting.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.emit_phase();

        let session = self.clone();
        let handle = spawn_stream(format!("docpeek-ocr-{}", self.generation()), move || {
            let pipeline = OcrPipeline::new(recognizer);
            let generation = session.generation();
            let outcome = pipeline.extract_pages(
                session.page_count(),
                &session.inner.texts,
                session.token(),
                |page| session.raster_for_ocr(page).map_err(|err| err.to_string()),
                |pages| {
                    session.inner.events.emit(SessionEvent::TextBatchExtracted {
                        generation,
                        pages: pages.to_vec(),
                    });
                },
            );
            session.inner.extracting.store(false, Ordering::Release);
            if !outcome.superseded {
                log::info!("text extraction finished: {} batches", outcome.completed_batches);
                session.inner.events.emit(SessionEvent::ExtractionFinished {
                    generation,
                    pages: session.inner.texts.filled_count() as u32,
                });
            }
            session.emit_phase();
        });

        match handle {
            Ok(handle) => {
                self.track(handle);
                Ok(true)
            }
            Err(err) => {
                self.inner.extracting.store(false, Ordering::Release);
                Err(self.extraction_failed(format!("failed to start OCR: {err}")))
            }
        }
    }

    /// Joins every background stream started so far, including streams
    /// started while waiting.
    pub fn wait_for_background(&self) {
        loop {
            let handles = match self.inner.streams.lock() {
                Ok(mut streams) => std::mem::take(&mut *streams),
                Err(_) => return,
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if handle.join().is_err() {
                    log::error!("background stream panicked");
                }
            }
        }
    }

    /// Raster to recognize. Uncached on-demand pages of a large document are
    /// rendered without entering the cache; they stay unrendered until
    /// scrolled to or jumped to.
    fn raster_for_ocr(&self, page_index: u32) -> Result<Arc<PageRaster>, PreviewError> {
        if let Some(raster) = self.inner.rasters.get(page_index) {
            return Ok(raster);
        }
        if self.inner.config.is_on_demand(page_index) {
            return self.inner.renderer.render(page_index).map(Arc::new);
        }
        self.ensure_rendered(page_index)
    }

    fn first_raster(&self, timeout: Duration) -> Option<Arc<PageRaster>> {
        self.inner
            .rasters
            .wait_for(0, timeout)
            .or_else(|| self.ensure_rendered(0).ok())
    }

    fn extraction_failed(&self, reason: String) -> PreviewError {
        log::error!("text extraction could not start: {reason}");
        self.inner.events.emit(SessionEvent::ExtractionFailed {
            generation: self.generation(),
            reason: reason.clone(),
        });
        PreviewError::Extraction(reason)
    }

    fn render_batches(&self, batches: Vec<Vec<u32>>) -> docpeek_scheduler::BatchOutcome {
        let renderer = &self.inner.renderer;
        self.inner.runner.run(
            batches,
            self.token(),
            |page| renderer.render(page),
            |report| self.publish_batch(report),
        )
    }

    fn publish_batch(&self, report: BatchReport<u32, Result<PageRaster, PreviewError>>) {
        let mut stored = Vec::new();
        for (page, outcome) in report.results {
            if self.store(page, outcome) {
                stored.push(page);
            }
        }
        if !stored.is_empty() {
            self.inner.events.emit(SessionEvent::PagesRendered {
                generation: self.generation(),
                pages: stored,
            });
        }
    }

    fn publish_one(&self, page: u32, outcome: Result<PageRaster, PreviewError>) {
        if self.token().is_stale() {
            log::warn!("dropping render of page {} from superseded generation", page + 1);
            return;
        }
        if self.store(page, Ok(outcome)) {
            self.inner.events.emit(SessionEvent::PagesRendered {
                generation: self.generation(),
                pages: vec![page],
            });
        }
    }

    /// Writes one render outcome into the cache. Returns `true` when a new
    /// raster was stored.
    fn store(&self, page: u32, outcome: RenderOutcome) -> bool {
        let reason = match outcome {
            Ok(Ok(raster)) => return self.inner.rasters.insert(raster),
            Ok(Err(err)) => err.to_string(),
            Err(panic) => panic.to_string(),
        };

        log::warn!("page {} failed to render: {reason}", page + 1);
        self.inner.rasters.record_failure(page, reason.clone());
        self.inner.events.emit(SessionEvent::PageRenderFailed {
            generation: self.generation(),
            page,
            reason,
        });
        false
    }

    fn mark_in_flight(&self, page: u32) -> bool {
        self.inner.in_flight.lock().map(|mut set| set.insert(page)).unwrap_or(false)
    }

    fn clear_in_flight(&self, page: u32) {
        if let Ok(mut set) = self.inner.in_flight.lock() {
            set.remove(&page);
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut streams) = self.inner.streams.lock() {
            streams.push(handle);
        }
    }

    fn emit_phase(&self) {
        self.inner.events.emit(SessionEvent::PhaseChanged {
            generation: self.generation(),
            phase: self.phase(),
        });
    }
}

fn detect_scanned(document: &DocumentHandle, config: &RenderConfig) -> bool {
    config
        .initial_pages()
        .all(|page| !document.has_text(page).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use pdf_engine::testing::{pdf_with_pages, scanned_pdf, text_pdf};
    use pdf_engine::LopdfEngine;

    fn open(bytes: Vec<u8>) -> (PreviewSession, EventLog) {
        let log = EventLog::new();
        let sink = EventSink::new(Some(log.callback()), GenerationToken::detached());
        let session = PreviewSession::open(&LopdfEngine::new(), bytes.into(), sink).unwrap();
        (session, log)
    }

    #[test]
    fn test_open_renders_initial_pages_only() {
        let (session, log) = open(text_pdf(12));

        assert_eq!(session.rasters().filled_pages(), vec![0, 1, 2]);
        assert_eq!(log.rendered_pages(), vec![0, 1, 2]);
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[test]
    fn test_open_short_document() {
        let (session, _) = open(text_pdf(2));

        assert_eq!(session.rasters().filled_count(), 2);
        assert!(!session.start_background().unwrap());
    }

    #[test]
    fn test_open_corrupt_document_fails() {
        let sink = EventSink::new(None, GenerationToken::detached());
        let err = PreviewSession::open(&LopdfEngine::new(), b"not a pdf".to_vec().into(), sink)
            .unwrap_err();

        assert!(matches!(err, PreviewError::Load { .. }));
    }

    #[test]
    fn test_scanned_detection() {
        assert!(open(scanned_pdf(3)).0.is_scanned());
        assert!(!open(text_pdf(3)).0.is_scanned());
        // Text on any of the first three pages is enough.
        assert!(!open(pdf_with_pages(&[None, None, Some("late text"), None])).0.is_scanned());
    }

    #[test]
    fn test_background_fills_small_document() {
        let (session, log) = open(text_pdf(10));

        assert!(session.start_background().unwrap());
        session.wait_for_background();

        assert_eq!(session.rasters().filled_count(), 10);
        assert_eq!(log.rendered_pages(), (0..10).collect::<Vec<_>>());
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[test]
    fn test_request_visible_ignored_for_small_documents() {
        let (session, _) = open(text_pdf(5));
        assert!(session.request_visible(&[3, 4]).is_empty());
    }

    #[test]
    fn test_ensure_rendered_is_idempotent() {
        let (session, log) = open(text_pdf(6));

        let first = session.ensure_rendered(4).unwrap();
        let second = session.ensure_rendered(4).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(log.rendered_pages(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn test_jump_out_of_range_is_page_error() {
        let (session, _) = open(text_pdf(2));

        let err = session.jump_to(7).unwrap_err();

        assert!(matches!(err, PreviewError::PageRender { page: 7, .. }));
    }

    #[test]
    fn test_text_layers_only_for_rendered_pages() {
        let (session, _) = open(text_pdf(6));

        let layers = session.text_layers(&[1, 5], 150);

        let (page, placed) = &layers[0];
        assert_eq!(*page, 1);
        let placed = placed.as_ref().unwrap();
        assert_eq!(placed.layer.text(), "Page 2");
        assert_eq!(placed.transform.css(), "translate(-50%, -50%) scale(1.5)");
        assert!(layers[1].1.is_none());
    }

    #[test]
    fn test_zoom_change_reuses_geometry() {
        let (session, _) = open(text_pdf(3));

        let at_100 = session.text_layers(&[0], 100).remove(0).1.unwrap();
        let at_200 = session.text_layers(&[0], 200).remove(0).1.unwrap();

        assert!(Arc::ptr_eq(&at_100.layer, &at_200.layer));
        assert_eq!(at_200.screen_bounds()[0].width, at_100.screen_bounds()[0].width * 2.0);
    }

    #[test]
    fn test_embedded_text() {
        let (session, _) = open(text_pdf(2));
        assert_eq!(session.embedded_text(1).unwrap(), "Page 2");
    }

    #[test]
    fn test_page_sizes_use_scale() {
        let (session, _) = open(text_pdf(4));

        let sizes = session.page_sizes_px();

        assert_eq!(sizes.len(), 4);
        assert_eq!(sizes[0], (918.0, 1188.0));
        assert_eq!(sizes[3], (918.0, 1188.0));
    }
}
