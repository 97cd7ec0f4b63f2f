//! Preview controller
//!
//! Front door for one viewer: loads files, owns the view state and the
//! scroll tracker, and replaces the whole session when a new file arrives.
//! All methods run on the caller's thread; rendering and recognition happen
//! on the session's background streams.

use crate::category::{direct_text, FileCategory};
use crate::config::PreviewConfig;
use crate::convert::ServerClient;
use crate::error::{LoadFailureKind, PreviewError};
use crate::events::{EventCallback, EventSink, SessionEvent};
use crate::ocr::{OcrPipeline, PageText, Recognizer, TextCache};
use crate::session::{PreviewSession, SessionPhase};
use crate::text_layer::PlacedTextLayer;
use docpeek_scheduler::{spawn_stream, GenerationCounter, GenerationToken};
use pdf_engine::{PdfEngine, RgbaImage};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use viewer_core::{PageLayout, ScrollTracker, ScrollUpdate, ViewState};

/// Vertical gap between stacked pages, in pixels.
pub const PAGE_SPACING: f32 = 16.0;

/// What is currently shown.
#[derive(Debug, Clone)]
pub enum Preview {
    /// PDFs and converted office documents, rendered page by page.
    Document { category: FileCategory, session: PreviewSession },
    /// A single image with one text slot.
    Image { image: Arc<RgbaImage>, texts: Arc<TextCache> },
    /// Directly extracted text.
    Text { category: FileCategory, content: String },
}

/// Target of a page jump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpTarget {
    /// One-based page number.
    pub page: u32,
    /// Scroll offset that brings the page to the top of the container.
    pub scroll_offset: f32,
}

pub struct PreviewController {
    engine: Arc<dyn PdfEngine>,
    recognizer: Arc<dyn Recognizer>,
    config: PreviewConfig,
    callback: Option<EventCallback>,
    counter: GenerationCounter,
    token: Option<GenerationToken>,
    view: ViewState,
    tracker: ScrollTracker,
    layout: PageLayout,
    preview: Option<Preview>,
    file_name: Option<String>,
    streams: Vec<JoinHandle<()>>,
}

impl fmt::Debug for PreviewController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewController")
            .field("generation", &self.counter.current())
            .field("file_name", &self.file_name)
            .field("view", &self.view)
            .field("preview", &self.preview)
            .finish()
    }
}

impl PreviewController {
    pub fn new(
        engine: Arc<dyn PdfEngine>,
        recognizer: Arc<dyn Recognizer>,
        config: PreviewConfig,
    ) -> Self {
        Self {
            engine,
            recognizer,
            config,
            callback: None,
            counter: GenerationCounter::new(),
            token: None,
            view: ViewState::default(),
            tracker: ScrollTracker::new(),
            layout: PageLayout::default(),
            preview: None,
            file_name: None,
            streams: Vec::new(),
        }
    }

    /// Observer for session events. Events from superseded loads never
    /// reach it.
    pub fn with_callback(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn session(&self) -> Option<&PreviewSession> {
        match &self.preview {
            Some(Preview::Document { session, .. }) => Some(session),
            _ => None,
        }
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn category(&self) -> Option<FileCategory> {
        self.file_name.as_deref().map(|name| match &self.preview {
            Some(Preview::Document { category, .. }) | Some(Preview::Text { category, .. }) => {
                *category
            }
            Some(Preview::Image { .. }) => FileCategory::Image,
            None => FileCategory::detect(name, None),
        })
    }

    pub fn generation(&self) -> u64 {
        self.counter.current()
    }

    pub fn banner(&self) -> Option<&str> {
        self.view.error.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.view.loading {
            return SessionPhase::Loading;
        }
        match &self.preview {
            None => SessionPhase::Idle,
            Some(Preview::Document { session, .. }) => session.phase(),
            Some(_) => SessionPhase::Ready,
        }
    }

    /// Loads a file from disk, classifying it by its name.
    pub fn load_file(&mut self, path: &Path) -> Result<(), PreviewError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match std::fs::read(path) {
            Ok(bytes) => self.load_bytes(&file_name, None, bytes),
            Err(err) => {
                self.begin_load(&file_name);
                let err = PreviewError::Load {
                    reason: format!("{}: {err}", path.display()),
                    kind: LoadFailureKind::Io,
                };
                Err(self.fail_load(err))
            }
        }
    }

    /// Replaces the current preview with `bytes`.
    ///
    /// The previous session is superseded before anything else happens, so
    /// its background work can no longer publish.
    pub fn load_bytes(
        &mut self,
        file_name: &str,
        mime: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<(), PreviewError> {
        let token = self.begin_load(file_name);
        let category = FileCategory::detect(file_name, mime);
        log::info!("loading {file_name} as {category} (generation {})", token.generation());

        let result = match category {
            FileCategory::Pdf => self.open_document(category, bytes, token),
            FileCategory::Document => ServerClient::new(&self.config)
                .and_then(|client| client.convert_document(file_name, bytes))
                .and_then(|pdf| self.open_document(category, pdf, token)),
            FileCategory::Image => self.open_image(bytes, token),
            category => match direct_text(category, &String::from_utf8_lossy(&bytes)) {
                Some(content) => {
                    self.view.reset(1);
                    self.preview = Some(Preview::Text { category, content });
                    Ok(())
                }
                None => Err(PreviewError::Unsupported(category.to_string())),
            },
        };

        match result {
            Ok(()) => {
                self.view.loading = false;
                Ok(())
            }
            Err(err) => Err(self.fail_load(err)),
        }
    }

    fn begin_load(&mut self, file_name: &str) -> GenerationToken {
        let token = self.counter.advance();
        self.token = Some(token.clone());
        self.preview = None;
        self.layout = PageLayout::default();
        self.tracker = ScrollTracker::new();
        self.view.reset(0);
        self.view.loading = true;
        self.file_name = Some(file_name.to_owned());
        token
    }

    fn fail_load(&mut self, err: PreviewError) -> PreviewError {
        log::error!("load failed: {err}");
        self.view.loading = false;
        self.view.error = Some(err.banner());
        err
    }

    fn open_document(
        &mut self,
        category: FileCategory,
        bytes: Vec<u8>,
        token: GenerationToken,
    ) -> Result<(), PreviewError> {
        let sink = EventSink::new(self.callback.clone(), token);
        let session = PreviewSession::open(self.engine.as_ref(), bytes.into(), sink)?;

        self.view.reset(session.page_count());
        self.view.loading = true;
        self.rebuild_layout_for(&session);

        if let Err(err) = session.start_background() {
            log::warn!("background rendering unavailable: {err}");
        }
        if session.is_scanned() {
            log::info!("no embedded text on the first pages, starting OCR");
            let recognizer = Arc::clone(&self.recognizer);
            if let Err(err) = session.start_extraction(recognizer, self.config.ocr_start_timeout) {
                self.view.error = Some(err.banner());
            }
        }

        self.preview = Some(Preview::Document { category, session });
        Ok(())
    }

    fn open_image(&mut self, bytes: Vec<u8>, token: GenerationToken) -> Result<(), PreviewError> {
        let image = image::load_from_memory(&bytes)
            .map_err(|err| PreviewError::Load {
                reason: err.to_string(),
                kind: LoadFailureKind::InvalidImage,
            })?
            .to_rgba8();
        let image = Arc::new(image);
        let texts = Arc::new(TextCache::new(1));

        self.view.reset(1);
        self.preview =
            Some(Preview::Image { image: Arc::clone(&image), texts: Arc::clone(&texts) });

        let sink = EventSink::new(self.callback.clone(), token);
        if let Err(err) = self.start_image_extraction(image, texts, sink) {
            self.view.error = Some(err.banner());
        }
        Ok(())
    }

    fn start_image_extraction(
        &mut self,
        image: Arc<RgbaImage>,
        texts: Arc<TextCache>,
        sink: EventSink,
    ) -> Result<(), PreviewError> {
        if !self.recognizer.is_available() {
            let reason = format!("text recognizer '{}' is not available", self.recognizer.name());
            sink.emit(SessionEvent::ExtractionFailed {
                generation: sink.generation(),
                reason: reason.clone(),
            });
            return Err(PreviewError::Extraction(reason));
        }

        let pipeline = OcrPipeline::new(Arc::clone(&self.recognizer));
        let handle = spawn_stream(format!("docpeek-image-ocr-{}", sink.generation()), move || {
            pipeline.extract_image(&image, &texts);
            let generation = sink.generation();
            sink.emit(SessionEvent::TextBatchExtracted { generation, pages: vec![0] });
            sink.emit(SessionEvent::ExtractionFinished { generation, pages: 1 });
        })
        .map_err(|err| PreviewError::Extraction(err.to_string()))?;

        self.streams.push(handle);
        Ok(())
    }

    fn rebuild_layout_for(&mut self, session: &PreviewSession) {
        self.layout =
            PageLayout::stacked(&session.page_sizes_px(), PAGE_SPACING, self.view.zoom_factor());
    }

    fn rebuild_layout(&mut self) {
        if let Some(session) = self.session().cloned() {
            self.rebuild_layout_for(&session);
        }
    }

    /// Feeds a scroll position into the tracker.
    ///
    /// Updates the current page when the most visible page changes and
    /// schedules on-demand renders for visible pages of large documents.
    pub fn on_scroll(&mut self, offset: f32, viewport_height: f32) -> Option<ScrollUpdate> {
        let session = self.session()?.clone();
        let viewport = self.layout.viewport_at(offset, viewport_height);
        let update = self.tracker.on_scroll(self.layout.bounds(), viewport);

        if update.changed {
            self.view.set_current_page(update.current as u32 + 1);
        }
        let visible: Vec<u32> = update.visible.iter().map(|&page| page as u32).collect();
        session.request_visible(&visible);
        Some(update)
    }

    /// Applies page-number input. Invalid input is ignored.
    pub fn apply_page_input(&mut self, input: &str) -> Option<JumpTarget> {
        let page = self.view.apply_page_input(input)?;
        self.jump(page)
    }

    pub fn next_page(&mut self) -> Option<JumpTarget> {
        let page = self.view.next_page()?;
        self.jump(page)
    }

    pub fn previous_page(&mut self) -> Option<JumpTarget> {
        let page = self.view.previous_page()?;
        self.jump(page)
    }

    fn jump(&mut self, page: u32) -> Option<JumpTarget> {
        let index = page.checked_sub(1)?;
        self.tracker.jump_to(index as usize);

        if let Some(session) = self.session() {
            if let Err(err) = session.jump_to(index) {
                log::warn!("jump target not rendered: {err}");
            }
        }
        let scroll_offset = self.layout.scroll_offset_for(index as usize).unwrap_or(0.0);
        Some(JumpTarget { page, scroll_offset })
    }

    pub fn zoom_in(&mut self) -> u16 {
        let zoom = self.view.zoom_in();
        self.rebuild_layout();
        zoom
    }

    pub fn zoom_out(&mut self) -> u16 {
        let zoom = self.view.zoom_out();
        self.rebuild_layout();
        zoom
    }

    pub fn set_zoom(&mut self, percent: u16) -> u16 {
        let zoom = self.view.set_zoom(percent);
        self.rebuild_layout();
        zoom
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        self.view.toggle_fullscreen()
    }

    /// Shows or hides extracted text, starting OCR on first show for
    /// documents that were not extracted automatically.
    pub fn toggle_extracted_text(&mut self) -> Result<bool, PreviewError> {
        let showing = self.view.toggle_extracted_text();
        if !showing {
            return Ok(false);
        }

        if let Some(session) = self.session().cloned() {
            let recognizer = Arc::clone(&self.recognizer);
            if let Err(err) = session.start_extraction(recognizer, self.config.ocr_start_timeout) {
                self.view.error = Some(err.banner());
                return Err(err);
            }
        }
        Ok(true)
    }

    /// Text layers for the given zero-based pages at the current zoom.
    pub fn text_layers(&self, pages: &[u32]) -> Vec<(u32, Option<PlacedTextLayer>)> {
        match self.session() {
            Some(session) => session.text_layers(pages, self.view.zoom_percent),
            None => Vec::new(),
        }
    }

    /// Extracted text slots, in page order.
    pub fn extracted_text(&self) -> Vec<Option<PageText>> {
        match &self.preview {
            Some(Preview::Document { session, .. }) => session.texts().entries(),
            Some(Preview::Image { texts, .. }) => texts.entries(),
            Some(Preview::Text { content, .. }) => vec![Some(PageText::Text(content.clone()))],
            None => Vec::new(),
        }
    }

    /// Blocks until every background stream of the current preview is done.
    pub fn wait_for_background(&mut self) {
        if let Some(session) = self.session() {
            session.wait_for_background();
        }
        for handle in self.streams.drain(..) {
            if handle.join().is_err() {
                log::error!("image recognition stream panicked");
            }
        }
        self.view.loading = false;
    }
}
