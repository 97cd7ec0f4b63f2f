//! Document backends for the preview engine.
//!
//! A [`PdfEngine`] parses a source into a shared [`DocumentHandle`]; the
//! handle answers page geometry, rasterizes single pages and exposes the
//! document's embedded text runs. Handles are `Send + Sync` so render and
//! recognition batches can share one parsed document across threads.

use image::{ImageBuffer, Rgba};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod lopdf_backend;
#[cfg(feature = "pdfium")]
pub mod pdfium_backend;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use lopdf_backend::{decode_text_simple, LopdfDocument, LopdfEngine};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// A parsed document shared between the session and its worker threads.
pub type DocumentHandle = Arc<dyn PdfDocument>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl Default for PageSize {
    /// US Letter, used when a page declares no usable MediaBox.
    fn default() -> Self {
        Self { width_pt: 612.0, height_pt: 792.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
    pub clip: Option<ClipRect>,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0, clip: None }
    }
}

impl RenderRequest {
    pub fn page(page_index: u32, scale: f32) -> Self {
        Self { page_index, scale, clip: None }
    }

    /// Scale actually used for rasterizing; non-positive values fall back to 1.0.
    pub fn effective_scale(&self) -> f32 {
        if self.scale <= 0.0 || !self.scale.is_finite() {
            1.0
        } else {
            self.scale
        }
    }
}

/// One run of embedded text in page space (points, top-left origin).
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub x_pt: f32,
    pub y_pt: f32,
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("document is password protected")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    Empty,
    #[error("backend error: {0}")]
    Backend(String),
}

pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> u32;

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError>;

    fn render_page(&self, request: RenderRequest) -> Result<RgbaImage, PdfEngineError>;

    /// Embedded text runs for a page. Scanned pages return an empty list.
    fn text_spans(&self, page_index: u32) -> Result<Vec<TextSpan>, PdfEngineError>;

    fn has_text(&self, page_index: u32) -> Result<bool, PdfEngineError> {
        Ok(self.text_spans(page_index)?.iter().any(|span| !span.text.trim().is_empty()))
    }

    fn check_page(&self, page_index: u32) -> Result<(), PdfEngineError> {
        let page_count = self.page_count();
        if page_index >= page_count {
            return Err(PdfEngineError::PageOutOfRange { page: page_index, page_count });
        }
        Ok(())
    }
}

pub trait PdfEngine: Send + Sync {
    fn open(&self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
}

/// Reads an [`OpenSource`] into memory.
pub fn read_source(source: OpenSource) -> Result<Vec<u8>, PdfEngineError> {
    match source {
        OpenSource::Path(path) => Ok(std::fs::read(path)?),
        OpenSource::Bytes(bytes) => Ok(bytes),
    }
}

pub fn default_engine() -> Arc<dyn PdfEngine> {
    #[cfg(feature = "pdfium")]
    {
        match pdfium_backend::PdfiumEngine::from_system_library() {
            Ok(engine) => return Arc::new(engine),
            Err(err) => log::warn!("pdfium unavailable, using lopdf backend: {err}"),
        }
    }
    Arc::new(LopdfEngine::new())
}
