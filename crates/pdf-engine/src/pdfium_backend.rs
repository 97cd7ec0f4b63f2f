//! PDFium-backed documents: real rasterization and glyph-accurate text runs.

use crate::{
    read_source, DocumentHandle, OpenSource, PageSize, PdfDocument, PdfEngine, PdfEngineError,
    RenderRequest, RgbaImage, TextSpan,
};
use pdfium_render::prelude::*;
use std::sync::{Arc, Mutex};

pub struct PdfiumEngine {
    pdfium: &'static Pdfium,
}

impl PdfiumEngine {
    /// Binds the PDFium library next to the executable, in the working
    /// directory, or from the system library path, in that order.
    pub fn from_system_library() -> Result<Self, PdfEngineError> {
        let exe_dir =
            std::env::current_exe().ok().and_then(|path| path.parent().map(|p| p.to_path_buf()));

        let bindings = exe_dir
            .and_then(|dir| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)).ok()
            })
            .map(Ok)
            .unwrap_or_else(|| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                    .or_else(|_| Pdfium::bind_to_system_library())
            })
            .map_err(|err| {
                PdfEngineError::Backend(format!("failed to bind pdfium library: {err}"))
            })?;

        Ok(Self { pdfium: Box::leak(Box::new(Pdfium::new(bindings))) })
    }
}

impl PdfEngine for PdfiumEngine {
    fn open(&self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = read_source(source)?;
        let document = self.pdfium.load_pdf_from_byte_vec(bytes, None).map_err(|err| match err {
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                PdfEngineError::EncryptedUnsupported
            }
            other => PdfEngineError::Backend(other.to_string()),
        })?;

        let page_count = document.pages().len() as u32;
        if page_count == 0 {
            return Err(PdfEngineError::Empty);
        }

        Ok(Arc::new(PdfiumDocument { document: Mutex::new(document), page_count }))
    }
}

/// PDFium is not re-entrant; every page access goes through the lock.
pub struct PdfiumDocument {
    document: Mutex<pdfium_render::prelude::PdfDocument<'static>>,
    page_count: u32,
}

impl PdfiumDocument {
    fn with_page<T>(
        &self,
        page_index: u32,
        f: impl FnOnce(&PdfPage<'_>) -> Result<T, PdfEngineError>,
    ) -> Result<T, PdfEngineError> {
        self.check_page(page_index)?;
        let document = self
            .document
            .lock()
            .map_err(|_| PdfEngineError::Backend("pdfium document lock poisoned".to_owned()))?;
        let page = document
            .pages()
            .get(page_index as u16)
            .map_err(|err| PdfEngineError::Backend(err.to_string()))?;
        f(&page)
    }
}

impl PdfDocument for PdfiumDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        self.with_page(page_index, |page| {
            Ok(PageSize { width_pt: page.width().value, height_pt: page.height().value })
        })
    }

    fn render_page(&self, request: RenderRequest) -> Result<RgbaImage, PdfEngineError> {
        let scale = request.effective_scale();
        self.with_page(request.page_index, |page| {
            let width = (page.width().value * scale).round().max(1.0) as i32;
            let height = (page.height().value * scale).round().max(1.0) as i32;
            let config = PdfRenderConfig::new().set_target_width(width).set_target_height(height);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

            RgbaImage::from_raw(width as u32, height as u32, bitmap.as_rgba_bytes())
                .ok_or_else(|| PdfEngineError::Backend("bitmap size mismatch".to_owned()))
        })
    }

    fn text_spans(&self, page_index: u32) -> Result<Vec<TextSpan>, PdfEngineError> {
        self.with_page(page_index, |page| {
            let page_height = page.height().value;
            let text_page =
                page.text().map_err(|err| PdfEngineError::Backend(err.to_string()))?;

            let mut spans = Vec::new();
            let mut current: Option<TextSpan> = None;

            for glyph in text_page.chars().iter() {
                let Some(c) = glyph.unicode_char() else {
                    continue;
                };
                let Ok(bounds) = glyph.loose_bounds() else {
                    continue;
                };

                if c.is_whitespace() {
                    spans.extend(current.take());
                    continue;
                }

                let left = bounds.left().value;
                let right = bounds.right().value;
                let top = page_height - bounds.top().value;
                let bottom = page_height - bounds.bottom().value;

                match current.as_mut() {
                    Some(span) => {
                        span.text.push(c);
                        let span_bottom = (span.y_pt + span.height_pt).max(bottom);
                        span.y_pt = span.y_pt.min(top);
                        span.height_pt = span_bottom - span.y_pt;
                        span.width_pt = (right - span.x_pt).max(span.width_pt);
                    }
                    None => {
                        current = Some(TextSpan {
                            text: c.to_string(),
                            x_pt: left,
                            y_pt: top,
                            width_pt: right - left,
                            height_pt: bottom - top,
                        });
                    }
                }
            }
            spans.extend(current);

            Ok(spans)
        })
    }
}
