//! Page renderer
//!
//! Rasterizes one page at the session scale. Results are not memoised here;
//! the raster cache owns that.

use crate::error::PreviewError;
use crate::raster::PageRaster;
use pdf_engine::{DocumentHandle, RenderRequest};
use std::fmt;

#[derive(Clone)]
pub struct PageRenderer {
    document: DocumentHandle,
    scale: f32,
}

impl fmt::Debug for PageRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRenderer")
            .field("page_count", &self.document.page_count())
            .field("scale", &self.scale)
            .finish()
    }
}

impl PageRenderer {
    pub fn new(document: DocumentHandle, scale: f32) -> Self {
        Self { document, scale }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.document
    }

    /// Renders `page_index` (zero-based) into a fresh raster.
    ///
    /// # Errors
    /// `PreviewError::PageRender` for out-of-range pages or backend failures.
    pub fn render(&self, page_index: u32) -> Result<PageRaster, PreviewError> {
        self.document
            .check_page(page_index)
            .map_err(|err| PreviewError::page_render(page_index, err))?;

        let image = self
            .document
            .render_page(RenderRequest::page(page_index, self.scale))
            .map_err(|err| PreviewError::page_render(page_index, err))?;

        Ok(PageRaster::new(page_index, image))
    }
}
