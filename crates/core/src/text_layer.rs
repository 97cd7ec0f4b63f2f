//! Selectable text layer
//!
//! Positions the document's embedded text runs over a page raster. Geometry
//! is computed once per page in base raster pixels, sized to the page's
//! viewport record; zoom changes only swap the [`LayerTransform`] applied on
//! top of it.

use crate::raster::ViewportRecord;
use pdf_engine::{PdfDocument, PdfEngineError};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use viewer_core::Rect;

/// One positioned text run in base raster pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpan {
    pub text: String,
    pub bounds: Rect,
}

/// Text overlay geometry for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLayer {
    pub page_index: u32,
    /// Matches the page's viewport record exactly.
    pub width: u32,
    pub height: u32,
    pub spans: Vec<LayerSpan>,
}

impl TextLayer {
    pub fn text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect::<Vec<_>>().join(" ")
    }
}

/// Builds the layer for a page whose raster is already cached.
///
/// Spans are scaled from points by the render scale and clipped to the
/// viewport; spans entirely outside the page are dropped.
pub fn build_text_layer(
    document: &dyn PdfDocument,
    page_index: u32,
    scale: f32,
    viewport: ViewportRecord,
) -> Result<TextLayer, PdfEngineError> {
    let page_width = viewport.width as f32;
    let page_height = viewport.height as f32;

    let spans = document
        .text_spans(page_index)?
        .into_iter()
        .filter(|span| !span.text.trim().is_empty())
        .filter_map(|span| {
            let x = (span.x_pt * scale).max(0.0);
            let y = (span.y_pt * scale).max(0.0);
            if x >= page_width || y >= page_height {
                return None;
            }
            let width = (span.width_pt * scale).min(page_width - x);
            let height = (span.height_pt * scale).min(page_height - y);
            Some(LayerSpan { text: span.text, bounds: Rect::new(x, y, width, height) })
        })
        .collect();

    Ok(TextLayer { page_index, width: viewport.width, height: viewport.height, spans })
}

/// Zoom transform applied to every layer on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerTransform {
    pub zoom: f32,
}

impl LayerTransform {
    pub fn for_zoom_percent(percent: u16) -> Self {
        Self { zoom: f32::from(percent) / 100.0 }
    }

    /// CSS transform string for the overlay element.
    pub fn css(&self) -> String {
        format!("translate(-50%, -50%) scale({})", self.zoom)
    }

    pub fn origin(&self) -> &'static str {
        "top left"
    }

    /// Maps a rectangle from base raster pixels to on-screen pixels.
    pub fn apply(&self, rect: Rect) -> Rect {
        Rect::new(
            rect.x * self.zoom,
            rect.y * self.zoom,
            rect.width * self.zoom,
            rect.height * self.zoom,
        )
    }
}

/// A page's layer placed at the current zoom.
#[derive(Debug, Clone)]
pub struct PlacedTextLayer {
    pub layer: Arc<TextLayer>,
    pub transform: LayerTransform,
}

impl PlacedTextLayer {
    pub fn screen_bounds(&self) -> Vec<Rect> {
        self.layer.spans.iter().map(|span| self.transform.apply(span.bounds)).collect()
    }
}

/// Per-page memo of built layers. `None` marks a page whose layer could not
/// be built; it is not retried within the session.
#[derive(Debug)]
pub struct TextLayerCache {
    slots: Vec<OnceLock<Option<Arc<TextLayer>>>>,
}

impl TextLayerCache {
    pub fn new(page_count: u32) -> Self {
        Self { slots: (0..page_count).map(|_| OnceLock::new()).collect() }
    }

    pub fn get_or_build<F>(&self, page_index: u32, build: F) -> Option<Arc<TextLayer>>
    where
        F: FnOnce() -> Result<TextLayer, PdfEngineError>,
    {
        let slot = self.slots.get(page_index as usize)?;
        slot.get_or_init(|| match build() {
            Ok(layer) => Some(Arc::new(layer)),
            Err(err) => {
                log::warn!("text layer for page {} unavailable: {err}", page_index + 1);
                None
            }
        })
        .clone()
    }

    pub fn built_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }
}
