use crate::{
    read_source, DocumentHandle, OpenSource, PageSize, PdfDocument, PdfEngine, PdfEngineError,
    RenderRequest, RgbaImage, TextSpan,
};
use image::Rgba;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object};
use std::sync::Arc;

const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);
const TEXT_BAR: Rgba<u8> = Rgba([150, 150, 150, 255]);

/// Rough glyph metrics used when no font program is consulted.
const AVG_GLYPH_WIDTH: f32 = 0.5;
const ASCENT: f32 = 0.8;

/// Pure-Rust backend. Rasters are placeholders (page frame plus a bar per
/// embedded text run); text extraction walks the page content streams.
#[derive(Debug, Default)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = read_source(source)?;
        Ok(Arc::new(LopdfDocument::from_bytes(&bytes)?))
    }
}

#[derive(Debug, Clone)]
struct PageRecord {
    size: PageSize,
    content: Vec<u8>,
}

/// A parsed document. Only page geometry and decoded content streams are
/// kept, so the handle is plain data and freely shareable across threads.
#[derive(Debug, Clone)]
pub struct LopdfDocument {
    pages: Vec<PageRecord>,
}

impl LopdfDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        if doc.is_encrypted() {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let page_ids = doc.get_pages();
        let mut pages = Vec::with_capacity(page_ids.len());
        for (page_number, object_id) in page_ids {
            let dict = doc.get_dictionary(object_id)?;
            let size = find_media_box(&doc, dict).unwrap_or_default();
            let content = doc.get_page_content(object_id).unwrap_or_else(|err| {
                log::warn!("page {page_number}: unreadable content stream: {err}");
                Vec::new()
            });
            pages.push(PageRecord { size, content });
        }

        if pages.is_empty() {
            return Err(PdfEngineError::Empty);
        }

        log::debug!("parsed document with {} pages", pages.len());
        Ok(Self { pages })
    }

    fn page(&self, page_index: u32) -> Result<&PageRecord, PdfEngineError> {
        self.pages.get(page_index as usize).ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: self.pages.len() as u32,
        })
    }
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        Ok(self.page(page_index)?.size)
    }

    fn render_page(&self, request: RenderRequest) -> Result<RgbaImage, PdfEngineError> {
        let page_size = self.page_size(request.page_index)?;
        let scale = request.effective_scale();

        let (origin_x, origin_y, width_pt, height_pt) = match request.clip {
            Some(clip) => (clip.x, clip.y, clip.width, clip.height),
            None => (0.0, 0.0, page_size.width_pt, page_size.height_pt),
        };
        let width = (width_pt * scale).round().max(1.0) as u32;
        let height = (height_pt * scale).round().max(1.0) as u32;

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        for span in self.text_spans(request.page_index).unwrap_or_default() {
            let left = ((span.x_pt - origin_x) * scale).max(1.0) as u32;
            let top = ((span.y_pt - origin_y) * scale).max(1.0) as u32;
            let right = (((span.x_pt - origin_x + span.width_pt) * scale) as u32).min(width - 1);
            let bottom = (((span.y_pt - origin_y + span.height_pt) * scale) as u32).min(height - 1);
            for y in top..bottom {
                for x in left..right {
                    image.put_pixel(x, y, TEXT_BAR);
                }
            }
        }

        Ok(image)
    }

    fn text_spans(&self, page_index: u32) -> Result<Vec<TextSpan>, PdfEngineError> {
        let page = self.page(page_index)?;
        if page.content.is_empty() {
            return Ok(Vec::new());
        }
        parse_text_spans(&page.content, page.size.height_pt)
    }
}

/// Walks up the page tree until a MediaBox is found.
fn find_media_box(doc: &Document, dict: &Dictionary) -> Option<PageSize> {
    if let Some(size) = dict
        .get(b"MediaBox")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_array().ok())
        .and_then(|array| media_box_size(doc, array))
    {
        return Some(size);
    }

    let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
    let parent = doc.get_dictionary(parent_id).ok()?;
    find_media_box(doc, parent)
}

fn media_box_size(doc: &Document, array: &[Object]) -> Option<PageSize> {
    if array.len() != 4 {
        return None;
    }
    let x0 = resolve(doc, &array[0]).as_float().ok()?;
    let y0 = resolve(doc, &array[1]).as_float().ok()?;
    let x1 = resolve(doc, &array[2]).as_float().ok()?;
    let y1 = resolve(doc, &array[3]).as_float().ok()?;
    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Best-effort decoding of raw PDF string bytes: UTF-16BE with BOM, then
/// UTF-8, then Latin-1.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let code_units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&code_units);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Affine matrix `[a b c d e f]` as used by the PDF text operators.
#[derive(Debug, Clone, Copy)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translated(self, tx: f32, ty: f32) -> Self {
        let [a, b, c, d, e, f] = self.0;
        Self([a, b, c, d, e + tx * a + ty * c, f + tx * b + ty * d])
    }

    fn vertical_scale(self) -> f32 {
        let [_, b, _, d, _, _] = self.0;
        (b * b + d * d).sqrt()
    }
}

#[derive(Debug)]
struct TextState {
    matrix: Matrix,
    line_matrix: Matrix,
    font_size: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = self.line_matrix.translated(tx, ty);
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn show(&mut self, text: String, page_height: f32, spans: &mut Vec<TextSpan>) {
        let size = (self.font_size * self.matrix.vertical_scale()).max(1.0);
        let advance = text.chars().count() as f32 * self.font_size * AVG_GLYPH_WIDTH;
        let [a, _, _, _, e, f] = self.matrix.0;

        if !text.trim().is_empty() {
            spans.push(TextSpan {
                x_pt: e,
                y_pt: (page_height - f - size * ASCENT).max(0.0),
                width_pt: advance * a.abs().max(f32::EPSILON),
                height_pt: size,
                text,
            });
        }
        self.matrix = self.matrix.translated(advance, 0.0);
    }
}

fn number(operands: &[Object], index: usize) -> f32 {
    operands.get(index).and_then(|obj| obj.as_float().ok()).unwrap_or(0.0)
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_text_simple(bytes)),
        _ => None,
    }
}

/// Extracts positioned text runs from a decoded page content stream.
///
/// Only the text-state operators are interpreted; graphics-state transforms
/// (`cm`) are ignored, which is enough for the upright text most generated
/// documents carry.
pub(crate) fn parse_text_spans(
    content: &[u8],
    page_height: f32,
) -> Result<Vec<TextSpan>, PdfEngineError> {
    let content = Content::decode(content)?;
    let mut state = TextState::default();
    let mut spans = Vec::new();

    for operation in content.operations {
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "BT" => {
                state.matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => state.font_size = number(operands, 1),
            "TL" => state.leading = number(operands, 0),
            "Td" => state.move_line(number(operands, 0), number(operands, 1)),
            "TD" => {
                state.leading = -number(operands, 1);
                state.move_line(number(operands, 0), number(operands, 1));
            }
            "Tm" => {
                let mut m = [0.0; 6];
                for (i, value) in m.iter_mut().enumerate() {
                    *value = number(operands, i);
                }
                state.matrix = Matrix(m);
                state.line_matrix = state.matrix;
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.show(text, page_height, &mut spans);
                }
            }
            "'" => {
                state.next_line();
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.show(text, page_height, &mut spans);
                }
            }
            "\"" => {
                state.next_line();
                if let Some(text) = operands.get(2).and_then(string_operand) {
                    state.show(text, page_height, &mut spans);
                }
            }
            "TJ" => {
                let Some(Ok(items)) = operands.first().map(Object::as_array) else {
                    continue;
                };
                let mut text = String::new();
                for item in items {
                    match item {
                        Object::String(bytes, _) => text.push_str(&decode_text_simple(bytes)),
                        // Large negative kerning is how generators encode word gaps.
                        other => {
                            if other.as_float().map(|gap| gap < -250.0).unwrap_or(false) {
                                text.push(' ');
                            }
                        }
                    }
                }
                state.show(text, page_height, &mut spans);
            }
            _ => {}
        }
    }

    Ok(spans)
}
