//! docpeek core library
//!
//! Progressive document preview and text extraction: sessions, caches,
//! OCR batching and the collaborator clients around them.

pub mod category;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod events;
pub mod ocr;
pub mod raster;
pub mod renderer;
pub mod session;
pub mod text_layer;

pub use category::{csv_to_text, direct_text, pretty_json, rows_to_text, FileCategory};
pub use config::{ConfigError, PreviewConfig};
pub use controller::{JumpTarget, Preview, PreviewController, PAGE_SPACING};
pub use convert::{fetch_url, filename_from_url, FetchedFile, ServerClient, UploadedFile};
pub use error::{LoadFailureKind, PreviewError, PreviewResult};
pub use events::{EventCallback, EventLog, EventSink, SessionEvent};
pub use ocr::{
    OcrPipeline, PageText, RecognitionError, RecognitionWorker, Recognizer, TesseractRecognizer,
    TextCache,
};
pub use raster::{PageRaster, RasterCache, ViewportRecord};
pub use renderer::PageRenderer;
pub use session::{PreviewSession, SessionPhase, SessionSummary};
pub use text_layer::{
    build_text_layer, LayerSpan, LayerTransform, PlacedTextLayer, TextLayer, TextLayerCache,
};
