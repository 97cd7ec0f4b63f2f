//! OCR extraction pipeline
//!
//! Recognition runs in bounded batches: one short-lived worker per page,
//! [`OCR_BATCH_SIZE`] pages at a time, each batch awaited as a unit before
//! its results are published. A worker is always torn down after its page,
//! whether recognition succeeded or not.

use crate::raster::PageRaster;
use docpeek_scheduler::{BatchOutcome, BatchRunner, GenerationToken};
use pdf_engine::RgbaImage;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, OnceLock};
use viewer_core::{plan_batches, OCR_BATCH_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognizer unavailable: {0}")]
    Unavailable(String),
    #[error("failed to start recognition worker: {0}")]
    WorkerStart(String),
    #[error("invalid image data: {0}")]
    InvalidImage(String),
    #[error("recognition failed: {0}")]
    Failed(String),
}

/// Produces recognition workers.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn spawn_worker(&self) -> Result<Box<dyn RecognitionWorker>, RecognitionError>;
}

/// A single-use recognition worker.
pub trait RecognitionWorker: Send {
    fn recognize(&mut self, image: &RgbaImage) -> Result<String, RecognitionError>;

    fn terminate(self: Box<Self>);
}

/// Recognizer backed by the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self { binary: PathBuf::from("tesseract"), language: language.into() }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn spawn_worker(&self) -> Result<Box<dyn RecognitionWorker>, RecognitionError> {
        let scratch = tempfile::Builder::new()
            .prefix("docpeek-ocr-")
            .tempdir()
            .map_err(|err| RecognitionError::WorkerStart(err.to_string()))?;
        Ok(Box::new(TesseractWorker {
            binary: self.binary.clone(),
            language: self.language.clone(),
            scratch,
        }))
    }
}

struct TesseractWorker {
    binary: PathBuf,
    language: String,
    scratch: tempfile::TempDir,
}

impl RecognitionWorker for TesseractWorker {
    fn recognize(&mut self, image: &RgbaImage) -> Result<String, RecognitionError> {
        let input = self.scratch.path().join("page.png");
        image.save(&input).map_err(|err| RecognitionError::InvalidImage(err.to_string()))?;

        let output = Command::new(&self.binary)
            .arg(&input)
            .arg("stdout")
            .args(["-l", &self.language, "--psm", "3"])
            .output()
            .map_err(|err| RecognitionError::Unavailable(err.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Failed(stderr.trim().to_owned()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn terminate(self: Box<Self>) {
        if let Err(err) = self.scratch.close() {
            log::warn!("failed to remove OCR scratch directory: {err}");
        }
    }
}

/// Extracted text for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum PageText {
    Text(String),
    /// Recognition failed for this page only.
    Failed(String),
}

impl PageText {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Write-once text slots, one per page (or a single one for an image).
#[derive(Debug)]
pub struct TextCache {
    slots: Vec<OnceLock<PageText>>,
}

impl TextCache {
    pub fn new(len: u32) -> Self {
        Self { slots: (0..len).map(|_| OnceLock::new()).collect() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn insert(&self, index: u32, text: PageText) -> bool {
        self.slots.get(index as usize).is_some_and(|slot| slot.set(text).is_ok())
    }

    pub fn get(&self, index: u32) -> Option<&PageText> {
        self.slots.get(index as usize)?.get()
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.filled_count() == self.slots.len()
    }

    pub fn entries(&self) -> Vec<Option<PageText>> {
        self.slots.iter().map(|slot| slot.get().cloned()).collect()
    }

    /// Recognized text of all filled slots, failures skipped.
    pub fn joined_text(&self) -> String {
        self.slots
            .iter()
            .filter_map(|slot| slot.get().and_then(PageText::text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct OcrPipeline {
    recognizer: Arc<dyn Recognizer>,
    runner: BatchRunner,
}

impl fmt::Debug for OcrPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrPipeline").field("recognizer", &self.recognizer.name()).finish()
    }
}

impl OcrPipeline {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self { recognizer, runner: BatchRunner::new("ocr") }
    }

    pub fn recognizer(&self) -> &Arc<dyn Recognizer> {
        &self.recognizer
    }

    /// Recognizes a single image into slot 0 of `cache`.
    pub fn extract_image(&self, image: &RgbaImage, cache: &TextCache) {
        let text = recognize_one(self.recognizer.as_ref(), image);
        if let PageText::Failed(reason) = &text {
            log::warn!("image recognition failed: {reason}");
        }
        cache.insert(0, text);
    }

    /// Recognizes `page_count` pages in ascending batches.
    ///
    /// `raster_for` supplies each page's raster, rendering it if needed.
    /// `after_batch` runs once per published batch with that batch's pages.
    pub fn extract_pages<F, A>(
        &self,
        page_count: u32,
        cache: &TextCache,
        token: &GenerationToken,
        raster_for: F,
        mut after_batch: A,
    ) -> BatchOutcome
    where
        F: Fn(u32) -> Result<Arc<PageRaster>, String> + Sync,
        A: FnMut(&[u32]),
    {
        let recognizer = self.recognizer.as_ref();
        let batches = plan_batches(0..page_count, OCR_BATCH_SIZE);

        self.runner.run(
            batches,
            token,
            |page| match raster_for(page) {
                Ok(raster) => recognize_one(recognizer, &raster.image),
                Err(reason) => PageText::Failed(reason),
            },
            |report| {
                let pages: Vec<u32> = report.results.iter().map(|(page, _)| *page).collect();
                for (page, result) in report.results {
                    let text = result.unwrap_or_else(|panic| PageText::Failed(panic.to_string()));
                    if let PageText::Failed(reason) = &text {
                        log::warn!("OCR failed for page {}: {reason}", page + 1);
                    }
                    cache.insert(page, text);
                }
                log::debug!("OCR batch {} published pages {pages:?}", report.index);
                after_batch(&pages);
            },
        )
    }
}

fn recognize_one(recognizer: &dyn Recognizer, image: &RgbaImage) -> PageText {
    let mut worker = match recognizer.spawn_worker() {
        Ok(worker) => worker,
        Err(err) => return PageText::Failed(err.to_string()),
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| worker.recognize(image)));
    worker.terminate();

    match result {
        Ok(Ok(text)) => PageText::Text(text.trim().to_owned()),
        Ok(Err(err)) => PageText::Failed(err.to_string()),
        Err(_) => PageText::Failed("recognition worker panicked".to_owned()),
    }
}
