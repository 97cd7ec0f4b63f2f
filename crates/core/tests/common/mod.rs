#![allow(dead_code)]

use docpeek_core::{
    EventCallback, EventLog, EventSink, RecognitionError, RecognitionWorker, Recognizer,
    SessionEvent,
};
use docpeek_scheduler::GenerationToken;
use pdf_engine::{
    DocumentHandle, LopdfEngine, OpenSource, PageSize, PdfDocument, PdfEngine, PdfEngineError,
    RenderRequest, RgbaImage, TextSpan,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// A latch that blocks callers until opened.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.state;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    pub fn wait(&self) {
        let (lock, cvar) = &*self.state;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }
}

/// Wraps the lopdf backend with injected page failures and an optional gate
/// held by renders of pages at or after `gate_from`.
#[derive(Clone, Default)]
pub struct TestEngine {
    pub fail_pages: HashSet<u32>,
    pub gate: Option<(Gate, u32)>,
    pub renders: Arc<Mutex<Vec<u32>>>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(pages: &[u32]) -> Self {
        Self { fail_pages: pages.iter().copied().collect(), ..Self::default() }
    }

    pub fn gated(gate: Gate, from: u32) -> Self {
        Self { gate: Some((gate, from)), ..Self::default() }
    }

    pub fn rendered(&self) -> Vec<u32> {
        self.renders.lock().unwrap().clone()
    }
}

impl PdfEngine for TestEngine {
    fn open(&self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let inner = LopdfEngine::new().open(source)?;
        Ok(Arc::new(TestDocument { inner, engine: self.clone() }))
    }
}

struct TestDocument {
    inner: DocumentHandle,
    engine: TestEngine,
}

impl PdfDocument for TestDocument {
    fn page_count(&self) -> u32 {
        self.inner.page_count()
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        self.inner.page_size(page_index)
    }

    fn render_page(&self, request: RenderRequest) -> Result<RgbaImage, PdfEngineError> {
        if let Some((gate, from)) = &self.engine.gate {
            if request.page_index >= *from {
                gate.wait();
            }
        }
        self.engine.renders.lock().unwrap().push(request.page_index);
        if self.engine.fail_pages.contains(&request.page_index) {
            return Err(PdfEngineError::Backend(format!("broken page {}", request.page_index)));
        }
        self.inner.render_page(request)
    }

    fn text_spans(&self, page_index: u32) -> Result<Vec<TextSpan>, PdfEngineError> {
        self.inner.text_spans(page_index)
    }
}

/// Recognizer that reports the raster size as its text.
#[derive(Default)]
pub struct FakeRecognizer {
    pub available: bool,
    pub spawned: AtomicUsize,
    pub terminated: Arc<AtomicUsize>,
    /// Workers spawned after this many wait for the gate.
    pub hold_after: Option<(usize, Gate)>,
}

impl FakeRecognizer {
    pub fn available() -> Self {
        Self { available: true, ..Self::default() }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn holding_after(count: usize, gate: Gate) -> Self {
        Self { available: true, hold_after: Some((count, gate)), ..Self::default() }
    }
}

struct FakeWorker {
    gate: Option<Gate>,
    terminated: Arc<AtomicUsize>,
}

impl Recognizer for FakeRecognizer {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn spawn_worker(&self) -> Result<Box<dyn RecognitionWorker>, RecognitionError> {
        let index = self.spawned.fetch_add(1, Ordering::SeqCst);
        let gate = self
            .hold_after
            .as_ref()
            .filter(|(count, _)| index >= *count)
            .map(|(_, gate)| gate.clone());
        Ok(Box::new(FakeWorker { gate, terminated: Arc::clone(&self.terminated) }))
    }
}

impl RecognitionWorker for FakeWorker {
    fn recognize(&mut self, image: &RgbaImage) -> Result<String, RecognitionError> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        Ok(format!("  recognized {}x{}\n", image.width(), image.height()))
    }

    fn terminate(self: Box<Self>) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn detached_sink(log: &EventLog) -> EventSink {
    EventSink::new(Some(log.callback()), GenerationToken::detached())
}

pub fn callback(log: &EventLog) -> EventCallback {
    log.callback()
}

/// Polls `log` until an event matches or the timeout passes.
pub fn wait_for_event<F>(log: &EventLog, timeout: Duration, predicate: F) -> bool
where
    F: Fn(&SessionEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if log.snapshot().iter().any(&predicate) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
