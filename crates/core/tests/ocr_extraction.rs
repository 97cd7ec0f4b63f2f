mod common;

use common::{detached_sink, wait_for_event, FakeRecognizer, Gate, TestEngine};
use docpeek_core::{
    EventLog, PageText, Preview, PreviewConfig, PreviewController, PreviewError, PreviewSession,
    SessionEvent, SessionPhase,
};
use image::{ImageFormat, Rgba, RgbaImage};
use pdf_engine::testing::{scanned_pdf, text_pdf};
use pdf_engine::LopdfEngine;
use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn controller(recognizer: FakeRecognizer) -> (PreviewController, EventLog) {
    let log = EventLog::new();
    let controller = PreviewController::new(
        Arc::new(LopdfEngine::new()),
        Arc::new(recognizer),
        PreviewConfig::default().with_ocr_start_timeout(Duration::from_millis(200)),
    )
    .with_callback(log.callback());
    (controller, log)
}

#[test]
fn scanned_three_page_document_is_extracted_automatically() {
    let (mut controller, log) = controller(FakeRecognizer::available());

    controller.load_bytes("scan.pdf", Some("application/pdf"), scanned_pdf(3)).unwrap();
    controller.wait_for_background();

    let texts = controller.extracted_text();
    assert_eq!(texts.len(), 3);
    for text in &texts {
        let text = text.as_ref().and_then(PageText::text).unwrap();
        assert_eq!(text, "recognized 918x1188");
    }
    assert_eq!(log.text_batches(), vec![vec![0, 1, 2]]);
    assert!(log
        .snapshot()
        .iter()
        .any(|event| matches!(event, SessionEvent::ExtractionFinished { pages: 3, .. })));
    assert_eq!(controller.phase(), SessionPhase::Ready);
}

#[test]
fn text_documents_extract_only_on_demand() {
    let (mut controller, log) = controller(FakeRecognizer::available());

    controller.load_bytes("report.pdf", None, text_pdf(5)).unwrap();
    controller.wait_for_background();
    assert!(controller.extracted_text().iter().all(Option::is_none));
    assert!(log.text_batches().is_empty());

    assert!(controller.toggle_extracted_text().unwrap());
    controller.wait_for_background();

    assert!(controller.extracted_text().iter().all(Option::is_some));
    assert_eq!(log.text_batches(), vec![vec![0, 1, 2, 3], vec![4]]);
    assert!(controller.view().show_extracted_text);
}

#[test]
fn text_cache_is_partial_after_the_first_batch() {
    let gate = Gate::new();
    let recognizer = Arc::new(FakeRecognizer::holding_after(4, gate.clone()));
    let log = EventLog::new();
    let session =
        PreviewSession::open(&LopdfEngine::new(), scanned_pdf(8).into(), detached_sink(&log))
            .unwrap();

    assert!(session.start_extraction(recognizer.clone(), Duration::from_secs(1)).unwrap());
    assert!(wait_for_event(&log, Duration::from_secs(10), |event| {
        matches!(event, SessionEvent::TextBatchExtracted { .. })
    }));

    assert_eq!(session.phase(), SessionPhase::Extracting);
    assert_eq!(session.texts().filled_count(), 4);
    assert!((0..4).all(|page| session.texts().get(page).is_some()));
    assert!((4..8).all(|page| session.texts().get(page).is_none()));

    gate.open();
    session.wait_for_background();

    assert!(session.texts().is_complete());
    assert_eq!(log.text_batches(), vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]);
    assert_eq!(recognizer.terminated.load(Ordering::SeqCst), 8);
}

#[test]
fn extraction_leaves_on_demand_pages_unrendered() {
    let log = EventLog::new();
    let session = PreviewSession::open(
        &LopdfEngine::new(),
        scanned_pdf(60).into(),
        detached_sink(&log),
    )
    .unwrap();
    assert!(session.render_config().large);

    session.start_background().unwrap();
    session
        .start_extraction(Arc::new(FakeRecognizer::available()), Duration::from_secs(1))
        .unwrap();
    session.wait_for_background();

    assert!(session.texts().is_complete());
    assert!(session.texts().entries().iter().flatten().all(|text| !text.is_failed()));
    assert_eq!(session.texts().get(59).and_then(PageText::text), Some("recognized 734x950"));
    assert_eq!(session.rasters().filled_pages(), (0..10).collect::<Vec<_>>());
    assert!(log.rendered_pages().iter().all(|&page| page < 10));
}

#[test]
fn small_document_extraction_fills_the_raster_cache() {
    let session = PreviewSession::open(
        &LopdfEngine::new(),
        scanned_pdf(6).into(),
        detached_sink(&EventLog::new()),
    )
    .unwrap();

    session
        .start_extraction(Arc::new(FakeRecognizer::available()), Duration::from_secs(1))
        .unwrap();
    session.wait_for_background();

    assert!(session.texts().is_complete());
    assert_eq!(session.rasters().filled_count(), 6);
}

#[test]
fn large_scanned_document_keeps_memory_bound_after_auto_ocr() {
    let (mut controller, _) = controller(FakeRecognizer::available());

    controller.load_bytes("archive.pdf", None, scanned_pdf(120)).unwrap();
    controller.wait_for_background();

    let session = controller.session().unwrap();
    assert!(session.texts().is_complete());
    assert!(session.rasters().filled_count() <= 10);
    assert!(!session.rasters().is_filled(114));

    controller.apply_page_input("115").unwrap();
    assert!(controller.session().unwrap().rasters().is_filled(114));
}

#[test]
fn failed_page_fills_failure_sentinel_and_others_continue() {
    let log = EventLog::new();
    let engine = TestEngine::failing(&[5]);
    let session =
        PreviewSession::open(&engine, scanned_pdf(7).into(), detached_sink(&log)).unwrap();

    session
        .start_extraction(Arc::new(FakeRecognizer::available()), Duration::from_secs(1))
        .unwrap();
    session.wait_for_background();

    let texts = session.texts();
    assert!(texts.get(5).is_some_and(PageText::is_failed));
    assert_eq!(texts.entries().iter().flatten().filter(|t| !t.is_failed()).count(), 6);
}

#[test]
fn unavailable_recognizer_raises_global_extraction_error() {
    let (mut controller, log) = controller(FakeRecognizer::unavailable());

    controller.load_bytes("scan.pdf", None, scanned_pdf(2)).unwrap();

    assert_eq!(controller.banner(), Some("Failed to extract text from file."));
    assert!(log
        .snapshot()
        .iter()
        .any(|event| matches!(event, SessionEvent::ExtractionFailed { .. })));

    let err = controller.toggle_extracted_text().unwrap_err();
    assert!(matches!(err, PreviewError::Extraction(_)));
    controller.wait_for_background();
}

#[test]
fn extraction_fails_to_start_when_first_page_cannot_render() {
    let engine = TestEngine::failing(&[0]);
    let session = PreviewSession::open(
        &engine,
        scanned_pdf(3).into(),
        detached_sink(&EventLog::new()),
    )
    .unwrap();

    let err = session
        .start_extraction(Arc::new(FakeRecognizer::available()), Duration::from_millis(50))
        .unwrap_err();

    assert!(matches!(err, PreviewError::Extraction(_)));
    assert_eq!(session.texts().filled_count(), 0);
}

#[test]
fn image_is_recognized_into_a_single_slot() {
    let (mut controller, log) = controller(FakeRecognizer::available());
    let mut png = Vec::new();
    RgbaImage::from_pixel(40, 30, Rgba([255, 255, 255, 255]))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();

    controller.load_bytes("photo.png", None, png).unwrap();
    controller.wait_for_background();

    assert!(matches!(controller.preview(), Some(Preview::Image { .. })));
    assert_eq!(
        controller.extracted_text(),
        vec![Some(PageText::Text("recognized 40x30".to_owned()))]
    );
    assert_eq!(log.text_batches(), vec![vec![0]]);
}

#[test]
fn direct_text_categories_skip_recognition() {
    let recognizer = Arc::new(FakeRecognizer::available());
    let mut controller = PreviewController::new(
        Arc::new(LopdfEngine::new()),
        recognizer.clone(),
        PreviewConfig::default(),
    );

    controller.load_bytes("rows.csv", None, b"a,b\n1,2\n".to_vec()).unwrap();

    assert_eq!(controller.extracted_text(), vec![Some(PageText::Text("a\tb\n1\t2".to_owned()))]);
    assert_eq!(recognizer.spawned.load(Ordering::SeqCst), 0);
}

#[test]
fn unsupported_category_sets_banner() {
    let (mut controller, _) = controller(FakeRecognizer::available());

    let err = controller.load_bytes("movie.mp4", None, vec![0; 16]).unwrap_err();

    assert!(matches!(err, PreviewError::Unsupported(_)));
    assert_eq!(controller.banner(), Some("Preview is not available for video files."));
    assert_eq!(controller.phase(), SessionPhase::Idle);
}

#[test]
fn corrupt_pdf_sets_banner() {
    let (mut controller, _) = controller(FakeRecognizer::available());

    let err = controller.load_bytes("broken.pdf", None, b"%PDF-1.7 garbage".to_vec()).unwrap_err();

    assert!(matches!(err, PreviewError::Load { .. }));
    assert_eq!(
        controller.banner(),
        Some("Invalid or corrupted PDF file. Please try a different PDF.")
    );
}
