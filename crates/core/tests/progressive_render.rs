mod common;

use common::{detached_sink, FakeRecognizer, Gate, TestEngine};
use docpeek_core::{
    EventLog, PreviewConfig, PreviewController, PreviewError, PreviewSession, SessionEvent,
};
use pdf_engine::testing::text_pdf;
use pdf_engine::LopdfEngine;
use std::sync::Arc;

fn open_session(engine: &TestEngine, pages: usize) -> (PreviewSession, EventLog) {
    let log = EventLog::new();
    let session =
        PreviewSession::open(engine, text_pdf(pages).into(), detached_sink(&log)).unwrap();
    (session, log)
}

#[test]
fn small_document_renders_every_page_in_ascending_batches() {
    let engine = TestEngine::new();
    let (session, log) = open_session(&engine, 20);
    assert_eq!(session.rasters().filled_count(), 3);

    session.start_background().unwrap();
    session.wait_for_background();

    assert_eq!(session.rasters().filled_count(), 20);
    let batches: Vec<Vec<u32>> = log
        .snapshot()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::PagesRendered { pages, .. } => Some(pages),
            _ => None,
        })
        .collect();
    assert_eq!(batches[0], vec![0, 1, 2]);
    assert_eq!(batches[1], vec![3, 4, 5]);
    assert_eq!(batches.last(), Some(&vec![18, 19]));
    assert!(batches.windows(2).all(|pair| pair[0].last() < pair[1].first()));
}

#[test]
fn large_document_prefetches_only_the_first_ten_pages() {
    let engine = TestEngine::new();
    let (session, _) = open_session(&engine, 120);
    assert!(session.render_config().large);
    assert_eq!(session.render_config().scale, 1.2);

    session.start_background().unwrap();
    session.wait_for_background();

    assert_eq!(session.rasters().filled_pages(), (0..10).collect::<Vec<_>>());
}

#[test]
fn scrolled_page_of_large_document_renders_on_demand() {
    let engine = TestEngine::new();
    let (session, log) = open_session(&engine, 120);
    session.start_background().unwrap();
    session.wait_for_background();

    let scheduled = session.request_visible(&[113, 114]);
    session.wait_for_background();

    assert_eq!(scheduled, vec![113, 114]);
    assert!(session.rasters().is_filled(114));
    assert!((10..113).all(|page| !session.rasters().is_filled(page)));
    assert_eq!(log.rendered_pages().iter().filter(|&&p| p == 114).count(), 1);
}

#[test]
fn prefetch_window_pages_are_not_requested_on_demand() {
    let engine = TestEngine::new();
    let (session, _) = open_session(&engine, 120);

    assert!(session.request_visible(&[5, 6]).is_empty());
}

#[test]
fn rendered_pages_are_not_requested_again() {
    let engine = TestEngine::new();
    let (session, _) = open_session(&engine, 120);

    session.request_visible(&[60]);
    session.wait_for_background();
    let renders_before = engine.rendered().len();

    assert!(session.request_visible(&[60]).is_empty());
    session.jump_to(60).unwrap();
    assert_eq!(engine.rendered().len(), renders_before);
}

#[test]
fn page_failure_is_isolated_and_not_retried_by_scrolling() {
    let engine = TestEngine::failing(&[4, 70]);
    let (session, log) = open_session(&engine, 80);
    session.start_background().unwrap();
    session.wait_for_background();

    // Page 4 sits in the prefetch window of a large document.
    assert!(session.rasters().failure(4).is_some());
    assert_eq!(session.rasters().filled_count(), 9);
    assert!(log
        .snapshot()
        .iter()
        .any(|event| matches!(event, SessionEvent::PageRenderFailed { page: 4, .. })));

    session.request_visible(&[70]);
    session.wait_for_background();
    assert!(session.rasters().failure(70).is_some());
    assert!(session.request_visible(&[70]).is_empty());

    // An explicit jump is a user retry.
    let attempts = engine.rendered().iter().filter(|&&p| p == 70).count();
    let err = session.jump_to(70).unwrap_err();
    assert!(matches!(err, PreviewError::PageRender { page: 70, .. }));
    assert_eq!(engine.rendered().iter().filter(|&&p| p == 70).count(), attempts + 1);
}

#[test]
fn duplicate_renders_keep_the_first_raster() {
    let engine = TestEngine::new();
    let (session, log) = open_session(&engine, 120);

    let jumped = session.jump_to(90).unwrap();
    session.request_visible(&[90]);
    session.wait_for_background();

    assert!(Arc::ptr_eq(&jumped, &session.raster(90).unwrap()));
    assert_eq!(log.rendered_pages().iter().filter(|&&p| p == 90).count(), 1);
}

#[test]
fn controller_scroll_drives_on_demand_rendering() {
    let mut controller = PreviewController::new(
        Arc::new(LopdfEngine::new()),
        Arc::new(FakeRecognizer::available()),
        PreviewConfig::default(),
    );
    controller.load_bytes("big.pdf", None, text_pdf(120)).unwrap();
    controller.wait_for_background();
    assert_eq!(controller.view().total_pages, 120);
    assert_eq!(controller.view().current_page, 1);

    let offset = controller.layout().scroll_offset_for(114).unwrap();
    let update = controller.on_scroll(offset, 400.0).unwrap();
    controller.wait_for_background();

    assert!(update.changed);
    assert_eq!(update.current, 114);
    assert_eq!(controller.view().current_page, 115);
    let session = controller.session().unwrap();
    assert!(session.rasters().is_filled(114));
    assert!(!session.rasters().is_filled(113));
    assert!(!session.rasters().is_filled(10));
}

#[test]
fn controller_page_input_jumps_and_renders() {
    let mut controller = PreviewController::new(
        Arc::new(LopdfEngine::new()),
        Arc::new(FakeRecognizer::available()),
        PreviewConfig::default(),
    );
    controller.load_bytes("big.pdf", None, text_pdf(120)).unwrap();

    let target = controller.apply_page_input("500").unwrap();

    assert_eq!(target.page, 120);
    assert_eq!(Some(target.scroll_offset), controller.layout().scroll_offset_for(119));
    assert!(controller.session().unwrap().rasters().is_filled(119));
    assert!(controller.apply_page_input("last").is_none());
    assert_eq!(controller.view().current_page, 120);
    controller.wait_for_background();
}

#[test]
fn loading_a_new_file_drops_stale_results() {
    let gate = Gate::new();
    let log = EventLog::new();
    let mut controller = PreviewController::new(
        Arc::new(TestEngine::gated(gate.clone(), 3)),
        Arc::new(FakeRecognizer::available()),
        PreviewConfig::default(),
    )
    .with_callback(log.callback());

    controller.load_bytes("first.pdf", None, text_pdf(12)).unwrap();
    let first = controller.session().cloned().unwrap();
    let first_generation = first.generation();

    controller.load_bytes("second.pdf", None, text_pdf(2)).unwrap();
    gate.open();
    first.wait_for_background();
    controller.wait_for_background();

    let stale: Vec<SessionEvent> = log
        .snapshot()
        .into_iter()
        .filter(|event| event.generation() == first_generation)
        .filter(|event| {
            matches!(
                event,
                SessionEvent::PagesRendered { pages, .. } if pages.iter().any(|&p| p >= 3)
            )
        })
        .collect();
    assert!(stale.is_empty(), "stale events leaked: {stale:?}");
    assert_eq!(controller.session().unwrap().page_count(), 2);
    assert!(controller.generation() > first_generation);
}
