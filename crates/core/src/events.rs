//! Session events and the stale-generation filter in front of observers.

use crate::session::SessionPhase;
use docpeek_scheduler::GenerationToken;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Notification published by a preview session.
///
/// Page indices are zero-based. Every event carries the generation of the
/// session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged { generation: u64, phase: SessionPhase },
    PagesRendered { generation: u64, pages: Vec<u32> },
    PageRenderFailed { generation: u64, page: u32, reason: String },
    TextBatchExtracted { generation: u64, pages: Vec<u32> },
    ExtractionFinished { generation: u64, pages: u32 },
    ExtractionFailed { generation: u64, reason: String },
}

impl SessionEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::PhaseChanged { generation, .. }
            | Self::PagesRendered { generation, .. }
            | Self::PageRenderFailed { generation, .. }
            | Self::TextBatchExtracted { generation, .. }
            | Self::ExtractionFinished { generation, .. }
            | Self::ExtractionFailed { generation, .. } => *generation,
        }
    }
}

pub type EventCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Delivers events for one session, dropping them once a newer session
/// has started.
#[derive(Clone)]
pub struct EventSink {
    callback: Option<EventCallback>,
    token: GenerationToken,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.token.generation())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl EventSink {
    pub fn new(callback: Option<EventCallback>, token: GenerationToken) -> Self {
        Self { callback, token }
    }

    /// A sink with no observer, never superseded.
    pub fn detached() -> Self {
        Self::new(None, GenerationToken::detached())
    }

    pub fn generation(&self) -> u64 {
        self.token.generation()
    }

    pub fn token(&self) -> &GenerationToken {
        &self.token
    }

    /// Returns `false` when the event was dropped as stale.
    pub fn emit(&self, event: SessionEvent) -> bool {
        if self.token.is_stale() {
            log::warn!(
                "dropping event from superseded generation {}: {event:?}",
                self.generation()
            );
            return false;
        }
        if let Some(callback) = &self.callback {
            callback(&event);
        }
        true
    }
}

/// Collects events in arrival order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> EventCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |event: &SessionEvent| {
            if let Ok(mut events) = events.lock() {
                events.push(event.clone());
            }
        })
    }

    pub fn snapshot(&self) -> Vec<SessionEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Pages from every `PagesRendered` event, in publication order.
    pub fn rendered_pages(&self) -> Vec<u32> {
        self.snapshot()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::PagesRendered { pages, .. } => Some(pages),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Page lists of every `TextBatchExtracted` event.
    pub fn text_batches(&self) -> Vec<Vec<u32>> {
        self.snapshot()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::TextBatchExtracted { pages, .. } => Some(pages),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpeek_scheduler::GenerationCounter;

    #[test]
    fn test_emit_reaches_callback() {
        let log = EventLog::new();
        let sink = EventSink::new(Some(log.callback()), GenerationToken::detached());

        assert!(sink.emit(SessionEvent::PagesRendered { generation: 1, pages: vec![0, 1, 2] }));
        assert_eq!(log.rendered_pages(), vec![0, 1, 2]);
    }

    #[test]
    fn test_stale_events_are_dropped() {
        let counter = GenerationCounter::new();
        let log = EventLog::new();
        let sink = EventSink::new(Some(log.callback()), counter.advance());

        counter.advance();

        assert!(!sink.emit(SessionEvent::PagesRendered { generation: 1, pages: vec![3] }));
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_sink_without_callback() {
        let sink = EventSink::detached();
        assert!(sink.emit(SessionEvent::ExtractionFinished { generation: 1, pages: 0 }));
    }

    #[test]
    fn test_event_generation() {
        let event = SessionEvent::TextBatchExtracted { generation: 7, pages: vec![0] };
        assert_eq!(event.generation(), 7);
    }
}
