//! Generation tagging for session-scoped background work
//!
//! Background streams are never cancelled mid-batch. Instead every stream
//! carries a [`GenerationToken`] captured when its session started; when a
//! newer session begins, the shared counter moves on and every older token
//! reports itself stale. Workers check the token at batch boundaries and
//! drop their results instead of publishing them.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Monotonic session counter shared by a controller and all of its tokens.
///
/// # Example
///
/// ```
/// use docpeek_scheduler::GenerationCounter;
///
/// let counter = GenerationCounter::new();
/// let first = counter.advance();
/// assert!(first.is_current());
///
/// // Loading another document supersedes the first session.
/// let second = counter.advance();
/// assert!(first.is_stale());
/// assert!(second.is_current());
/// ```
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    /// Create a counter at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return its token.
    ///
    /// Every token handed out before this call becomes stale.
    pub fn advance(&self) -> GenerationToken {
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        GenerationToken { generation, current: self.current.clone() }
    }

    /// Get the generation that is currently live.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// Snapshot of a generation, checked by background work before publishing.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl GenerationToken {
    /// A token not tied to any counter; it stays current forever.
    ///
    /// Used by sessions driven directly, without a controller.
    pub fn detached() -> Self {
        GenerationCounter::new().advance()
    }

    /// Get the generation this token was issued for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Check if no newer generation has started.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }

    /// Check if a newer generation has superseded this one.
    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }
}
