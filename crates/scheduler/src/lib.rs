//! docpeek scheduler library
//!
//! Background work primitives for the preview engine.
//!
//! Rendering and recognition run in fixed-size batches: each batch is a set
//! of concurrent workers awaited as a unit, and batches run strictly one
//! after another. Every stream is tagged with the generation of the session
//! that started it, so results from a superseded document are dropped
//! instead of published.
//!
//! # Example
//!
//! ```
//! use docpeek_scheduler::{BatchRunner, GenerationCounter};
//!
//! let counter = GenerationCounter::new();
//! let token = counter.advance();
//!
//! let runner = BatchRunner::new("render");
//! let mut pages_done = 0;
//! let outcome = runner.run(
//!     vec![vec![3, 4, 5], vec![6, 7]],
//!     &token,
//!     |page: u32| page + 1,
//!     |report| pages_done += report.results.len(),
//! );
//!
//! assert_eq!(outcome.completed_batches, 2);
//! assert_eq!(pages_done, 5);
//! ```

mod batch;
mod generation;

// Re-export public API
pub use batch::{spawn_stream, BatchOutcome, BatchReport, BatchRunner, WorkerPanicked};
pub use generation::{GenerationCounter, GenerationToken};
