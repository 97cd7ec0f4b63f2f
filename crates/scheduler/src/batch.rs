//! Bounded batch execution.
//!
//! A batch is a fixed group of items processed concurrently, one scoped
//! thread per item, and awaited as a unit before the next batch starts.
//! Parallelism is therefore bounded by the batch size, and results are
//! published in batch order.

use crate::GenerationToken;
use std::any::Any;
use std::fmt::Debug;
use std::io;
use std::thread::{self, JoinHandle};

/// A worker thread panicked before producing its result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("worker panicked: {message}")]
pub struct WorkerPanicked {
    /// Panic payload, when it was a string.
    pub message: String,
}

/// Results of one completed batch, in item order.
#[derive(Debug)]
pub struct BatchReport<T, R> {
    /// Zero-based batch number within the run.
    pub index: usize,
    pub results: Vec<(T, Result<R, WorkerPanicked>)>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// Number of batches whose results were published.
    pub completed_batches: usize,
    /// `true` when the generation went stale before the run finished.
    pub superseded: bool,
}

/// Runs pre-planned batches one after another.
///
/// # Example
///
/// ```
/// use docpeek_scheduler::{BatchRunner, GenerationToken};
///
/// let runner = BatchRunner::new("square");
/// let token = GenerationToken::detached();
/// let mut seen = Vec::new();
///
/// let outcome = runner.run(vec![vec![1, 2, 3], vec![4]], &token, |n: u32| n * n, |report| {
///     for (item, result) in report.results {
///         seen.push((item, result.unwrap()));
///     }
/// });
///
/// assert_eq!(outcome.completed_batches, 2);
/// assert_eq!(seen, vec![(1, 1), (2, 4), (3, 9), (4, 16)]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    label: &'static str,
}

impl BatchRunner {
    /// Create a runner; `label` names its threads and log lines.
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }

    /// Get the runner label.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Process `batches` in order.
    ///
    /// The token is checked before each batch starts and again before its
    /// results are published; once stale, the run stops and the pending
    /// results are dropped without calling `after_batch`.
    pub fn run<T, R, W, A>(
        &self,
        batches: Vec<Vec<T>>,
        token: &GenerationToken,
        work: W,
        mut after_batch: A,
    ) -> BatchOutcome
    where
        T: Copy + Debug + Send + Sync,
        R: Send,
        W: Fn(T) -> R + Sync,
        A: FnMut(BatchReport<T, R>),
    {
        let mut outcome = BatchOutcome::default();

        for (index, batch) in batches.into_iter().enumerate() {
            if token.is_stale() {
                outcome.superseded = true;
                break;
            }

            log::debug!("{} batch {index}: starting {:?}", self.label, batch);
            let results = self.run_one(&batch, &work);

            if token.is_stale() {
                log::debug!(
                    "{} batch {index}: generation superseded, dropping results",
                    self.label
                );
                outcome.superseded = true;
                break;
            }

            after_batch(BatchReport { index, results });
            outcome.completed_batches += 1;
        }

        outcome
    }

    fn run_one<T, R, W>(&self, batch: &[T], work: &W) -> Vec<(T, Result<R, WorkerPanicked>)>
    where
        T: Copy + Debug + Send + Sync,
        R: Send,
        W: Fn(T) -> R + Sync,
    {
        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|&item| {
                    let handle = thread::Builder::new()
                        .name(format!("{}-worker", self.label))
                        .spawn_scoped(scope, move || work(item));
                    (item, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(item, handle)| {
                    let result = match handle {
                        Ok(handle) => handle.join().map_err(|payload| panic_message(&*payload)),
                        Err(err) => Err(WorkerPanicked { message: format!("spawn failed: {err}") }),
                    };
                    if let Err(err) = &result {
                        log::error!("{} worker for {item:?} failed: {}", self.label, err.message);
                    }
                    (item, result)
                })
                .collect()
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> WorkerPanicked {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_owned());
    WorkerPanicked { message }
}

/// Spawn a named, detached background stream.
pub fn spawn_stream<F>(name: String, body: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name).spawn(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenerationCounter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_batches_publish_in_order() {
        let runner = BatchRunner::new("test");
        let token = GenerationToken::detached();
        let mut published = Vec::new();

        let outcome = runner.run(
            vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]],
            &token,
            |n: u32| {
                // Later items finish first inside a batch.
                thread::sleep(Duration::from_millis(u64::from(10 - n)));
                n
            },
            |report| published.push((report.index, report.results.len())),
        );

        assert_eq!(outcome, BatchOutcome { completed_batches: 3, superseded: false });
        assert_eq!(published, vec![(0, 3), (1, 3), (2, 1)]);
    }

    #[test]
    fn test_results_keep_item_order() {
        let runner = BatchRunner::new("test");
        let token = GenerationToken::detached();
        let mut items = Vec::new();

        runner.run(
            vec![vec![5, 1, 3]],
            &token,
            |n: u32| n * 10,
            |report| items.extend(report.results.into_iter().map(|(n, r)| (n, r.unwrap()))),
        );

        assert_eq!(items, vec![(5, 50), (1, 10), (3, 30)]);
    }

    #[test]
    fn test_batch_concurrency_is_bounded() {
        let runner = BatchRunner::new("test");
        let token = GenerationToken::detached();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        runner.run(
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]],
            &token,
            |_: u32| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                active.fetch_sub(1, Ordering::SeqCst);
            },
            |_| {},
        );

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stale_generation_stops_run() {
        let runner = BatchRunner::new("test");
        let counter = GenerationCounter::new();
        let token = counter.advance();
        let processed = Mutex::new(Vec::new());
        let mut published = 0;

        let outcome = runner.run(
            vec![vec![0], vec![1], vec![2]],
            &token,
            |n: u32| {
                processed.lock().unwrap().push(n);
                if n == 1 {
                    counter.advance();
                }
            },
            |_| published += 1,
        );

        assert_eq!(outcome, BatchOutcome { completed_batches: 1, superseded: true });
        assert_eq!(published, 1);
        assert_eq!(*processed.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_panicking_worker_is_isolated() {
        let runner = BatchRunner::new("test");
        let token = GenerationToken::detached();
        let mut results = Vec::new();

        runner.run(
            vec![vec![0, 1, 2]],
            &token,
            |n: u32| {
                if n == 1 {
                    panic!("page {n} exploded");
                }
                n
            },
            |report| results.extend(report.results),
        );

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].1, Ok(0));
        assert_eq!(results[1].1, Err(WorkerPanicked { message: "page 1 exploded".to_owned() }));
        assert_eq!(results[2].1, Ok(2));
    }

    #[test]
    fn test_empty_plan_completes_immediately() {
        let runner = BatchRunner::new("test");
        let token = GenerationToken::detached();

        let outcome = runner.run(Vec::<Vec<u32>>::new(), &token, |n| n, |_| {});

        assert_eq!(outcome, BatchOutcome::default());
    }

    #[test]
    fn test_spawn_stream_runs_body() {
        let handle = spawn_stream("stream-test".to_owned(), || {
            assert_eq!(thread::current().name(), Some("stream-test"));
        })
        .unwrap();

        handle.join().unwrap();
    }
}
