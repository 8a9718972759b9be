use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

use super::channel::ResultSender;
use super::coordinator::CancelToken;
use super::matcher::MatchTask;
use crate::errors::{ScanError, ScanResult};
use crate::results::FileOutcome;

/// Fixed-size pool of match workers.
///
/// Paths go in through a bounded queue, so a fast enumerator cannot run
/// arbitrarily far ahead of the workers. Each accepted path produces exactly
/// one outcome on the result channel; submission order says nothing about
/// completion order. After cancellation, queued paths are skipped, tasks
/// already running finish normally, and new submissions are refused.
///
/// [`shutdown`](Self::shutdown) returns only after every worker thread has
/// exited.
pub struct WorkerPool {
    queue: Option<Sender<PathBuf>>,
    dispatcher: Option<thread::JoinHandle<u64>>,
    live: Arc<LiveWorkers>,
    submitted: Arc<AtomicU64>,
    cancel: CancelToken,
    size: usize,
}

impl WorkerPool {
    /// Starts `size` workers that run `task` and deliver into `results`
    pub fn start(
        size: NonZeroUsize,
        queue_capacity: NonZeroUsize,
        task: MatchTask,
        results: ResultSender,
        cancel: CancelToken,
    ) -> ScanResult<Self> {
        let live = Arc::new(LiveWorkers::new(size.get()));
        let exited = live.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size.get())
            .thread_name(|i| format!("matchscout-worker-{}", i))
            .exit_handler(move |_| exited.exit())
            .build()
            .map_err(|e| ScanError::pool_startup(e.to_string()))?;

        let (queue, paths) = crossbeam_channel::bounded::<PathBuf>(queue_capacity.get());
        let worker_cancel = cancel.clone();

        let dispatcher = thread::Builder::new()
            .name("matchscout-dispatch".into())
            .spawn(move || {
                let resolved = pool.install(|| dispatch(paths, &task, &results, &worker_cancel));
                debug!("Dispatcher drained, {} tasks resolved", resolved);
                resolved
            })
            .map_err(|e| ScanError::pool_startup(e.to_string()))?;

        debug!("Worker pool started with {} threads", size);

        Ok(Self {
            queue: Some(queue),
            dispatcher: Some(dispatcher),
            live,
            submitted: Arc::new(AtomicU64::new(0)),
            cancel,
            size: size.get(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// A handle for submitting from another thread
    pub fn submitter(&self) -> ScanResult<Submitter> {
        let queue = self.queue.clone().ok_or(ScanError::PoolShutdown)?;
        Ok(Submitter {
            queue,
            submitted: self.submitted.clone(),
            cancel: self.cancel.clone(),
        })
    }

    /// Worker threads that have not exited yet
    pub fn live_workers(&self) -> usize {
        self.live.count()
    }

    /// Tasks accepted so far
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Closes the queue and waits for the workers to drain it.
    ///
    /// Returns once every outstanding [`Submitter`] is dropped, every
    /// accepted task has resolved, and every worker thread has exited.
    /// Idempotent; returns the resolved count.
    pub fn shutdown(&mut self) -> u64 {
        self.queue.take();
        let resolved = match self.dispatcher.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!("Worker pool dispatcher panicked");
                0
            }),
            None => return 0,
        };
        // The rayon pool was dropped with the dispatcher; its threads exit on their own.
        self.live.wait_all_exited();
        debug!(
            "Worker pool released: {} submitted, {} resolved",
            self.submitted(),
            resolved
        );
        resolved
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sending half of the pool's work queue
#[derive(Debug, Clone)]
pub struct Submitter {
    queue: Sender<PathBuf>,
    submitted: Arc<AtomicU64>,
    cancel: CancelToken,
}

impl Submitter {
    /// Queues one path, blocking while the queue is full.
    ///
    /// Fails with `PoolShutdown` once the scan is cancelled.
    pub fn submit(&self, path: PathBuf) -> ScanResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::PoolShutdown);
        }
        self.queue.send(path).map_err(|_| ScanError::PoolShutdown)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Worker threads still running, counted down by rayon's exit handler
#[derive(Debug)]
struct LiveWorkers {
    count: Mutex<usize>,
    exited: Condvar,
}

impl LiveWorkers {
    fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            exited: Condvar::new(),
        }
    }

    fn count(&self) -> usize {
        *self.count.lock()
    }

    fn exit(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        self.exited.notify_all();
    }

    fn wait_all_exited(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.exited.wait(&mut count);
        }
    }
}

/// Runs on the rayon pool until the queue is closed and drained.
fn dispatch(
    paths: Receiver<PathBuf>,
    task: &MatchTask,
    results: &ResultSender,
    cancel: &CancelToken,
) -> u64 {
    let resolved = AtomicU64::new(0);
    paths.into_iter().par_bridge().for_each(|path| {
        if cancel.is_cancelled() {
            return;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(&path)))
            .unwrap_or_else(|_| FileOutcome::failure(&path, "match task panicked"));
        resolved.fetch_add(1, Ordering::Relaxed);
        results.deliver(outcome);
    });
    resolved.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncodingMode;
    use crate::metrics::ReadMetrics;
    use crate::scan::channel::result_channel;
    use crate::scan::matcher::PatternMatcher;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;

    fn task(pattern: &str) -> MatchTask {
        MatchTask::new(
            PatternMatcher::new(pattern, EncodingMode::FailFast).unwrap(),
            ReadMetrics::new(),
        )
    }

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_every_submission_resolves_once() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..64 {
            let path = dir.path().join(format!("f{}.txt", i));
            fs::write(&path, "x ".repeat(i)).unwrap();
            paths.push(path);
        }

        let (tx, stream) = result_channel(nz(4));
        let mut pool = WorkerPool::start(nz(4), nz(8), task("x"), tx, CancelToken::new()).unwrap();
        assert_eq!(pool.size(), 4);

        let submitter = pool.submitter().unwrap();
        let feeder = thread::spawn(move || {
            for path in paths {
                submitter.submit(path).unwrap();
            }
        });

        let mut seen = HashSet::new();
        let mut total = 0;
        for outcome in stream.take(64) {
            total += outcome.matches().unwrap();
            assert!(seen.insert(outcome.path().to_path_buf()));
        }
        feeder.join().unwrap();

        assert_eq!(pool.submitted(), 64);
        assert_eq!(pool.shutdown(), 64);
        assert_eq!(pool.live_workers(), 0);
        assert_eq!(total, (0..64).sum::<u64>());
    }

    #[test]
    fn test_submit_refused_after_cancel() {
        let cancel = CancelToken::new();
        let (tx, _stream) = result_channel(nz(1));
        let mut pool = WorkerPool::start(nz(1), nz(1), task("x"), tx, cancel.clone()).unwrap();
        let submitter = pool.submitter().unwrap();

        cancel.cancel();
        assert!(matches!(
            submitter.submit(PathBuf::from("late.txt")),
            Err(ScanError::PoolShutdown)
        ));
        drop(submitter);
        assert_eq!(pool.shutdown(), 0);
        assert!(matches!(pool.submitter(), Err(ScanError::PoolShutdown)));
    }

    #[test]
    fn test_shutdown_waits_for_worker_threads() {
        let (tx, _stream) = result_channel(nz(1));
        let mut pool = WorkerPool::start(nz(3), nz(1), task("x"), tx, CancelToken::new()).unwrap();
        assert_eq!(pool.live_workers(), 3);

        pool.shutdown();
        assert_eq!(pool.live_workers(), 0);
        assert_eq!(pool.shutdown(), 0);
    }
}
