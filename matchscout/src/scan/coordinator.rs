use crossbeam_channel::{select, Receiver};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::aggregator::Aggregator;
use super::channel::{result_channel, ResultStream};
use super::enumerator::PathEnumerator;
use super::matcher::MatchTask;
use super::pool::WorkerPool;
use super::sink::ProgressSink;
use crate::config::{ScanConfig, ScanRequest};
use crate::errors::{ScanError, ScanResult};
use crate::metrics::ReadMetrics;
use crate::results::ScanSummary;

/// How often a blocked coordinator rechecks the cancel flag
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Lifecycle of a scan.
///
/// `Idle -> Enumerating -> Running -> Finished`, or `Cancelled` from any
/// started state. An empty tree goes straight from `Enumerating` to
/// `Finished`. Both end states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Idle,
    Enumerating,
    Running,
    Finished,
    Cancelled,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// Shared flag that stops a scan from being observed any further
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sent by the enumeration thread
#[derive(Debug)]
enum Discovery {
    FirstPath,
    Total(u64),
}

/// Runs one scan: enumeration, the worker pool, and aggregation.
///
/// A coordinator is good for a single scan. Outcomes are folded into the
/// statistics on one dedicated thread, which is also the only thread that
/// talks to the [`ProgressSink`] once the scan is running. Dropping the
/// coordinator cancels the scan and waits for its threads to exit.
///
/// ```rust,ignore
/// let sink = Arc::new(MemorySink::new());
/// let mut coordinator = ScanCoordinator::new(sink.clone());
/// coordinator.start(&ScanConfig::new("src", "TODO"))?;
/// let summary = coordinator.wait()?;
/// ```
pub struct ScanCoordinator {
    sink: Arc<dyn ProgressSink>,
    state: Arc<RwLock<ScanState>>,
    cancel: CancelToken,
    discovered: Arc<AtomicU64>,
    supervisor: Option<thread::JoinHandle<ScanSummary>>,
    summary: Option<ScanSummary>,
}

impl ScanCoordinator {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            state: Arc::new(RwLock::new(ScanState::Idle)),
            cancel: CancelToken::new(),
            discovered: Arc::new(AtomicU64::new(0)),
            supervisor: None,
            summary: None,
        }
    }

    /// Uses an externally owned cancel token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> ScanState {
        *self.state.read()
    }

    /// Files enumerated so far, available before the total is known
    pub fn files_discovered(&self) -> u64 {
        self.discovered.load(Ordering::Relaxed)
    }

    /// Stops observing the scan; in-flight outcomes are discarded
    pub fn cancel(&self) {
        if !self.state().is_terminal() {
            debug!("Cancellation requested");
        }
        self.cancel.cancel();
    }

    /// Validates `config` and starts scanning in the background.
    ///
    /// Input errors are reported to the sink and returned; the coordinator
    /// stays `Idle` and may be started again.
    pub fn start(&mut self, config: &ScanConfig) -> ScanResult<()> {
        if self.state() != ScanState::Idle {
            return Err(ScanError::AlreadyStarted);
        }
        let request = config.to_request().map_err(|e| {
            if e.is_input_error() {
                self.sink.on_input_error(&e.to_string());
            }
            e
        })?;
        self.start_request(request)
    }

    /// Starts scanning an already validated request
    pub fn start_request(&mut self, request: ScanRequest) -> ScanResult<()> {
        if self.state() != ScanState::Idle {
            return Err(ScanError::AlreadyStarted);
        }
        let started_at = Instant::now();
        info!(
            "Starting scan of {} with pattern: {}",
            request.root.display(),
            request.matcher.as_str()
        );

        let metrics = ReadMetrics::new();
        let (results_tx, results) = result_channel(request.channel_capacity);
        let task = MatchTask::new(request.matcher.clone(), metrics.clone());
        let pool = WorkerPool::start(
            request.thread_count,
            request.channel_capacity,
            task,
            results_tx,
            self.cancel.clone(),
        )?;
        let submitter = pool.submitter()?;
        let (discovery_tx, discovery_rx) = crossbeam_channel::unbounded();

        let discovered = self.discovered.clone();
        let enumeration_cancel = self.cancel.clone();
        let enumeration = thread::Builder::new()
            .name("matchscout-enumerator".into())
            .spawn(move || {
                let enumerator = PathEnumerator::new(
                    &request.root,
                    request.max_depth,
                    request.follow_links,
                    request.filter,
                    discovered,
                )
                .with_cancel(enumeration_cancel.clone());
                let mut submitted = 0u64;
                for path in enumerator {
                    if submitter.submit(path).is_err() {
                        debug!("Enumeration stopped after {} files", submitted);
                        return;
                    }
                    if submitted == 0 {
                        let _ = discovery_tx.send(Discovery::FirstPath);
                    }
                    submitted += 1;
                }
                if enumeration_cancel.is_cancelled() {
                    debug!("Enumeration cancelled after {} files", submitted);
                    return;
                }
                debug!("Enumeration complete: {} files", submitted);
                let _ = discovery_tx.send(Discovery::Total(submitted));
            })
            .map_err(|e| ScanError::pool_startup(e.to_string()))?;

        *self.state.write() = ScanState::Enumerating;
        self.sink.on_scan_started(true);

        let supervisor = Supervisor {
            sink: self.sink.clone(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            discovered: self.discovered.clone(),
            metrics,
            pool,
            results,
            discovery: discovery_rx,
            enumeration,
            started_at,
        };
        let handle = thread::Builder::new()
            .name("matchscout-coordinator".into())
            .spawn(move || supervisor.run())
            .map_err(|e| {
                self.cancel.cancel();
                *self.state.write() = ScanState::Cancelled;
                ScanError::pool_startup(e.to_string())
            })?;

        self.supervisor = Some(handle);
        Ok(())
    }

    /// Blocks until the scan finishes or is cancelled.
    ///
    /// Calling it again returns the same summary. A coordinator that was never
    /// started reports an empty `Idle` summary.
    pub fn wait(&mut self) -> ScanResult<ScanSummary> {
        if let Some(summary) = &self.summary {
            return Ok(summary.clone());
        }
        let summary = match self.supervisor.take() {
            Some(handle) => handle.join().map_err(|_| ScanError::ThreadPanicked)?,
            None => ScanSummary {
                state: self.state(),
                snapshot: Default::default(),
                files_discovered: self.files_discovered(),
                elapsed: Duration::ZERO,
            },
        };
        self.summary = Some(summary.clone());
        Ok(summary)
    }
}

impl Drop for ScanCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            self.cancel.cancel();
            let _ = handle.join();
        }
    }
}

/// Validates, runs, and waits for a scan in one call
pub fn run_scan(config: &ScanConfig, sink: Arc<dyn ProgressSink>) -> ScanResult<ScanSummary> {
    let mut coordinator = ScanCoordinator::new(sink);
    coordinator.start(config)?;
    coordinator.wait()
}

/// Everything the coordinator thread owns for the lifetime of a scan
struct Supervisor {
    sink: Arc<dyn ProgressSink>,
    state: Arc<RwLock<ScanState>>,
    cancel: CancelToken,
    discovered: Arc<AtomicU64>,
    metrics: ReadMetrics,
    // Dropped before the pool so blocked workers can exit.
    results: ResultStream,
    discovery: Receiver<Discovery>,
    pool: WorkerPool,
    enumeration: thread::JoinHandle<()>,
    started_at: Instant,
}

impl Supervisor {
    fn run(self) -> ScanSummary {
        let Supervisor {
            sink,
            state,
            cancel,
            discovered,
            metrics,
            mut pool,
            results,
            discovery,
            enumeration,
            started_at,
        } = self;

        let mut aggregator = Aggregator::new();
        let never = crossbeam_channel::never();
        let mut discovery_open = true;

        // Completion is checked on both the total and each outcome, since
        // either may be the last of the two to arrive.
        let final_state = loop {
            if cancel.is_cancelled() {
                break ScanState::Cancelled;
            }
            let discovery_rx = if discovery_open { &discovery } else { &never };

            select! {
                recv(discovery_rx) -> msg => match msg {
                    Ok(Discovery::FirstPath) => mark_running(&state),
                    Ok(Discovery::Total(total)) => {
                        sink.on_total_known(total);
                        aggregator.set_total(total);
                        if aggregator.is_complete() {
                            break ScanState::Finished;
                        }
                    }
                    Err(_) => discovery_open = false,
                },
                recv(results.receiver()) -> msg => match msg {
                    Ok(outcome) => {
                        if cancel.is_cancelled() {
                            break ScanState::Cancelled;
                        }
                        mark_running(&state);
                        aggregator.observe(&outcome, sink.as_ref());
                        if aggregator.is_complete() {
                            break ScanState::Finished;
                        }
                    }
                    Err(_) => {
                        error!("Result channel closed before every outcome was observed");
                        break ScanState::Cancelled;
                    }
                },
                default(CANCEL_POLL_INTERVAL) => {}
            }
        };

        *state.write() = final_state;

        // Unread outcomes go first so no worker stays blocked on delivery.
        drop(results);
        pool.shutdown();
        if enumeration.join().is_err() {
            error!("Enumeration thread panicked");
        }
        metrics.log_stats();

        let snapshot = aggregator.snapshot();
        if final_state == ScanState::Finished {
            info!(
                "Scan complete: {} files, {} with matches, {} failed",
                snapshot.files_completed, snapshot.files_with_match, snapshot.files_failed
            );
            sink.on_scan_finished();
        } else {
            info!(
                "Scan cancelled after {} of {} discovered files",
                snapshot.files_completed,
                discovered.load(Ordering::Relaxed)
            );
        }

        ScanSummary {
            state: final_state,
            snapshot,
            files_discovered: discovered.load(Ordering::Relaxed),
            elapsed: started_at.elapsed(),
        }
    }
}

fn mark_running(state: &RwLock<ScanState>) {
    let mut state = state.write();
    if *state == ScanState::Enumerating {
        *state = ScanState::Running;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::sink::{MemorySink, ScanEvent};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_state_machine_happy_path() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hit hit").unwrap();

        let sink = Arc::new(MemorySink::new());
        let mut coordinator = ScanCoordinator::new(sink.clone());
        assert_eq!(coordinator.state(), ScanState::Idle);

        coordinator.start(&ScanConfig::new(dir.path(), "hit")).unwrap();
        let summary = coordinator.wait().unwrap();

        assert_eq!(summary.state, ScanState::Finished);
        assert_eq!(coordinator.state(), ScanState::Finished);
        assert_eq!(summary.snapshot.files_completed, 1);
        assert_eq!(summary.files_discovered, 1);
        assert!(sink.is_finished());
        assert_eq!(coordinator.wait().unwrap(), summary);
    }

    #[test]
    fn test_invalid_input_stays_idle() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut coordinator = ScanCoordinator::new(sink.clone());

        let err = coordinator
            .start(&ScanConfig::new(dir.path(), "(unclosed"))
            .unwrap_err();
        assert!(err.is_input_error());
        assert_eq!(coordinator.state(), ScanState::Idle);
        assert!(matches!(
            sink.events().as_slice(),
            [ScanEvent::InputError(msg)] if msg.starts_with("Invalid pattern")
        ));

        coordinator.start(&ScanConfig::new(dir.path(), "ok")).unwrap();
        assert_eq!(coordinator.wait().unwrap().state, ScanState::Finished);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let dir = tempdir().unwrap();
        let mut coordinator = ScanCoordinator::new(Arc::new(MemorySink::new()));
        coordinator.start(&ScanConfig::new(dir.path(), "x")).unwrap();
        assert!(matches!(
            coordinator.start(&ScanConfig::new(dir.path(), "x")),
            Err(ScanError::AlreadyStarted)
        ));
        coordinator.wait().unwrap();
    }

    #[test]
    fn test_wait_without_start() {
        let mut coordinator = ScanCoordinator::new(Arc::new(MemorySink::new()));
        let summary = coordinator.wait().unwrap();
        assert_eq!(summary.state, ScanState::Idle);
        assert_eq!(summary.snapshot.files_completed, 0);
    }

    #[test]
    fn test_cancel_before_any_outcome() {
        let dir = tempdir().unwrap();
        for i in 0..50 {
            fs::write(dir.path().join(format!("{}.txt", i)), "x").unwrap();
        }
        let cancel = CancelToken::new();
        cancel.cancel();

        let sink = Arc::new(MemorySink::new());
        let mut coordinator = ScanCoordinator::new(sink.clone()).with_cancel_token(cancel);
        coordinator.start(&ScanConfig::new(dir.path(), "x")).unwrap();
        let summary = coordinator.wait().unwrap();

        assert_eq!(summary.state, ScanState::Cancelled);
        assert!(sink.outcomes().is_empty());
        assert!(!sink.is_finished());
    }

    #[test]
    fn test_cancel_does_not_wait_for_filtered_walk() {
        let dir = tempdir().unwrap();
        for i in 0..20 {
            let sub = dir.path().join(format!("d{}", i));
            fs::create_dir(&sub).unwrap();
            for j in 0..250 {
                fs::write(sub.join(format!("{}.txt", j)), "x").unwrap();
            }
        }
        let mut config = ScanConfig::new(dir.path(), "x");
        config.file_extensions = Some(vec!["rs".to_string()]);

        let sink = Arc::new(MemorySink::new());
        let mut full = ScanCoordinator::new(sink.clone());
        full.start(&config).unwrap();
        let full = full.wait().unwrap();
        assert_eq!(full.state, ScanState::Finished);

        let cancel = CancelToken::new();
        cancel.cancel();
        let sink = Arc::new(MemorySink::new());
        let mut coordinator = ScanCoordinator::new(sink.clone()).with_cancel_token(cancel);
        coordinator.start(&config).unwrap();
        let summary = coordinator.wait().unwrap();

        assert_eq!(summary.state, ScanState::Cancelled);
        assert!(!sink
            .events()
            .iter()
            .any(|e| matches!(e, ScanEvent::TotalKnown(_))));
        // The walk stops at its first entry instead of visiting all 5000.
        assert!(
            summary.elapsed < full.elapsed,
            "cancelled scan took {:?}, full walk {:?}",
            summary.elapsed,
            full.elapsed
        );
    }

    #[test]
    fn test_drop_cancels_and_joins() {
        let dir = tempdir().unwrap();
        for i in 0..20 {
            fs::write(dir.path().join(format!("{}.txt", i)), "x").unwrap();
        }
        let mut coordinator = ScanCoordinator::new(Arc::new(MemorySink::new()));
        coordinator.start(&ScanConfig::new(dir.path(), "x")).unwrap();
        let token = coordinator.cancel_token();
        drop(coordinator);
        assert!(token.is_cancelled());
    }
}
