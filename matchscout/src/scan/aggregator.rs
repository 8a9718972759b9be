use tracing::warn;

use super::sink::ProgressSink;
use crate::results::{AggregateSnapshot, FileOutcome};

/// Running statistics over the outcome stream.
///
/// Owned by exactly one thread; outcomes are folded in one at a time. The mean
/// of match counts over matching files is maintained incrementally
/// (`mean += (x - mean) / n`), so no sum of all prior counts is kept for it.
#[derive(Debug, Default)]
pub struct Aggregator {
    snapshot: AggregateSnapshot,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one outcome into the statistics and returns the new snapshot
    pub fn record(&mut self, outcome: &FileOutcome) -> AggregateSnapshot {
        let s = &mut self.snapshot;
        s.files_completed += 1;

        match outcome {
            FileOutcome::Success { matches, .. } => {
                s.total_matches += matches;
                if *matches > 0 {
                    s.files_with_match += 1;
                    s.mean_matches +=
                        (*matches as f64 - s.mean_matches) / s.files_with_match as f64;
                }
            }
            FileOutcome::Failure { .. } => s.files_failed += 1,
        }

        if let Some(total) = s.total_files {
            if s.files_completed > total {
                warn!(
                    "More outcomes ({}) than enumerated files ({})",
                    s.files_completed, total
                );
            }
        }
        *s
    }

    /// Records the enumerated total once enumeration has finished
    pub fn set_total(&mut self, total: u64) -> AggregateSnapshot {
        self.snapshot.total_files = Some(total);
        self.snapshot
    }

    /// Records `outcome` and forwards the display event and snapshot to `sink`
    pub fn observe(&mut self, outcome: &FileOutcome, sink: &dyn ProgressSink) -> AggregateSnapshot {
        let snapshot = self.record(outcome);
        sink.on_file_outcome(outcome);
        sink.on_aggregate_update(&snapshot);
        snapshot
    }

    pub fn snapshot(&self) -> AggregateSnapshot {
        self.snapshot
    }

    /// Whether the total is known and every file has reported
    pub fn is_complete(&self) -> bool {
        self.snapshot.is_complete()
    }
}
