//! Outcome and statistics types produced by a scan.
//!
//! A [`FileOutcome`] is produced exactly once per enumerated file. The
//! [`AggregateSnapshot`] is an immutable copy of the running statistics taken
//! after each outcome, and a [`ScanSummary`] is what
//! [`ScanCoordinator::wait`](crate::scan::ScanCoordinator::wait) hands back at
//! the end.
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ScanResult;
use crate::scan::ScanState;

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// The result of matching one file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileOutcome {
    /// The file was read and every non-overlapping match counted
    Success {
        path: PathBuf,
        matches: u64,
        /// Wall-clock time of the read and match
        #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
        elapsed: Duration,
    },
    /// The file could not be read or decoded
    Failure { path: PathBuf, message: String },
}

impl FileOutcome {
    pub fn success(path: impl Into<PathBuf>, matches: u64, elapsed: Duration) -> Self {
        Self::Success {
            path: path.into(),
            matches,
            elapsed,
        }
    }

    pub fn failure(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Failure {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Success { path, .. } | Self::Failure { path, .. } => path,
        }
    }

    /// Match count for a success, `None` for a failure
    pub fn matches(&self) -> Option<u64> {
        match self {
            Self::Success { matches, .. } => Some(*matches),
            Self::Failure { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Point-in-time copy of the running statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    /// Outcomes observed so far, failures included
    pub files_completed: u64,
    /// Successful outcomes with at least one match
    pub files_with_match: u64,
    /// Failure outcomes observed so far
    pub files_failed: u64,
    /// Sum of match counts over all successful outcomes
    pub total_matches: u64,
    /// Running mean of match counts over `files_with_match`; 0 when there is none
    pub mean_matches: f64,
    /// Number of files enumerated, once enumeration has finished
    pub total_files: Option<u64>,
}

impl AggregateSnapshot {
    /// Fraction of completed files with at least one match, in `0.0..=1.0`.
    ///
    /// Zero when no file has completed yet.
    pub fn match_ratio(&self) -> f64 {
        if self.files_completed == 0 {
            0.0
        } else {
            self.files_with_match as f64 / self.files_completed as f64
        }
    }

    /// [`match_ratio`](Self::match_ratio) as a percentage
    pub fn match_percentage(&self) -> f64 {
        self.match_ratio() * 100.0
    }

    /// The running mean, or `None` while no file has matched
    pub fn mean(&self) -> Option<f64> {
        (self.files_with_match > 0).then_some(self.mean_matches)
    }

    /// Whether every enumerated file has reported an outcome
    pub fn is_complete(&self) -> bool {
        self.total_files == Some(self.files_completed)
    }
}

/// Final report of a scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary {
    pub state: ScanState,
    pub snapshot: AggregateSnapshot,
    /// Files yielded by the enumerator, whether or not their outcome was observed
    pub files_discovered: u64,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl ScanSummary {
    pub fn to_json(&self) -> ScanResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
