use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::scan::matcher::{LARGE_FILE_THRESHOLD, SMALL_FILE_THRESHOLD};

/// Counts how files were read during a scan.
///
/// Clones share the same counters, so every worker can record into one set.
#[derive(Debug, Clone, Default)]
pub struct ReadMetrics {
    bytes_read: Arc<AtomicU64>,
    small_files: Arc<AtomicU64>,
    buffered_files: Arc<AtomicU64>,
    mmap_files: Arc<AtomicU64>,
}

/// Read strategy chosen for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    Whole,
    Buffered,
    Mapped,
}

impl ReadStrategy {
    /// Chooses a strategy from the file size
    pub fn for_size(size: u64) -> Self {
        if size < SMALL_FILE_THRESHOLD {
            Self::Whole
        } else if size >= LARGE_FILE_THRESHOLD {
            Self::Mapped
        } else {
            Self::Buffered
        }
    }
}

impl ReadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one file read with the given strategy
    pub fn record_read(&self, strategy: ReadStrategy, bytes: u64) {
        let counter = match strategy {
            ReadStrategy::Whole => &self.small_files,
            ReadStrategy::Buffered => &self.buffered_files,
            ReadStrategy::Mapped => &self.mmap_files,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let total = self.bytes_read.fetch_add(bytes, Ordering::Relaxed) + bytes;
        debug!("Read {} bytes via {:?}, total: {} bytes", bytes, strategy, total);
    }

    pub fn get_stats(&self) -> ReadStats {
        ReadStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            small_files: self.small_files.load(Ordering::Relaxed),
            buffered_files: self.buffered_files.load(Ordering::Relaxed),
            mmap_files: self.mmap_files.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Read stats: {} bytes, files (small/buffered/mmap): {}/{}/{}",
            stats.bytes_read, stats.small_files, stats.buffered_files, stats.mmap_files
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    pub bytes_read: u64,
    pub small_files: u64,
    pub buffered_files: u64,
    pub mmap_files: u64,
}
