use memmap2::Mmap;
use regex::Regex;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{trace, warn};

use crate::config::EncodingMode;
use crate::errors::{ScanError, ScanResult};
use crate::metrics::{ReadMetrics, ReadStrategy};
use crate::results::FileOutcome;

const BUFFER_CAPACITY: usize = 65536;
pub(crate) const SMALL_FILE_THRESHOLD: u64 = 32 * 1024; // 32KB
pub(crate) const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// A compiled pattern, shared read-only by every worker
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Arc<Regex>,
    encoding_mode: EncodingMode,
}

impl PatternMatcher {
    /// Compiles `pattern`; a syntax error is reported as `InvalidPattern`
    pub fn new(pattern: &str, encoding_mode: EncodingMode) -> ScanResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| ScanError::invalid_pattern(e.to_string()))?;
        Ok(Self {
            regex: Arc::new(regex),
            encoding_mode,
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn encoding_mode(&self) -> EncodingMode {
        self.encoding_mode
    }

    /// Counts non-overlapping matches in `text`
    pub fn count_matches(&self, text: &str) -> u64 {
        self.regex.find_iter(text).count() as u64
    }

    /// Decodes `bytes` according to the encoding mode and counts matches
    fn count_in_bytes(&self, bytes: &[u8], path: &Path) -> ScanResult<u64> {
        match self.encoding_mode {
            EncodingMode::FailFast => {
                let text =
                    std::str::from_utf8(bytes).map_err(|e| ScanError::encoding_error(path, e))?;
                Ok(self.count_matches(text))
            }
            EncodingMode::Lossy => {
                let text = String::from_utf8_lossy(bytes);
                if let Cow::Owned(_) = text {
                    warn!("Invalid UTF-8 replaced in file: {}", path.display());
                }
                Ok(self.count_matches(&text))
            }
        }
    }
}

/// The unit of concurrent work: one file, one outcome.
///
/// Holds no state shared with other tasks apart from the read-only pattern
/// and the read counters.
#[derive(Debug, Clone)]
pub struct MatchTask {
    matcher: PatternMatcher,
    metrics: ReadMetrics,
}

impl MatchTask {
    pub fn new(matcher: PatternMatcher, metrics: ReadMetrics) -> Self {
        Self { matcher, metrics }
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Reads `path`, counts matches, and times both.
    ///
    /// Never fails: any error becomes a [`FileOutcome::Failure`].
    pub fn run(&self, path: &Path) -> FileOutcome {
        let start = Instant::now();
        match self.count_in_file(path) {
            Ok(matches) => {
                let elapsed = start.elapsed();
                trace!("{}: {} matches in {:?}", path.display(), matches, elapsed);
                FileOutcome::success(path, matches, elapsed)
            }
            Err(e) => {
                trace!("{}: {}", path.display(), e);
                FileOutcome::failure(path, e.to_string())
            }
        }
    }

    fn count_in_file(&self, path: &Path) -> ScanResult<u64> {
        let file = File::open(path).map_err(|e| ScanError::from_io(path, e))?;
        let size = file.metadata()?.len();
        let strategy = ReadStrategy::for_size(size);

        let matches = match strategy {
            ReadStrategy::Whole => {
                let mut bytes = Vec::with_capacity(size as usize);
                (&file).read_to_end(&mut bytes)?;
                self.matcher.count_in_bytes(&bytes, path)?
            }
            ReadStrategy::Buffered => {
                let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
                let mut bytes = Vec::with_capacity(size as usize);
                reader.read_to_end(&mut bytes)?;
                self.matcher.count_in_bytes(&bytes, path)?
            }
            ReadStrategy::Mapped => {
                // SAFETY: the map is read-only and dropped before this call returns.
                // A concurrent truncation by another process is the usual mmap hazard.
                let mmap = unsafe { Mmap::map(&file) }?;
                self.matcher.count_in_bytes(&mmap, path)?
            }
        };

        self.metrics.record_read(strategy, size);
        Ok(matches)
    }
}
