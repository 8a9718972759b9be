use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{ScanError, ScanResult};
use crate::filters::FileFilter;
use crate::scan::matcher::PatternMatcher;

/// Default bound on completed-but-unread outcomes in the result channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// How file contents that are not valid UTF-8 are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Invalid UTF-8 produces a failure outcome for that file.
    #[default]
    FailFast,
    /// Invalid sequences are replaced with U+FFFD and matching continues.
    Lossy,
}

/// Configuration for a scan.
///
/// # Configuration Locations
///
/// Loaded from, in order of increasing precedence:
/// 1. Global `$CONFIG_DIR/matchscout/config.yaml`
/// 2. Local `.matchscout.yaml` in the current directory
/// 3. A file passed via `--config`
///
/// # Configuration Format
///
/// ```yaml
/// pattern: "TODO|FIXME"
/// root_path: "src"
/// max_depth: 3
/// file_extensions: ["rs", "toml"]
/// ignore_patterns: ["target/**"]
/// thread_count: 4
/// channel_capacity: 256
/// encoding_mode: lossy
/// log_level: "info"
/// ```
///
/// Command-line values take precedence, see [`ScanConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory the scan starts from
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Regular expression applied to every file
    #[serde(default)]
    pub pattern: String,

    /// Maximum recursion depth; `None` walks the whole tree.
    /// Depth 1 covers the direct children of the root.
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Optional list of file extensions to include (e.g., ["rs", "toml"])
    #[serde(default)]
    pub file_extensions: Option<Vec<String>>,

    /// Glob patterns excluded from enumeration
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links while walking.
    ///
    /// Off by default, so symlinked files and directories are not scanned
    /// and do not count toward the total. When on, dangling links and link
    /// cycles are skipped like any other unreadable entry.
    #[serde(default)]
    pub follow_links: bool,

    /// Number of worker threads
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Maximum number of completed outcomes buffered ahead of the consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: NonZeroUsize,

    /// Treatment of invalid UTF-8
    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_channel_capacity() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_CHANNEL_CAPACITY).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            pattern: String::new(),
            max_depth: None,
            file_extensions: None,
            ignore_patterns: Vec::new(),
            follow_links: false,
            thread_count: default_thread_count(),
            channel_capacity: default_channel_capacity(),
            encoding_mode: EncodingMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl ScanConfig {
    /// Creates a configuration for `pattern` under `root_path` with defaults elsewhere
    pub fn new(root_path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> ScanResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration, layering an explicit file on top of the default locations
    pub fn load_from(config_path: Option<&Path>) -> ScanResult<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ScanError::config_error(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let config_files = [
            dirs::config_dir().map(|p| p.join("matchscout/config.yaml")),
            Some(PathBuf::from(".matchscout.yaml")),
            config_path.map(PathBuf::from),
        ];

        let mut builder = ConfigBuilder::builder();
        for path in config_files.iter().flatten() {
            if path.exists() {
                debug!("Loading config from {}", path.display());
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        builder
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| ScanError::config_error(e.to_string()))
    }

    /// Merges CLI arguments with configuration file values.
    ///
    /// A CLI value wins whenever it differs from the built-in default, so a
    /// value equal to the default cannot override the file. Callers that
    /// track whether a value was given explicitly should assign it after
    /// merging.
    pub fn merge_with_cli(mut self, cli: ScanConfig) -> Self {
        let defaults = ScanConfig::default();
        if cli.root_path != defaults.root_path {
            self.root_path = cli.root_path;
        }
        if !cli.pattern.is_empty() {
            self.pattern = cli.pattern;
        }
        if cli.max_depth.is_some() {
            self.max_depth = cli.max_depth;
        }
        if cli.file_extensions.is_some() {
            self.file_extensions = cli.file_extensions;
        }
        if !cli.ignore_patterns.is_empty() {
            self.ignore_patterns = cli.ignore_patterns;
        }
        if cli.follow_links {
            self.follow_links = true;
        }
        if cli.thread_count != defaults.thread_count {
            self.thread_count = cli.thread_count;
        }
        if cli.channel_capacity != defaults.channel_capacity {
            self.channel_capacity = cli.channel_capacity;
        }
        if cli.encoding_mode != defaults.encoding_mode {
            self.encoding_mode = cli.encoding_mode;
        }
        if cli.log_level != defaults.log_level {
            self.log_level = cli.log_level;
        }
        self
    }

    /// Validates the configuration and compiles the pattern.
    ///
    /// Nothing is spawned here; every error returned rejects the request.
    pub fn to_request(&self) -> ScanResult<ScanRequest> {
        if self.root_path.as_os_str().is_empty() {
            return Err(ScanError::EmptyRoot);
        }
        if self.pattern.is_empty() {
            return Err(ScanError::EmptyPattern);
        }
        if !self.root_path.exists() {
            return Err(ScanError::root_not_found(&self.root_path));
        }
        if !self.root_path.is_dir() {
            return Err(ScanError::not_a_directory(&self.root_path));
        }
        let matcher = PatternMatcher::new(&self.pattern, self.encoding_mode)?;
        let filter = FileFilter::new(self.file_extensions.clone(), &self.ignore_patterns)?;

        Ok(ScanRequest {
            root: self.root_path.clone(),
            matcher,
            max_depth: self.max_depth,
            filter,
            follow_links: self.follow_links,
            thread_count: self.thread_count,
            channel_capacity: self.channel_capacity,
        })
    }
}

/// A validated scan request. Immutable once the scan starts.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub root: PathBuf,
    pub matcher: PatternMatcher,
    pub max_depth: Option<usize>,
    pub filter: FileFilter,
    pub follow_links: bool,
    pub thread_count: NonZeroUsize,
    pub channel_capacity: NonZeroUsize,
}

/// Parses a depth typed by a user.
///
/// Empty input and anything that is not a non-negative integer are rejected.
pub fn parse_max_depth(text: &str) -> ScanResult<usize> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ScanError::invalid_depth(
            "Max depth should be default or non empty",
        ));
    }
    text.parse::<usize>()
        .map_err(|_| ScanError::invalid_depth("Depth is not a number"))
}
