//! File filtering applied while the tree is enumerated.
//!
//! Both filters are off by default, in which case every regular file is
//! scanned. Ignore patterns use glob syntax and are matched against the path
//! relative to the scan root, with `/` separators on every platform.
use glob::Pattern;
use std::path::Path;

use crate::errors::{ScanError, ScanResult};

/// Checks if a file should be included based on its extension
pub fn has_valid_extension(path: &Path, extensions: &Option<Vec<String>>) -> bool {
    match extensions {
        None => true,
        Some(exts) => path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(ext))),
    }
}

/// Compiled extension and ignore filters
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    extensions: Option<Vec<String>>,
    ignore: Vec<Pattern>,
}

impl FileFilter {
    /// Compiles the ignore globs; an invalid glob is a configuration error
    pub fn new(extensions: Option<Vec<String>>, ignore_patterns: &[String]) -> ScanResult<Self> {
        let ignore = ignore_patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| ScanError::config_error(format!("invalid ignore pattern '{}': {}", p, e)))
            })
            .collect::<ScanResult<Vec<_>>>()?;

        let extensions = extensions.map(|exts| {
            exts.into_iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect()
        });

        Ok(Self { extensions, ignore })
    }

    /// Whether neither filter is configured
    pub fn is_empty(&self) -> bool {
        self.extensions.is_none() && self.ignore.is_empty()
    }

    /// Checks a path relative to the scan root against the ignore globs
    pub fn should_ignore(&self, relative: &Path) -> bool {
        if self.ignore.is_empty() {
            return false;
        }
        let normalized = relative.to_string_lossy().replace('\\', "/");
        self.ignore.iter().any(|p| p.matches(&normalized))
    }

    /// Determines if a file should be scanned
    pub fn should_include_file(&self, relative: &Path) -> bool {
        has_valid_extension(relative, &self.extensions) && !self.should_ignore(relative)
    }
}
