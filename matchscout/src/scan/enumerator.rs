use ignore::{Walk, WalkBuilder};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::coordinator::CancelToken;
use crate::filters::FileFilter;

/// Lazily walks a directory tree and yields regular-file paths.
///
/// The root sits at depth 0, so `max_depth = Some(1)` yields only the files
/// directly inside it. Hidden files and ignore files get no special treatment;
/// only the configured [`FileFilter`] narrows the set. A directory that cannot
/// be read is logged and skipped, and the walk carries on with its siblings.
///
/// Every yielded path bumps the shared discovered counter. Once an attached
/// [`CancelToken`] fires, the walk ends at the next entry, filtered or not.
pub struct PathEnumerator {
    root: PathBuf,
    walk: Walk,
    filter: FileFilter,
    discovered: Arc<AtomicU64>,
    cancel: Option<CancelToken>,
}

impl PathEnumerator {
    pub fn new(
        root: &Path,
        max_depth: Option<usize>,
        follow_links: bool,
        filter: FileFilter,
        discovered: Arc<AtomicU64>,
    ) -> Self {
        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .follow_links(follow_links)
            .max_depth(max_depth);

        debug!(
            "Enumerating {} (max depth: {:?}, follow links: {})",
            root.display(),
            max_depth,
            follow_links
        );

        Self {
            root: root.to_path_buf(),
            walk: builder.build(),
            filter,
            discovered,
            cancel: None,
        }
    }

    /// Stops the walk as soon as `cancel` fires
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Number of files yielded so far
    pub fn discovered(&self) -> u64 {
        self.discovered.load(Ordering::Relaxed)
    }
}

impl Iterator for PathEnumerator {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        for entry in self.walk.by_ref() {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                debug!("Enumeration of {} cancelled", self.root.display());
                return None;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.into_path();
            if !self.filter.is_empty() {
                let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                if !self.filter.should_include_file(relative) {
                    continue;
                }
            }

            self.discovered.fetch_add(1, Ordering::Relaxed);
            return Some(path);
        }
        None
    }
}
