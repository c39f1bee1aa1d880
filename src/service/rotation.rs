use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::error::CredtrackError;

/// Files named `<prefix>*<suffix>` directly inside a directory.
#[derive(Debug, Clone)]
pub struct FilePattern {
    prefix: String,
    suffix: String,
}

impl FilePattern {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|name| {
                name.len() >= self.prefix.len() + self.suffix.len()
                    && name.starts_with(&self.prefix)
                    && name.ends_with(&self.suffix)
            })
    }
}

/// Matching files, newest first by mtime (name breaks ties).
pub fn list_newest_first(dir: &Path, pattern: &FilePattern) -> Result<Vec<PathBuf>, CredtrackError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<(SystemTime, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!(error = %e, "failed to read directory entry");
                None
            }
        })
        .filter(|path| path.is_file() && pattern.matches(path))
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .collect();

    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Keep the `keep` most recent matching files and delete the rest.
/// Returns the deleted paths.
pub fn prune(dir: &Path, pattern: &FilePattern, keep: usize) -> Result<Vec<PathBuf>, CredtrackError> {
    let stale: Vec<PathBuf> = list_newest_first(dir, pattern)?
        .into_iter()
        .skip(keep)
        .collect();

    let mut removed = Vec::with_capacity(stale.len());
    for path in stale {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "rotated out");
                removed.push(path);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove rotated file"),
        }
    }
    Ok(removed)
}
