//! Workspace file access and discovery
//!
//! [`FileSystem`] is the seam the indexer reads through, so tests can
//! substitute files that fail to read. [`resolve_workspace_files`] turns an
//! include/exclude glob pair into a sorted file list.
//!
//! Author: codevec contributors

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use codevec_core::{CodevecError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Read access to workspace files
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file as UTF-8 text
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String>;

    /// Last modification time, if known
    async fn modified(&self, path: &Path) -> Option<DateTime<Utc>>;
}

/// [`FileSystem`] backed by the local disk
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        metadata.modified().ok().map(DateTime::<Utc>::from)
    }
}

/// Characters escaped in the path component of a file URI
const PATH_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Canonical `file://` URI for a path, used as the document id
pub fn file_uri(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut raw = absolute.to_string_lossy().replace('\\', "/");
    if !raw.starts_with('/') {
        // Windows drive paths
        raw.insert(0, '/');
    }
    format!("file://{}", utf8_percent_encode(&raw, PATH_ESCAPE))
}

/// Split a comma-separated pattern list, keeping commas inside `{...}`
pub fn split_patterns(patterns: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in patterns.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                result.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    result.push(current);

    result
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn build_globset(patterns: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in split_patterns(patterns) {
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                CodevecError::ValidationError(format!("Invalid glob pattern '{pattern}': {e}"))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| CodevecError::ValidationError(format!("Invalid glob set: {e}")))
}

/// Find files under `root` matching `include` and not matching `exclude`.
///
/// Patterns are matched against paths relative to `root`. Excluded
/// directories are pruned rather than walked. Unreadable entries are skipped.
pub fn resolve_workspace_files(root: &Path, include: &str, exclude: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(CodevecError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("workspace root {} is not a directory", root.display()),
        )));
    }

    let include = build_globset(include)?;
    let exclude = build_globset(exclude)?;

    let excluded_dir = |relative: &Path| {
        // `**/dir/**` patterns only match paths below the directory
        exclude.is_match(relative) || exclude.is_match(relative.join("_"))
    };

    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    let entries = walker.filter_entry(|entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        entry
            .path()
            .strip_prefix(root)
            .map(|relative| !excluded_dir(relative))
            .unwrap_or(true)
    });

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable workspace entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if include.is_match(relative) && !exclude.is_match(relative) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    tracing::debug!(root = %root.display(), files = files.len(), "Resolved workspace files");
    Ok(files)
}
