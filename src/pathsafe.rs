//! Shared path-traversal guards.
//!
//! The teacher's `HlsManager::segment_path` rejected traversal with a name-shape
//! check (`starts_with`/`ends_with`/`contains("..")`); the cache root and the
//! library root both need a stronger guarantee (§4.5, §11.1: canonicalize and
//! verify ancestry), since cache keys and item ids are free-form strings that
//! may legitimately contain `/`.

use std::path::{Path, PathBuf};

/// Joins `root` with a `/`-separated relative path, rejecting any component
/// that would escape `root` (`..`, absolute components, empty components from
/// a leading `/` are all treated as relative fragments by stripping them first).
///
/// Returns `None` if the joined path does not canonicalize to a descendant of
/// `root`'s canonical form, or if `root` itself does not exist.
pub fn join_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut candidate = root.to_path_buf();
    for component in relative.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        if component == ".." {
            return None;
        }
        candidate.push(component);
    }
    Some(candidate)
}

/// Canonicalizes `candidate` and verifies it is `root` or a descendant of it.
/// `root` is canonicalized too, so this is robust to symlinks in either.
pub async fn canonical_descendant(root: &Path, candidate: &Path) -> Option<PathBuf> {
    let canonical_root = tokio::fs::canonicalize(root).await.ok()?;
    let canonical_candidate = tokio::fs::canonicalize(candidate).await.ok()?;
    if canonical_candidate.starts_with(&canonical_root) {
        Some(canonical_candidate)
    } else {
        None
    }
}
