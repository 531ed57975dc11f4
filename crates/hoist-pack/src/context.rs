//! Build-context digest.
//!
//! SHA-256 over every file's relative path and contents, in sorted order.
//! Two trees with the same files produce the same digest regardless of
//! where they are checked out or when they were modified.

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::BuildError;

/// Directories that never belong to the build context.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

fn skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// Compute the hex-encoded digest of the tree rooted at `root`.
pub fn context_digest(root: &Path) -> Result<String, BuildError> {
    let mut hasher = Sha256::new();
    let mut files = 0usize;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !skipped(e));

    for entry in walker {
        let entry = entry.map_err(|e| BuildError::Context {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = std::fs::read(entry.path()).map_err(|source| BuildError::Context {
            path: entry.path().to_path_buf(),
            source,
        })?;

        hasher.update(name.as_bytes());
        hasher.update([0]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
        files += 1;
    }

    let digest = hex::encode(hasher.finalize());
    debug!(files, %digest, "build context digested");
    Ok(digest)
}
