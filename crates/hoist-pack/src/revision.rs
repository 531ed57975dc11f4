//! Source revision resolution.
//!
//! A pinned revision (config or `HOIST_REVISION`, as CI systems provide)
//! wins. Otherwise the working tree's `HEAD` is used, suffixed with
//! `-dirty` when there are uncommitted changes.

use std::path::Path;

use hoist_core::{CommandRunner, Invocation, SourceRevision};
use tracing::{debug, warn};

use crate::error::BuildError;

pub fn resolve_revision<R: CommandRunner>(
    runner: &R,
    source_root: &Path,
    pinned: Option<&str>,
) -> Result<SourceRevision, BuildError> {
    if let Some(pinned) = pinned.map(str::trim).filter(|p| !p.is_empty()) {
        debug!(revision = pinned, "using pinned revision");
        return Ok(SourceRevision(pinned.to_string()));
    }

    let head = runner
        .run(
            Invocation::new("git")
                .args(["rev-parse", "HEAD"])
                .current_dir(source_root),
        )
        .map_err(|e| BuildError::Revision(e.to_string()))?;
    if !head.success() {
        return Err(BuildError::Revision(format!(
            "git rev-parse HEAD failed in {}: {}",
            source_root.display(),
            head.diagnostic()
        )));
    }
    let commit = head.stdout.trim().to_string();
    if commit.is_empty() {
        return Err(BuildError::Revision("git rev-parse HEAD printed nothing".to_string()));
    }

    let status = runner
        .run(
            Invocation::new("git")
                .args(["status", "--porcelain"])
                .current_dir(source_root),
        )
        .map_err(|e| BuildError::Revision(e.to_string()))?;
    if status.success() && !status.stdout.trim().is_empty() {
        warn!(revision = %commit, "working tree has uncommitted changes");
        return Ok(SourceRevision(format!("{commit}-dirty")));
    }

    Ok(SourceRevision(commit))
}
