//! Build error types.

use std::path::PathBuf;

use hoist_core::EngineError;
use thiserror::Error;

/// Any of these aborts the release before anything is published.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build context not found: {0}")]
    MissingContext(PathBuf),

    #[error("Dockerfile not found: {0}")]
    MissingDockerfile(PathBuf),

    #[error("static assets directory not found in build context: {0}")]
    MissingAssets(PathBuf),

    #[error("cannot determine source revision: {0}")]
    Revision(String),

    #[error("failed to read build context at {path}: {source}")]
    Context {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image build failed: {0}")]
    Engine(#[from] EngineError),

    #[error("built image {image} is missing label {label}")]
    MetadataMissing { image: String, label: &'static str },
}
