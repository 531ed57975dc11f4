//! Rollout error types.

use std::path::PathBuf;

use hoist_core::{EngineError, ImageRef};
use hoist_registry::GatewayError;
use thiserror::Error;

use crate::phase::RolloutPhase;

/// Why a rollout ended in `Failed`.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("host state file missing: {0}")]
    MissingHostState(PathBuf),

    #[error(transparent)]
    Authentication(#[from] GatewayError),

    #[error("failed to pull {image}: {source}")]
    Pull {
        image: ImageRef,
        #[source]
        source: EngineError,
    },

    #[error("failed to stop the running instance: {0}")]
    Stop(#[source] EngineError),

    #[error("failed to start the new instance: {0}")]
    Start(#[source] EngineError),

    /// The controller was asked for a result before reaching `Healthy` or
    /// `Failed`.
    #[error("rollout stopped in phase {0} before finishing")]
    Incomplete(RolloutPhase),

    /// The new instance is not running after the settle delay.
    #[error("container {container} is not running after start: {detail}")]
    StartupVerification { container: String, detail: String },
}
