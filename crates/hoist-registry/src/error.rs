//! Registry error types.

use hoist_core::{EngineError, ExecError, ImageRef, TypeError};
use thiserror::Error;

/// Failures talking to the registry's control API.
#[derive(Debug, Error)]
pub enum RegistryApiError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("`{command}` failed (exit code: {code:?}): {detail}")]
    Failed {
        command: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("could not decode output of `{command}`: {detail}")]
    Decode { command: String, detail: String },

    #[error(transparent)]
    Invalid(#[from] TypeError),
}

/// Registry Gateway failures. All are fatal for the calling pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Could not resolve identity, fetch a login token, or hand it to the engine.
    #[error("authentication failed while {action}: {source}")]
    Authentication {
        action: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to list repositories in {region}: {source}")]
    RepositoryLookup {
        region: String,
        #[source]
        source: RegistryApiError,
    },

    /// The create call itself failed. Not retried: this is almost always a
    /// permissions or naming problem.
    #[error("failed to provision repository {repository}: {source}")]
    RepositoryProvision {
        repository: String,
        #[source]
        source: RegistryApiError,
    },

    #[error("registry created {actual}, expected {expected}")]
    RepositoryMismatch { expected: String, actual: String },
}

impl GatewayError {
    pub(crate) fn auth(
        action: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        GatewayError::Authentication {
            action,
            source: Box::new(source),
        }
    }
}

/// Tag Publisher failures.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Nothing new was published under the requested tag.
    #[error("failed to publish {image}: {source}")]
    Failed {
        image: ImageRef,
        #[source]
        source: EngineError,
    },

    /// Partial success: `published` is correct, but `latest` still points at
    /// the previous artifact. Only the `latest` rebind needs retrying.
    #[error("published {published} but `latest` is stale ({latest} not updated): {source}")]
    LatestTagStale {
        published: ImageRef,
        latest: ImageRef,
        #[source]
        source: EngineError,
    },

    /// The image a rebind should point `latest` at could not be fetched.
    #[error("cannot rebind latest: failed to fetch {image}: {source}")]
    SourceUnavailable {
        image: ImageRef,
        #[source]
        source: EngineError,
    },
}
