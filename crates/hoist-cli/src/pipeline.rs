//! Release driver: composes the components into the two pipelines.
//!
//! Build-time: Registry Gateway → Artifact Builder → Tag Publisher.
//! Host-time: Registry Gateway → Deployment Controller.
//!
//! Each pipeline records a [`Progress`] trace and stops at the first failing
//! step. Nothing here talks to a real process; the commands wire in the
//! production adapters.

use std::fmt;
use std::path::Path;

use hoist_core::config::Settings;
use hoist_core::{
    Artifact, CommandRunner, ContainerEngine, Progress, RepositoryRef, Step, Tag,
};
use hoist_pack::{ArtifactBuilder, BuildError};
use hoist_registry::{
    GatewayError, Publication, PublishError, RegistryApi, RegistryGateway, TagPublisher, Tenant,
};
use hoist_rollout::{RolloutController, RolloutError, RolloutFailure, RolloutPlan, RolloutReport};
use thiserror::Error;

/// The component error behind a failed step.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Rollout(#[from] RolloutError),
}

/// A pipeline that stopped early, with the trace up to the failure.
#[derive(Debug, Error)]
#[error("{pipeline} failed at {}: {source}", StepName(.step))]
pub struct PipelineError {
    pub pipeline: &'static str,
    pub step: Option<Step>,
    #[source]
    pub source: StageError,
    pub progress: Progress,
    /// Output of the service at the time of failure (rollout only).
    pub log_tail: Option<String>,
}

struct StepName<'a>(&'a Option<Step>);

impl fmt::Display for StepName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(step) => write!(f, "{step}"),
            None => f.write_str("preflight"),
        }
    }
}

impl PipelineError {
    fn at(mut progress: Progress, step: Step, source: impl Into<StageError>) -> Self {
        let source = source.into();
        progress.failed(step, source.to_string());
        Self {
            pipeline: progress.pipeline(),
            step: Some(step),
            source,
            progress,
            log_tail: None,
        }
    }

    /// `latest` is stale but the requested tag is published: only the
    /// rebind needs repeating.
    pub fn is_latest_stale(&self) -> bool {
        matches!(
            self.source,
            StageError::Publish(PublishError::LatestTagStale { .. })
        )
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_latest_stale() { 3 } else { 1 }
    }
}

impl From<RolloutFailure> for PipelineError {
    fn from(failure: RolloutFailure) -> Self {
        Self {
            pipeline: failure.progress.pipeline(),
            step: failure.progress.failed_step(),
            source: StageError::Rollout(failure.error),
            progress: failure.progress,
            log_tail: failure.log_tail,
        }
    }
}

#[derive(Debug)]
pub struct ReleaseOutcome {
    pub repository: RepositoryRef,
    pub artifact: Artifact,
    pub publication: Publication,
    pub progress: Progress,
}

/// Build-time pipeline: provision, authenticate, build, publish.
pub fn release<A, E, R>(
    api: &A,
    engine: &E,
    runner: &R,
    settings: &Settings,
    source_root: &Path,
    tag: Option<&Tag>,
) -> Result<ReleaseOutcome, PipelineError>
where
    A: RegistryApi,
    E: ContainerEngine,
    R: CommandRunner,
{
    let mut progress = Progress::new("release");
    let gateway = RegistryGateway::new(api, engine, &settings.registry.domain);
    let region = &settings.registry.region;
    let name = &settings.registry.repository;

    let repository = match gateway.ensure_repository(&Tenant::Caller, region, name) {
        Ok(repository) => repository,
        Err(e) => return Err(PipelineError::at(progress, Step::Provision, e)),
    };
    progress.ok(Step::Provision, repository.uri.clone());

    let credentials = match gateway.authenticate(&Tenant::Caller, region) {
        Ok(credentials) => credentials,
        Err(e) => return Err(PipelineError::at(progress, Step::Authenticate, e)),
    };
    progress.ok(
        Step::Authenticate,
        format!("logged in to {}", credentials.registry_host),
    );

    let builder = ArtifactBuilder::new(engine, runner, &settings.build, name);
    let artifact = match builder.build(source_root) {
        Ok(artifact) => artifact,
        Err(e) => return Err(PipelineError::at(progress, Step::Build, e)),
    };
    progress.ok(
        Step::Build,
        format!("{} at {} ({})", artifact.local_ref, artifact.revision.short(), artifact.id),
    );

    let requested = tag.unwrap_or(&settings.publish.default_tag);
    let publisher = TagPublisher::new(engine);
    match publisher.publish(&artifact, &repository, Some(requested)) {
        Ok(publication) => {
            progress.ok(
                Step::Publish,
                format!("{} ({})", publication.requested, requested.kind().describe()),
            );
            progress.ok(Step::PublishLatest, publication.latest.to_string());
            Ok(ReleaseOutcome {
                repository,
                artifact,
                publication,
                progress,
            })
        }
        Err(e @ PublishError::LatestTagStale { .. }) => {
            if let PublishError::LatestTagStale { published, .. } = &e {
                progress.ok(Step::Publish, published.to_string());
            }
            Err(PipelineError::at(progress, Step::PublishLatest, e))
        }
        Err(e) => Err(PipelineError::at(progress, Step::Publish, e)),
    }
}

/// Host-time pipeline: authenticate, pull, stop, start, verify.
pub fn rollout<A, E>(api: &A, engine: &E, settings: &Settings) -> Result<RolloutReport, PipelineError>
where
    A: RegistryApi,
    E: ContainerEngine,
{
    let plan = RolloutPlan::from_settings(settings);
    let gateway = RegistryGateway::new(api, engine, &settings.registry.domain);
    Ok(RolloutController::new(&gateway, engine, &plan).run()?)
}

#[derive(Debug)]
pub struct PromoteOutcome {
    pub publication: Publication,
    pub progress: Progress,
}

/// Point `latest` at an already-published tag.
///
/// Retries a stale `latest` after a partial publish, or rolls back by
/// promoting an older version. The host is not touched.
pub fn promote<A, E>(
    api: &A,
    engine: &E,
    settings: &Settings,
    tag: &Tag,
) -> Result<PromoteOutcome, PipelineError>
where
    A: RegistryApi,
    E: ContainerEngine,
{
    let mut progress = Progress::new("promote");
    let gateway = RegistryGateway::new(api, engine, &settings.registry.domain);

    let credentials = match gateway.authenticate(&Tenant::Caller, &settings.registry.region) {
        Ok(credentials) => credentials,
        Err(e) => return Err(PipelineError::at(progress, Step::Authenticate, e)),
    };
    progress.ok(
        Step::Authenticate,
        format!("logged in to {}", credentials.registry_host),
    );

    let repository = gateway.locate(&credentials, &settings.registry.repository);
    let source = repository.image(tag);
    match TagPublisher::new(engine).rebind_latest(&source, &repository) {
        Ok(publication) => {
            progress.ok(
                Step::PublishLatest,
                format!("{} → {} ({})", publication.latest, source, publication.artifact),
            );
            Ok(PromoteOutcome {
                publication,
                progress,
            })
        }
        Err(e) => Err(PipelineError::at(progress, Step::PublishLatest, e)),
    }
}

/// Only the repository bootstrap.
pub fn ensure_repository<A, E>(
    api: &A,
    engine: &E,
    settings: &Settings,
) -> Result<(RepositoryRef, Progress), PipelineError>
where
    A: RegistryApi,
    E: ContainerEngine,
{
    let mut progress = Progress::new("repo");
    let gateway = RegistryGateway::new(api, engine, &settings.registry.domain);
    match gateway.ensure_repository(
        &Tenant::Caller,
        &settings.registry.region,
        &settings.registry.repository,
    ) {
        Ok(repository) => {
            progress.ok(Step::Provision, repository.uri.clone());
            Ok((repository, progress))
        }
        Err(e) => Err(PipelineError::at(progress, Step::Provision, e)),
    }
}
