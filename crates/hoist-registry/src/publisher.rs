//! Tag Publisher: binds version labels to a built artifact in the registry.
//!
//! Every publish produces two bindings to the same artifact: the requested
//! tag first, then `latest`. Rollouts only ever look for `latest`, so a
//! failure on the second binding is reported separately from a total failure.

use hoist_core::{Artifact, ContainerEngine, ImageId, ImageRef, RepositoryRef, Tag};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::PublishError;

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    pub artifact: ImageId,
    pub requested: ImageRef,
    pub latest: ImageRef,
}

pub struct TagPublisher<'a, E> {
    engine: &'a E,
}

impl<'a, E: ContainerEngine> TagPublisher<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    fn upload(&self, source: &str, target: &ImageRef) -> Result<(), hoist_core::EngineError> {
        self.engine.tag(source, target)?;
        self.engine.push(target)
    }

    /// Publish `artifact` under `requested` (default `latest`) and `latest`.
    ///
    /// When the requested tag is `latest` itself the two bindings coincide
    /// and a single upload is made.
    pub fn publish(
        &self,
        artifact: &Artifact,
        repository: &RepositoryRef,
        requested: Option<&Tag>,
    ) -> Result<Publication, PublishError> {
        let requested_tag = requested.cloned().unwrap_or_else(Tag::latest);
        let requested = repository.image(&requested_tag);
        let latest = repository.image(&Tag::latest());

        info!(
            image = %requested,
            kind = %requested_tag.kind().describe(),
            revision = %artifact.revision,
            "publishing"
        );
        self.upload(&artifact.local_ref, &requested)
            .map_err(|source| PublishError::Failed {
                image: requested.clone(),
                source,
            })?;

        if !requested_tag.is_latest() {
            if let Err(source) = self.upload(&artifact.local_ref, &latest) {
                warn!(published = %requested, latest = %latest, "latest rebind failed");
                return Err(PublishError::LatestTagStale {
                    published: requested,
                    latest,
                    source,
                });
            }
        }

        info!(requested = %requested, latest = %latest, artifact = %artifact.id, "published");
        Ok(Publication {
            artifact: artifact.id.clone(),
            requested,
            latest,
        })
    }

    /// Point `latest` at whatever `source` is bound to.
    ///
    /// This is the narrow retry for [`PublishError::LatestTagStale`] and the
    /// manual rollback path (rebind to a prior version, then roll out).
    pub fn rebind_latest(
        &self,
        source: &ImageRef,
        repository: &RepositoryRef,
    ) -> Result<Publication, PublishError> {
        let latest = repository.image(&Tag::latest());
        let artifact = self
            .engine
            .pull(source)
            .map_err(|e| PublishError::SourceUnavailable {
                image: source.clone(),
                source: e,
            })?;

        if source.tag.is_latest() {
            return Ok(Publication {
                artifact,
                requested: source.clone(),
                latest,
            });
        }

        self.upload(&source.to_string(), &latest)
            .map_err(|e| PublishError::LatestTagStale {
                published: source.clone(),
                latest: latest.clone(),
                source: e,
            })?;

        info!(source = %source, latest = %latest, artifact = %artifact, "latest rebound");
        Ok(Publication {
            artifact,
            requested: source.clone(),
            latest,
        })
    }
}
