//! Artifact Builder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use hoist_core::config::BuildSettings;
use hoist_core::{Artifact, BuildRequest, CommandRunner, ContainerEngine, RepositoryName};
use tracing::info;

use crate::context::context_digest;
use crate::error::BuildError;
use crate::revision::resolve_revision;

/// Image labels every artifact carries.
pub mod labels {
    pub const REVISION: &str = "org.opencontainers.image.revision";
    pub const CREATED: &str = "org.opencontainers.image.created";
    pub const TITLE: &str = "org.opencontainers.image.title";
    pub const CONTEXT_DIGEST: &str = "dev.hoist.context-digest";
}

/// Build args passed so the running service can report its own build.
pub const ARG_REVISION: &str = "GIT_REVISION";
pub const ARG_TIMESTAMP: &str = "BUILD_TIMESTAMP";

pub struct ArtifactBuilder<'a, E, R> {
    engine: &'a E,
    runner: &'a R,
    settings: &'a BuildSettings,
    repository: &'a RepositoryName,
}

fn under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Local image names must be lowercase `[a-z0-9_.-]`.
fn local_tag(revision: &str) -> String {
    let cleaned: String = revision
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .take(64)
        .collect();
    format!("build-{cleaned}")
}

impl<'a, E: ContainerEngine, R: CommandRunner> ArtifactBuilder<'a, E, R> {
    pub fn new(
        engine: &'a E,
        runner: &'a R,
        settings: &'a BuildSettings,
        repository: &'a RepositoryName,
    ) -> Self {
        Self {
            engine,
            runner,
            settings,
            repository,
        }
    }

    /// Build the source tree at `source_root` into a labelled image.
    ///
    /// Every run is a full build; nothing is reused from earlier runs.
    pub fn build(&self, source_root: &Path) -> Result<Artifact, BuildError> {
        let context = under(source_root, &self.settings.context);
        if !context.is_dir() {
            return Err(BuildError::MissingContext(context));
        }
        let dockerfile = under(&context, &self.settings.dockerfile);
        if !dockerfile.is_file() {
            return Err(BuildError::MissingDockerfile(dockerfile));
        }
        if let Some(assets) = &self.settings.static_dir {
            let assets = under(&context, assets);
            if !assets.is_dir() {
                return Err(BuildError::MissingAssets(assets));
            }
        }

        let revision = resolve_revision(self.runner, source_root, self.settings.revision.as_deref())?;
        let built_at = Utc::now();
        let created = built_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let digest = context_digest(&context)?;
        let local_ref = format!("hoist/{}:{}", self.repository.image(), local_tag(&revision.0));

        info!(
            context = %context.display(),
            revision = %revision,
            image = %local_ref,
            "building image"
        );

        let request = BuildRequest {
            context: context.clone(),
            dockerfile,
            local_ref: local_ref.clone(),
            labels: BTreeMap::from([
                (labels::REVISION.to_string(), revision.0.clone()),
                (labels::CREATED.to_string(), created.clone()),
                (labels::TITLE.to_string(), self.repository.to_string()),
                (labels::CONTEXT_DIGEST.to_string(), digest.clone()),
            ]),
            build_args: BTreeMap::from([
                (ARG_REVISION.to_string(), revision.0.clone()),
                (ARG_TIMESTAMP.to_string(), created),
            ]),
        };
        let id = self.engine.build(&request)?;

        let embedded = self.engine.labels(&local_ref)?;
        if embedded.get(labels::REVISION) != Some(&revision.0) {
            return Err(BuildError::MetadataMissing {
                image: local_ref,
                label: labels::REVISION,
            });
        }

        info!(image = %local_ref, id = %id, "image built");
        Ok(Artifact {
            id,
            local_ref,
            revision,
            built_at,
            context_digest: digest,
        })
    }
}
