pub mod config;
pub mod init;
pub mod promote;
pub mod release;
pub mod repo;
pub mod rollout;
pub mod status;

use hoist_core::{ConfigError, DockerCli, Progress, SystemRunner, Tag};
use hoist_registry::AwsCli;

use crate::pipeline::PipelineError;

/// The production adapters: `aws` for the registry API, `docker` for images
/// and containers.
pub(crate) fn adapters() -> (AwsCli<SystemRunner>, DockerCli<SystemRunner>) {
    (AwsCli::new(SystemRunner), DockerCli::new(SystemRunner))
}

pub(crate) fn print_trace(progress: &Progress) {
    for record in progress.records() {
        println!("{record}");
    }
}

/// Print what ran before the failure, then hand the error back for exit-code
/// mapping.
pub(crate) fn failed(err: PipelineError) -> anyhow::Error {
    print_trace(&err.progress);
    if let Some(tail) = err.log_tail.as_deref().filter(|t| !t.is_empty()) {
        eprintln!("--- last output of the service ---");
        eprintln!("{tail}");
    }
    if err.is_latest_stale() {
        eprintln!("hint: the requested tag is published; run `hoist promote <tag>` to repair `latest`");
    }
    err.into()
}

pub(crate) fn parse_tag(field: &'static str, value: &str) -> Result<Tag, ConfigError> {
    Tag::new(value).map_err(|source| ConfigError::Invalid { field, source })
}
