use hoist_core::Settings;

use crate::commands::{adapters, failed, parse_tag, print_trace};
use crate::pipeline;

pub fn promote(settings: &Settings, tag: &str) -> anyhow::Result<()> {
    let tag = parse_tag("TAG", tag)?;
    let (api, engine) = adapters();

    let outcome = pipeline::promote(&api, &engine, settings, &tag).map_err(failed)?;
    print_trace(&outcome.progress);
    println!("  `latest` now points at {}", outcome.publication.artifact);
    println!("  Run `hoist rollout` on the host to activate it.");
    Ok(())
}
