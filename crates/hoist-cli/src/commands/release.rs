use std::path::Path;

use hoist_core::{Settings, SystemRunner};

use crate::commands::{adapters, failed, parse_tag, print_trace};
use crate::pipeline;

pub fn release(settings: &Settings, path: &str, tag: Option<&str>) -> anyhow::Result<()> {
    let tag = tag.map(|t| parse_tag("--tag", t)).transpose()?;
    let (api, engine) = adapters();

    let outcome = pipeline::release(&api, &engine, &SystemRunner, settings, Path::new(path), tag.as_ref())
        .map_err(failed)?;

    print_trace(&outcome.progress);
    println!("  Revision: {}", outcome.artifact.revision);
    println!("  Built:    {}", outcome.artifact.built_at.to_rfc3339());
    println!("  Digest:   {}", outcome.artifact.context_digest);
    println!("  Image:    {}", outcome.publication.requested);
    if outcome.publication.latest != outcome.publication.requested {
        println!("  Latest:   {}", outcome.publication.latest);
    }
    Ok(())
}
