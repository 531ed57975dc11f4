use hoist_core::Settings;

use crate::commands::{adapters, failed, print_trace};
use crate::pipeline;

pub fn repo(settings: &Settings) -> anyhow::Result<()> {
    let (api, engine) = adapters();
    let (_, progress) = pipeline::ensure_repository(&api, &engine, settings).map_err(failed)?;
    print_trace(&progress);
    Ok(())
}
