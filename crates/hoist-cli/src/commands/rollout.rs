use hoist_core::Settings;

use crate::commands::{adapters, failed, print_trace};
use crate::pipeline;

pub fn rollout(settings: &Settings) -> anyhow::Result<()> {
    let (api, engine) = adapters();
    let report = pipeline::rollout(&api, &engine, settings).map_err(failed)?;

    print_trace(&report.progress);
    println!("  Image:   {}", report.image);
    println!("  Running: {} ({:.1}s)", report.artifact, report.elapsed.as_secs_f64());
    if let Some(tail) = report.log_tail.as_deref().filter(|t| !t.is_empty()) {
        println!("--- last output of {} ---", settings.rollout.container);
        println!("{tail}");
    }
    Ok(())
}
