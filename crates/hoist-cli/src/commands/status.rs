//! `hoist status`: read-only look at the deployment target.

use anyhow::bail;
use hoist_core::config::RolloutSettings;
use hoist_core::{ContainerEngine, EngineError, Settings};

use crate::commands::adapters;

/// What the host reports for the service container.
#[derive(Debug, PartialEq, Eq)]
pub struct ServiceStatus {
    pub running: bool,
    /// Recent output, when the engine could provide any.
    pub log_tail: Option<String>,
}

/// Ask the engine about the container. Only queries, never changes state.
pub fn inspect<E: ContainerEngine>(
    engine: &E,
    rollout: &RolloutSettings,
) -> Result<ServiceStatus, EngineError> {
    let container = &rollout.container;
    let running = engine.is_running(container)?;
    let log_tail = match engine.logs(container, rollout.log_tail_lines) {
        Ok(tail) if !tail.is_empty() => Some(tail),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(container = %container, error = %e, "no logs available");
            None
        }
    };
    Ok(ServiceStatus { running, log_tail })
}

pub fn status(settings: &Settings) -> anyhow::Result<()> {
    let (_, engine) = adapters();
    let container = &settings.rollout.container;

    let status = inspect(&engine, &settings.rollout)?;
    if let Some(tail) = &status.log_tail {
        println!("--- last output of {container} ---");
        println!("{tail}");
    }
    if !status.running {
        bail!("{container} is not running");
    }
    println!("✓ {container} is running");
    Ok(())
}
