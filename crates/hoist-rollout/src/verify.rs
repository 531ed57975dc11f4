//! Post-start liveness check.
//!
//! Liveness is process presence only: after a fixed settle delay the
//! container must be in the engine's running set. No HTTP endpoint is probed.

use std::thread;
use std::time::Duration;

use hoist_core::{ContainerEngine, EngineError};
use tracing::debug;

/// Result of a single liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running,
    Absent,
}

/// Wait `settle`, then ask the engine whether `container` is running.
pub fn probe<E: ContainerEngine>(
    engine: &E,
    container: &str,
    settle: Duration,
) -> Result<Liveness, EngineError> {
    if !settle.is_zero() {
        debug!(container, settle_secs = settle.as_secs_f64(), "waiting for instance to settle");
        thread::sleep(settle);
    }
    let liveness = if engine.is_running(container)? {
        Liveness::Running
    } else {
        Liveness::Absent
    };
    debug!(container, ?liveness, "liveness probe");
    Ok(liveness)
}
