//! Rollout phases.

use std::fmt;

use hoist_core::Step;

/// Where a rollout is.
///
/// The happy path is strictly linear; any non-terminal phase can fall to
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RolloutPhase {
    /// Not started.
    Idle,
    /// Fetching fresh registry credentials.
    Authenticating,
    /// Pulling the image bound to `latest`.
    Pulling,
    /// Stopping and removing the current instance.
    Stopping,
    /// Starting a new instance from the persisted configuration.
    Starting,
    /// Waiting for the instance to settle, then checking it runs.
    Verifying,
    /// The new instance is running.
    Healthy,
    /// A step failed; see the attached error.
    Failed,
}

impl RolloutPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RolloutPhase::Healthy | RolloutPhase::Failed)
    }

    /// Successor on the happy path.
    pub fn next(&self) -> Option<RolloutPhase> {
        match self {
            RolloutPhase::Idle => Some(RolloutPhase::Authenticating),
            RolloutPhase::Authenticating => Some(RolloutPhase::Pulling),
            RolloutPhase::Pulling => Some(RolloutPhase::Stopping),
            RolloutPhase::Stopping => Some(RolloutPhase::Starting),
            RolloutPhase::Starting => Some(RolloutPhase::Verifying),
            RolloutPhase::Verifying => Some(RolloutPhase::Healthy),
            RolloutPhase::Healthy | RolloutPhase::Failed => None,
        }
    }

    /// Progress step that reports this phase's work.
    pub fn step(&self) -> Option<Step> {
        match self {
            RolloutPhase::Authenticating => Some(Step::Authenticate),
            RolloutPhase::Pulling => Some(Step::Pull),
            RolloutPhase::Stopping => Some(Step::Stop),
            RolloutPhase::Starting => Some(Step::Start),
            RolloutPhase::Verifying => Some(Step::Verify),
            _ => None,
        }
    }
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RolloutPhase::Idle => "Idle",
            RolloutPhase::Authenticating => "Authenticating",
            RolloutPhase::Pulling => "Pulling",
            RolloutPhase::Stopping => "Stopping",
            RolloutPhase::Starting => "Starting",
            RolloutPhase::Verifying => "Verifying",
            RolloutPhase::Healthy => "Healthy",
            RolloutPhase::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// One recorded phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transition {
    pub from: RolloutPhase,
    pub to: RolloutPhase,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.from, self.to)
    }
}
