//! Rollout controller: drives the host rollout state machine.
//!
//! One invocation moves the host's single instance from whatever is running
//! to the image currently bound to `latest`:
//!
//! ```text
//! Idle → Authenticating → Pulling → Stopping → Starting → Verifying → Healthy
//!                    └──────────┴──────────┴──────────┴──────────┴──→ Failed
//! ```
//!
//! Every transition is attempted exactly once. There are no retries and no
//! automatic rollback; rolling back means pointing `latest` at an older tag
//! and rolling out again.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use hoist_core::config::Settings;
use hoist_core::{
    ComposeProject, ContainerEngine, Credentials, ImageId, ImageRef, Progress, Region,
    RepositoryName, Step, Tag,
};
use hoist_registry::{RegistryApi, RegistryGateway, Tenant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::RolloutError;
use crate::phase::{RolloutPhase, Transition};
use crate::verify::{self, Liveness};

/// Everything a rollout needs to know about the host, resolved from settings.
#[derive(Debug, Clone)]
pub struct RolloutPlan {
    pub tenant: Tenant,
    pub region: Region,
    pub repository: RepositoryName,
    pub project: ComposeProject,
    /// Startup helper kept alongside the host state. Optional.
    pub helper: PathBuf,
    pub container: String,
    pub settle: Duration,
    pub log_tail_lines: usize,
}

impl RolloutPlan {
    pub fn from_settings(settings: &Settings) -> Self {
        let rollout = &settings.rollout;
        Self {
            tenant: Tenant::from_override(rollout.registry_account.clone()),
            region: settings.registry.region.clone(),
            repository: settings.registry.repository.clone(),
            project: rollout.compose_project(),
            helper: rollout.helper.clone(),
            container: rollout.container.clone(),
            settle: rollout.settle(),
            log_tail_lines: rollout.log_tail_lines,
        }
    }

    /// Files that must already exist on the host. They are read, never written.
    pub fn required_state(&self) -> [&PathBuf; 2] {
        [&self.project.compose_file, &self.project.env_file]
    }
}

/// A rollout that reached `Healthy`.
#[derive(Debug)]
pub struct RolloutReport {
    pub image: ImageRef,
    pub artifact: ImageId,
    /// Tail of the new instance's output, if it could be read.
    pub log_tail: Option<String>,
    pub transitions: Vec<Transition>,
    pub progress: Progress,
    pub elapsed: Duration,
}

/// A rollout that ended in `Failed`.
#[derive(Debug, Error)]
#[error("rollout failed while {failed_during}: {error}")]
pub struct RolloutFailure {
    pub failed_during: RolloutPhase,
    #[source]
    pub error: RolloutError,
    /// Output of the instance at the time of failure, when there was one.
    pub log_tail: Option<String>,
    pub transitions: Vec<Transition>,
    pub progress: Progress,
}

pub struct RolloutController<'a, A, E> {
    gateway: &'a RegistryGateway<'a, A, E>,
    engine: &'a E,
    plan: &'a RolloutPlan,
    phase: RolloutPhase,
    transitions: Vec<Transition>,
    progress: Progress,
    credentials: Option<Credentials>,
    pulled: Option<(ImageRef, ImageId)>,
    log_tail: Option<String>,
    failure: Option<(RolloutPhase, RolloutError)>,
    started_at: Instant,
}

impl<'a, A: RegistryApi, E: ContainerEngine> RolloutController<'a, A, E> {
    pub fn new(gateway: &'a RegistryGateway<'a, A, E>, engine: &'a E, plan: &'a RolloutPlan) -> Self {
        Self {
            gateway,
            engine,
            plan,
            phase: RolloutPhase::Idle,
            transitions: Vec::new(),
            progress: Progress::new("rollout"),
            credentials: None,
            pulled: None,
            log_tail: None,
            failure: None,
            started_at: Instant::now(),
        }
    }

    pub fn phase(&self) -> RolloutPhase {
        self.phase
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Perform the current phase's work and move on.
    ///
    /// Terminal phases are left as they are.
    pub fn step(&mut self) -> RolloutPhase {
        let outcome = match self.phase {
            RolloutPhase::Idle => self.check_host_state(),
            RolloutPhase::Authenticating => self.authenticate(),
            RolloutPhase::Pulling => self.pull(),
            RolloutPhase::Stopping => self.stop(),
            RolloutPhase::Starting => self.start(),
            RolloutPhase::Verifying => self.verify(),
            RolloutPhase::Healthy | RolloutPhase::Failed => return self.phase,
        };

        match outcome {
            Ok(()) => {
                if let Some(next) = self.phase.next() {
                    self.enter(next);
                }
            }
            Err(error) => self.fail(error),
        }
        self.phase
    }

    /// Step until `Healthy` or `Failed`.
    pub fn run(mut self) -> Result<RolloutReport, RolloutFailure> {
        info!(
            repository = %self.plan.repository,
            container = %self.plan.container,
            state_dir = %self.plan.project.dir.display(),
            "starting rollout"
        );
        while !self.phase.is_terminal() {
            self.step();
        }
        self.finish()
    }

    /// Turn the controller's final state into a report.
    pub fn finish(mut self) -> Result<RolloutReport, RolloutFailure> {
        let (failed_during, error) = match (self.failure.take(), self.pulled.take()) {
            (None, Some((image, artifact))) if self.phase == RolloutPhase::Healthy => {
                let elapsed = self.started_at.elapsed();
                info!(image = %image, artifact = %artifact, elapsed_ms = elapsed.as_millis() as u64, "rollout healthy");
                return Ok(RolloutReport {
                    image,
                    artifact,
                    log_tail: self.log_tail,
                    transitions: self.transitions,
                    progress: self.progress,
                    elapsed,
                });
            }
            (Some(failure), _) => failure,
            (None, _) => (self.phase, RolloutError::Incomplete(self.phase)),
        };
        Err(RolloutFailure {
            failed_during,
            error,
            log_tail: self.log_tail,
            transitions: self.transitions,
            progress: self.progress,
        })
    }

    fn enter(&mut self, to: RolloutPhase) {
        let transition = Transition {
            from: self.phase,
            to,
        };
        debug!(%transition, "rollout transition");
        self.transitions.push(transition);
        self.phase = to;
    }

    fn fail(&mut self, error: RolloutError) {
        let during = self.phase;
        if let Some(step) = during.step() {
            self.progress.failed(step, error.to_string());
        } else {
            warn!(phase = %during, error = %error, "rollout aborted before it started");
        }
        self.failure = Some((during, error));
        self.enter(RolloutPhase::Failed);
    }

    fn check_host_state(&mut self) -> Result<(), RolloutError> {
        for path in self.plan.required_state() {
            if !path.is_file() {
                return Err(RolloutError::MissingHostState(path.clone()));
            }
        }
        if !self.plan.helper.is_file() {
            debug!(helper = %self.plan.helper.display(), "no startup helper in state directory");
        }
        Ok(())
    }

    fn authenticate(&mut self) -> Result<(), RolloutError> {
        let credentials = self.gateway.authenticate(&self.plan.tenant, &self.plan.region)?;
        self.progress.ok(
            Step::Authenticate,
            format!("logged in to {}", credentials.registry_host),
        );
        self.credentials = Some(credentials);
        Ok(())
    }

    fn pull(&mut self) -> Result<(), RolloutError> {
        let Some(credentials) = self.credentials.as_ref() else {
            return Err(RolloutError::Incomplete(RolloutPhase::Authenticating));
        };
        let image = self
            .gateway
            .locate(credentials, &self.plan.repository)
            .image(&Tag::latest());
        let artifact = match self.engine.pull(&image) {
            Ok(artifact) => artifact,
            Err(source) => {
                self.collect_logs();
                return Err(RolloutError::Pull { image, source });
            }
        };
        self.progress.ok(Step::Pull, format!("{image} ({artifact})"));
        self.pulled = Some((image, artifact));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RolloutError> {
        if let Err(e) = self.engine.compose_down(&self.plan.project) {
            self.collect_logs();
            return Err(RolloutError::Stop(e));
        }
        self.progress.ok(Step::Stop, "previous instance removed");
        Ok(())
    }

    fn start(&mut self) -> Result<(), RolloutError> {
        if let Err(e) = self.engine.compose_up(&self.plan.project) {
            self.collect_logs();
            return Err(RolloutError::Start(e));
        }
        self.progress.ok(
            Step::Start,
            format!("started from {}", self.plan.project.compose_file.display()),
        );
        Ok(())
    }

    fn verify(&mut self) -> Result<(), RolloutError> {
        let plan = self.plan;
        let container = &plan.container;
        match verify::probe(self.engine, container, self.plan.settle) {
            Ok(Liveness::Running) => {}
            Ok(Liveness::Absent) => {
                self.collect_logs();
                return Err(RolloutError::StartupVerification {
                    container: container.clone(),
                    detail: format!("not running after {}s", plan.settle.as_secs()),
                });
            }
            Err(e) => {
                self.collect_logs();
                return Err(RolloutError::StartupVerification {
                    container: container.clone(),
                    detail: e.to_string(),
                });
            }
        }

        self.progress.ok(Step::Verify, format!("{container} is running"));
        match self.engine.logs(container, plan.log_tail_lines) {
            Ok(tail) => self.log_tail = Some(tail),
            Err(e) => self
                .progress
                .warn(Step::Verify, format!("log tail unavailable: {e}")),
        }
        Ok(())
    }

    /// Best effort; a failure here must not mask the original error.
    fn collect_logs(&mut self) {
        match self.engine.logs(&self.plan.container, self.plan.log_tail_lines) {
            Ok(tail) => self.log_tail = Some(tail),
            Err(e) => warn!(container = %self.plan.container, error = %e, "could not read container logs"),
        }
    }
}
