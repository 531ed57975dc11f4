//! Step-by-step progress trace for a pipeline run.
//!
//! Each recorded step also emits a `tracing` event at the moment it happens,
//! so the operator sees progress live and the caller can inspect the full
//! trace afterwards.

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

/// Named steps across both pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Provision,
    Authenticate,
    Build,
    Publish,
    PublishLatest,
    Pull,
    Stop,
    Start,
    Verify,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Provision => "provision",
            Step::Authenticate => "authenticate",
            Step::Build => "build",
            Step::Publish => "publish",
            Step::PublishLatest => "publish-latest",
            Step::Pull => "pull",
            Step::Stop => "stop",
            Step::Start => "start",
            Step::Verify => "verify",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Failed,
    /// Completed, but with a condition the operator should know about.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub detail: String,
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self.status {
            StepStatus::Ok => "✓",
            StepStatus::Failed => "✗",
            StepStatus::Warning => "!",
        };
        write!(f, "{symbol} {:<14} {}", self.step, self.detail)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pipeline: &'static str,
    records: Vec<StepRecord>,
}

impl Progress {
    pub fn new(pipeline: &'static str) -> Self {
        Self {
            pipeline,
            records: Vec::new(),
        }
    }

    pub fn ok(&mut self, step: Step, detail: impl Into<String>) {
        let detail = detail.into();
        info!(pipeline = self.pipeline, step = %step, status = "ok", "{detail}");
        self.push(step, StepStatus::Ok, detail);
    }

    pub fn warn(&mut self, step: Step, detail: impl Into<String>) {
        let detail = detail.into();
        warn!(pipeline = self.pipeline, step = %step, status = "warning", "{detail}");
        self.push(step, StepStatus::Warning, detail);
    }

    pub fn failed(&mut self, step: Step, detail: impl Into<String>) {
        let detail = detail.into();
        error!(pipeline = self.pipeline, step = %step, status = "failed", "{detail}");
        self.push(step, StepStatus::Failed, detail);
    }

    fn push(&mut self, step: Step, status: StepStatus, detail: String) {
        self.records.push(StepRecord {
            step,
            status,
            detail,
        });
    }

    pub fn pipeline(&self) -> &'static str {
        self.pipeline
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// The step that failed, if any.
    pub fn failed_step(&self) -> Option<Step> {
        self.records
            .iter()
            .find(|r| r.status == StepStatus::Failed)
            .map(|r| r.step)
    }

    /// Steps in the order they were recorded.
    pub fn steps(&self) -> Vec<Step> {
        self.records.iter().map(|r| r.step).collect()
    }
}
