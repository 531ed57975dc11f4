//! In-memory stand-ins for the command runner and the container engine.
//!
//! Compiled for this crate's tests and, through the `fake` feature, for the
//! tests of every crate that drives a [`ContainerEngine`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use secrecy::ExposeSecret;

use crate::engine::{BuildRequest, ComposeProject, ContainerEngine, EngineError};
use crate::exec::{CommandOutput, CommandRunner, ExecError, Invocation};
use crate::types::{Credentials, ImageId, ImageRef};

/// A command the [`ScriptedRunner`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub command: String,
    pub stdin: Option<String>,
    pub cwd: Option<String>,
}

/// Returns canned outputs for commands that start with a given prefix.
///
/// Responses are consumed in order; an unscripted command exits 127.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<(String, CommandOutput)>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, prefix: &str, output: CommandOutput) -> Self {
        lock(&self.responses).push_back((prefix.to_string(), output));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: Invocation) -> Result<CommandOutput, ExecError> {
        let command = invocation.to_string();
        lock(&self.calls).push(RecordedCall {
            command: command.clone(),
            stdin: invocation.stdin.as_ref().map(|s| s.expose_secret().to_string()),
            cwd: invocation.cwd.as_ref().map(|p| p.display().to_string()),
        });

        let mut responses = lock(&self.responses);
        match responses.iter().position(|(prefix, _)| command.starts_with(prefix)) {
            Some(index) => Ok(responses.remove(index).map(|(_, out)| out).unwrap_or_default()),
            None => Ok(CommandOutput::failed(127, format!("no scripted response for `{command}`"))),
        }
    }
}

/// Engine operations, for failure injection and call assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FakeOp {
    Login,
    Build,
    Tag,
    Push,
    Pull,
    Labels,
    ComposeDown,
    ComposeUp,
    IsRunning,
    Logs,
}

#[derive(Debug, Default)]
struct EngineState {
    logged_in: BTreeSet<String>,
    /// Local reference -> image.
    local: BTreeMap<String, ImageId>,
    /// Registry reference (`uri:tag`) -> image.
    remote: BTreeMap<String, ImageId>,
    labels: BTreeMap<ImageId, BTreeMap<String, String>>,
    running: Option<ImageId>,
    last_pulled: Option<ImageId>,
    calls: Vec<FakeOp>,
    failing: BTreeSet<FakeOp>,
    failing_push_tags: BTreeSet<String>,
    crash_on_start: bool,
    log_output: String,
    next_id: u32,
}

/// A container engine and registry in one process.
///
/// Pushes and pulls require a prior `login` to the image's registry host,
/// mirroring a real registry's refusal of anonymous access.
#[derive(Debug, Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `op` fail.
    pub fn fail(self, op: FakeOp) -> Self {
        lock(&self.state).failing.insert(op);
        self
    }

    /// Make pushes of this tag fail.
    pub fn fail_push_of(self, tag: &str) -> Self {
        lock(&self.state).failing_push_tags.insert(tag.to_string());
        self
    }

    /// `compose up` succeeds but the container exits straight away.
    pub fn crash_on_start(self) -> Self {
        lock(&self.state).crash_on_start = true;
        self
    }

    pub fn with_logs(self, logs: &str) -> Self {
        lock(&self.state).log_output = logs.to_string();
        self
    }

    /// Seed the registry with an image bound to `reference` (`uri:tag`).
    pub fn with_remote(self, reference: &str, id: &str, labels: &[(&str, &str)]) -> Self {
        {
            let mut state = lock(&self.state);
            let id = ImageId(id.to_string());
            state.remote.insert(reference.to_string(), id.clone());
            state.labels.insert(
                id,
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
        }
        self
    }

    /// Seed a running instance.
    pub fn with_running(self, id: &str) -> Self {
        lock(&self.state).running = Some(ImageId(id.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<FakeOp> {
        lock(&self.state).calls.clone()
    }

    pub fn called(&self, op: FakeOp) -> bool {
        lock(&self.state).calls.contains(&op)
    }

    /// Image bound to `reference` in the registry.
    pub fn remote(&self, reference: &str) -> Option<ImageId> {
        lock(&self.state).remote.get(reference).cloned()
    }

    pub fn remote_labels(&self, reference: &str) -> BTreeMap<String, String> {
        let state = lock(&self.state);
        state
            .remote
            .get(reference)
            .and_then(|id| state.labels.get(id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn running_image(&self) -> Option<ImageId> {
        lock(&self.state).running.clone()
    }

    pub fn logged_in(&self, host: &str) -> bool {
        lock(&self.state).logged_in.contains(host)
    }

    /// Record the call and apply any injected failure.
    fn enter(&self, op: FakeOp) -> Result<std::sync::MutexGuard<'_, EngineState>, EngineError> {
        let mut state = lock(&self.state);
        state.calls.push(op);
        if state.failing.contains(&op) {
            return Err(failure(op, "injected failure"));
        }
        Ok(state)
    }
}

fn failure(op: FakeOp, detail: &str) -> EngineError {
    EngineError::Failed {
        command: format!("fake {op:?}"),
        code: Some(1),
        detail: detail.to_string(),
    }
}

fn host_of(image: &ImageRef) -> &str {
    image
        .repository_uri
        .split_once('/')
        .map(|(host, _)| host)
        .unwrap_or(&image.repository_uri)
}

impl ContainerEngine for FakeEngine {
    fn login(&self, credentials: &Credentials) -> Result<(), EngineError> {
        let mut state = self.enter(FakeOp::Login)?;
        state.logged_in.insert(credentials.registry_host.clone());
        Ok(())
    }

    fn build(&self, request: &BuildRequest) -> Result<ImageId, EngineError> {
        let mut state = self.enter(FakeOp::Build)?;
        state.next_id += 1;
        let id = ImageId(format!("sha256:fake{:04}", state.next_id));
        state.local.insert(request.local_ref.clone(), id.clone());
        state.labels.insert(id.clone(), request.labels.clone());
        Ok(id)
    }

    fn tag(&self, source: &str, target: &ImageRef) -> Result<(), EngineError> {
        let mut state = self.enter(FakeOp::Tag)?;
        let id = state
            .local
            .get(source)
            .cloned()
            .ok_or_else(|| failure(FakeOp::Tag, &format!("No such image: {source}")))?;
        state.local.insert(target.to_string(), id);
        Ok(())
    }

    fn push(&self, image: &ImageRef) -> Result<(), EngineError> {
        let mut state = self.enter(FakeOp::Push)?;
        if state.failing_push_tags.contains(image.tag.as_str()) {
            return Err(failure(FakeOp::Push, "connection reset by peer"));
        }
        if !state.logged_in.contains(host_of(image)) {
            return Err(failure(FakeOp::Push, "no basic auth credentials"));
        }
        let reference = image.to_string();
        let id = state
            .local
            .get(&reference)
            .cloned()
            .ok_or_else(|| failure(FakeOp::Push, &format!("tag does not exist: {reference}")))?;
        state.remote.insert(reference, id);
        Ok(())
    }

    fn pull(&self, image: &ImageRef) -> Result<ImageId, EngineError> {
        let mut state = self.enter(FakeOp::Pull)?;
        if !state.logged_in.contains(host_of(image)) {
            return Err(failure(FakeOp::Pull, "no basic auth credentials"));
        }
        let reference = image.to_string();
        let id = state
            .remote
            .get(&reference)
            .cloned()
            .ok_or_else(|| failure(FakeOp::Pull, &format!("manifest unknown: {reference}")))?;
        state.local.insert(reference, id.clone());
        state.last_pulled = Some(id.clone());
        Ok(id)
    }

    fn labels(&self, image: &str) -> Result<BTreeMap<String, String>, EngineError> {
        let state = self.enter(FakeOp::Labels)?;
        let id = state
            .local
            .get(image)
            .ok_or_else(|| failure(FakeOp::Labels, &format!("No such image: {image}")))?;
        Ok(state.labels.get(id).cloned().unwrap_or_default())
    }

    fn compose_down(&self, _project: &ComposeProject) -> Result<(), EngineError> {
        let mut state = self.enter(FakeOp::ComposeDown)?;
        state.running = None;
        Ok(())
    }

    fn compose_up(&self, _project: &ComposeProject) -> Result<(), EngineError> {
        let mut state = self.enter(FakeOp::ComposeUp)?;
        if !state.crash_on_start {
            state.running = state.last_pulled.clone();
        }
        Ok(())
    }

    fn is_running(&self, _container: &str) -> Result<bool, EngineError> {
        let state = self.enter(FakeOp::IsRunning)?;
        Ok(state.running.is_some())
    }

    fn logs(&self, _container: &str, lines: usize) -> Result<String, EngineError> {
        let state = self.enter(FakeOp::Logs)?;
        let all: Vec<&str> = state.log_output.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].join("\n"))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tag;

    #[test]
    fn scripted_runner_consumes_in_order() {
        let runner = ScriptedRunner::new()
            .respond("git", CommandOutput::ok("one"))
            .respond("git", CommandOutput::ok("two"));
        assert_eq!(runner.run(Invocation::new("git")).unwrap().stdout, "one");
        assert_eq!(runner.run(Invocation::new("git")).unwrap().stdout, "two");
        assert_eq!(runner.run(Invocation::new("git")).unwrap().code, Some(127));
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn push_requires_login() {
        let engine = FakeEngine::new();
        let image = ImageRef {
            repository_uri: "host/ns/svc".into(),
            tag: Tag::latest(),
        };
        assert!(engine.push(&image).is_err());
        assert!(engine.pull(&image).is_err());
    }
}
