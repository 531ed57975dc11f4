//! End-to-end host rollouts against in-memory registry and engine fakes.

use std::fs;
use std::path::Path;

use hoist_core::HoistConfig;
use hoist_core::fake::{FakeEngine, FakeOp};
use hoist_core::{Step, StepStatus};
use hoist_registry::RegistryGateway;
use hoist_registry::fake::{ApiOp, FakeRegistry};
use hoist_rollout::{RolloutController, RolloutError, RolloutPhase, RolloutPlan, Transition};

const CALLER: &str = "111111111111";
const LATEST: &str = "111111111111.dkr.ecr.us-east-2.amazonaws.com/ns/svc:latest";

fn host_state() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("docker-compose.yml"),
        "services:\n  svc:\n    image: ${IMAGE}\n    env_file: .env\n",
    )
    .unwrap();
    fs::write(dir.path().join(".env"), "PORT=8080\nPAY_TO=0xabc\n").unwrap();
    fs::write(dir.path().join("update.sh"), "#!/bin/sh\nhoist rollout\n").unwrap();
    dir
}

fn plan_for(state_dir: &Path, extra: &str) -> RolloutPlan {
    let toml = format!(
        r#"
[registry]
namespace = "ns"
image = "svc"

[rollout]
state_dir = "{}"
settle_secs = 0
log_tail_lines = 2
{extra}
"#,
        state_dir.display()
    );
    let config: HoistConfig = toml::from_str(&toml).unwrap();
    RolloutPlan::from_settings(&config.validate().unwrap())
}

fn transitions(pairs: &[(RolloutPhase, RolloutPhase)]) -> Vec<Transition> {
    pairs
        .iter()
        .map(|&(from, to)| Transition { from, to })
        .collect()
}

fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .map(|p| {
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            (name, fs::read(&p).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_healthy_rollout_replaces_the_running_instance() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new()
        .with_remote(LATEST, "sha256:new", &[])
        .with_running("sha256:old")
        .with_logs("booting\nlistening on :8080\nready");
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let report = RolloutController::new(&gateway, &engine, &plan).run().unwrap();

    assert_eq!(report.image.to_string(), LATEST);
    assert_eq!(report.artifact.0, "sha256:new");
    assert_eq!(engine.running_image().unwrap().0, "sha256:new");
    assert_eq!(report.log_tail.as_deref(), Some("listening on :8080\nready"));
    assert_eq!(
        report.progress.steps(),
        vec![Step::Authenticate, Step::Pull, Step::Stop, Step::Start, Step::Verify]
    );
    use RolloutPhase::*;
    assert_eq!(
        report.transitions,
        transitions(&[
            (Idle, Authenticating),
            (Authenticating, Pulling),
            (Pulling, Stopping),
            (Stopping, Starting),
            (Starting, Verifying),
            (Verifying, Healthy),
        ])
    );
}

#[test]
fn test_pull_failure_never_stops_the_running_instance() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    // nothing bound to latest in the registry
    let engine = FakeEngine::new().with_running("sha256:old");
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let failure = RolloutController::new(&gateway, &engine, &plan).run().unwrap_err();

    assert_eq!(failure.failed_during, RolloutPhase::Pulling);
    match &failure.error {
        RolloutError::Pull { image, source } => {
            assert_eq!(image.to_string(), LATEST);
            assert!(source.to_string().contains("manifest unknown"));
        }
        other => panic!("expected pull error, got {other:?}"),
    }
    use RolloutPhase::*;
    assert_eq!(
        failure.transitions,
        transitions(&[
            (Idle, Authenticating),
            (Authenticating, Pulling),
            (Pulling, Failed),
        ])
    );
    assert!(!engine.called(FakeOp::ComposeDown));
    assert!(!engine.called(FakeOp::ComposeUp));
    assert_eq!(engine.running_image().unwrap().0, "sha256:old");
    assert_eq!(failure.progress.failed_step(), Some(Step::Pull));
}

#[test]
fn test_crashing_instance_fails_verification_without_rollback() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new()
        .with_remote(LATEST, "sha256:bad", &[])
        .with_running("sha256:old")
        .with_logs("booting\npanicked at 'PAY_TO not set'")
        .crash_on_start();
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let failure = RolloutController::new(&gateway, &engine, &plan).run().unwrap_err();

    assert_eq!(failure.failed_during, RolloutPhase::Verifying);
    assert!(matches!(
        failure.error,
        RolloutError::StartupVerification { ref container, .. } if container == "svc"
    ));
    assert_eq!(
        failure.log_tail.as_deref(),
        Some("booting\npanicked at 'PAY_TO not set'")
    );
    // no automatic rollback: the old image is not restarted
    assert!(engine.running_image().is_none());
    let ups = engine.calls().iter().filter(|c| **c == FakeOp::ComposeUp).count();
    let pulls = engine.calls().iter().filter(|c| **c == FakeOp::Pull).count();
    assert_eq!((ups, pulls), (1, 1));
    assert_eq!(failure.progress.failed_step(), Some(Step::Verify));
}

#[test]
fn test_authentication_failure_stops_before_pulling() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER).fail(ApiOp::Token);
    let engine = FakeEngine::new().with_remote(LATEST, "sha256:new", &[]);
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let failure = RolloutController::new(&gateway, &engine, &plan).run().unwrap_err();

    assert_eq!(failure.failed_during, RolloutPhase::Authenticating);
    assert!(matches!(failure.error, RolloutError::Authentication(_)));
    assert!(!engine.called(FakeOp::Login));
    assert!(!engine.called(FakeOp::Pull));
    assert_eq!(failure.progress.failed_step(), Some(Step::Authenticate));
}

#[test]
fn test_cross_account_override_skips_identity_lookup() {
    let state = host_state();
    let plan = plan_for(state.path(), r#"registry_account = "222222222222""#);
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new().with_remote(
        "222222222222.dkr.ecr.us-east-2.amazonaws.com/ns/svc:latest",
        "sha256:shared",
        &[],
    );
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let report = RolloutController::new(&gateway, &engine, &plan).run().unwrap();

    assert_eq!(api.count(ApiOp::Identity), 0);
    assert!(engine.logged_in("222222222222.dkr.ecr.us-east-2.amazonaws.com"));
    assert!(!engine.logged_in("111111111111.dkr.ecr.us-east-2.amazonaws.com"));
    assert_eq!(report.artifact.0, "sha256:shared");
}

#[test]
fn test_missing_compose_file_touches_nothing() {
    let state = host_state();
    fs::remove_file(state.path().join("docker-compose.yml")).unwrap();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new().with_running("sha256:old");
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let failure = RolloutController::new(&gateway, &engine, &plan).run().unwrap_err();

    assert!(matches!(
        failure.error,
        RolloutError::MissingHostState(ref path) if path.ends_with("docker-compose.yml")
    ));
    assert_eq!(api.count(ApiOp::Token), 0);
    assert!(engine.calls().is_empty());
}

#[test]
fn test_host_state_is_never_written() {
    let state = host_state();
    let before = snapshot(state.path());
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new().with_remote(LATEST, "sha256:new", &[]);
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    RolloutController::new(&gateway, &engine, &plan).run().unwrap();

    assert_eq!(snapshot(state.path()), before);
}

#[test]
fn test_stop_failure_does_not_start() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new()
        .with_remote(LATEST, "sha256:new", &[])
        .fail(FakeOp::ComposeDown);
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let failure = RolloutController::new(&gateway, &engine, &plan).run().unwrap_err();

    assert_eq!(failure.failed_during, RolloutPhase::Stopping);
    assert!(matches!(failure.error, RolloutError::Stop(_)));
    assert!(!engine.called(FakeOp::ComposeUp));
}

#[test]
fn test_stop_failure_reports_the_old_instance_output() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new()
        .with_remote(LATEST, "sha256:new", &[])
        .with_running("sha256:old")
        .with_logs("old instance: db connection lost")
        .fail(FakeOp::ComposeDown);
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let failure = RolloutController::new(&gateway, &engine, &plan).run().unwrap_err();

    assert_eq!(failure.failed_during, RolloutPhase::Stopping);
    assert_eq!(
        failure.log_tail.as_deref(),
        Some("old instance: db connection lost")
    );
    assert_eq!(engine.running_image().unwrap().0, "sha256:old");
}

#[test]
fn test_pull_failure_reports_the_running_instance_output() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new()
        .with_running("sha256:old")
        .with_logs("serving on :8080");
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let failure = RolloutController::new(&gateway, &engine, &plan).run().unwrap_err();

    assert_eq!(failure.failed_during, RolloutPhase::Pulling);
    assert_eq!(failure.log_tail.as_deref(), Some("serving on :8080"));
    assert!(!engine.called(FakeOp::ComposeDown));
}

#[test]
fn test_unreadable_logs_do_not_mask_a_stop_failure() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new()
        .with_remote(LATEST, "sha256:new", &[])
        .fail(FakeOp::ComposeDown)
        .fail(FakeOp::Logs);
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let failure = RolloutController::new(&gateway, &engine, &plan).run().unwrap_err();

    assert!(matches!(failure.error, RolloutError::Stop(_)));
    assert!(failure.log_tail.is_none());
}

#[test]
fn test_start_failure_collects_logs() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new()
        .with_remote(LATEST, "sha256:new", &[])
        .with_logs("port is already allocated")
        .fail(FakeOp::ComposeUp);
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let failure = RolloutController::new(&gateway, &engine, &plan).run().unwrap_err();

    assert_eq!(failure.failed_during, RolloutPhase::Starting);
    assert!(matches!(failure.error, RolloutError::Start(_)));
    assert_eq!(failure.log_tail.as_deref(), Some("port is already allocated"));
    assert!(!engine.called(FakeOp::IsRunning));
}

#[test]
fn test_unreadable_logs_after_healthy_is_a_warning() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new()
        .with_remote(LATEST, "sha256:new", &[])
        .fail(FakeOp::Logs);
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let report = RolloutController::new(&gateway, &engine, &plan).run().unwrap();

    assert!(report.log_tail.is_none());
    let last = report.progress.records().last().unwrap();
    assert_eq!((last.step, last.status), (Step::Verify, StepStatus::Warning));
}

#[test]
fn test_every_invocation_fetches_fresh_credentials() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new().with_remote(LATEST, "sha256:new", &[]);
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    RolloutController::new(&gateway, &engine, &plan).run().unwrap();
    RolloutController::new(&gateway, &engine, &plan).run().unwrap();

    assert_eq!(api.count(ApiOp::Token), 2);
    let logins = engine.calls().iter().filter(|c| **c == FakeOp::Login).count();
    assert_eq!(logins, 2);
}

#[test]
fn test_first_rollout_with_nothing_running_is_healthy() {
    let state = host_state();
    let plan = plan_for(state.path(), "");
    let api = FakeRegistry::new(CALLER);
    let engine = FakeEngine::new().with_remote(LATEST, "sha256:first", &[]);
    let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

    let report = RolloutController::new(&gateway, &engine, &plan).run().unwrap();

    assert!(engine.called(FakeOp::ComposeDown));
    assert_eq!(engine.running_image().unwrap().0, "sha256:first");
    assert_eq!(report.progress.failed_step(), None);
}
