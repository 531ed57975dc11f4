//! Container engine port and its `docker` CLI adapter.

use std::collections::BTreeMap;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::debug;

use crate::exec::{CommandOutput, CommandRunner, ExecError, Invocation};
use crate::types::{Credentials, ImageId, ImageRef};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("`{command}` failed (exit code: {code:?}): {detail}")]
    Failed {
        command: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("could not decode output of `{command}`: {detail}")]
    Decode { command: String, detail: String },
}

/// Inputs for one image build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub context: PathBuf,
    pub dockerfile: PathBuf,
    /// Local reference the built image is tagged with.
    pub local_ref: String,
    pub labels: BTreeMap<String, String>,
    pub build_args: BTreeMap<String, String>,
}

/// The persisted host-side description of how to run the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    pub dir: PathBuf,
    pub compose_file: PathBuf,
    pub env_file: PathBuf,
}

/// Everything the pipelines need from a container runtime.
pub trait ContainerEngine {
    /// Attach registry credentials to the engine's session.
    fn login(&self, credentials: &Credentials) -> Result<(), EngineError>;

    fn build(&self, request: &BuildRequest) -> Result<ImageId, EngineError>;

    /// Point `target` at the local image `source`.
    fn tag(&self, source: &str, target: &ImageRef) -> Result<(), EngineError>;

    fn push(&self, image: &ImageRef) -> Result<(), EngineError>;

    fn pull(&self, image: &ImageRef) -> Result<ImageId, EngineError>;

    /// Labels embedded in a local image.
    fn labels(&self, image: &str) -> Result<BTreeMap<String, String>, EngineError>;

    /// Stop and remove the project's containers. Succeeds when nothing runs.
    fn compose_down(&self, project: &ComposeProject) -> Result<(), EngineError>;

    /// Create and start the project's containers, detached.
    fn compose_up(&self, project: &ComposeProject) -> Result<(), EngineError>;

    fn is_running(&self, container: &str) -> Result<bool, EngineError>;

    /// Last `lines` lines of the container's combined output.
    fn logs(&self, container: &str, lines: usize) -> Result<String, EngineError>;
}

/// [`ContainerEngine`] backed by the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli<R> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> DockerCli<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            program: "docker".to_string(),
        }
    }

    fn docker(&self) -> Invocation {
        Invocation::new(&self.program)
    }

    fn compose(&self, project: &ComposeProject) -> Invocation {
        self.docker()
            .arg("compose")
            .arg("--project-directory")
            .arg(project.dir.display().to_string())
            .arg("-f")
            .arg(project.compose_file.display().to_string())
            .arg("--env-file")
            .arg(project.env_file.display().to_string())
    }

    /// Run and require a zero exit code.
    fn check(&self, invocation: Invocation) -> Result<CommandOutput, EngineError> {
        let command = invocation.to_string();
        let output = self.runner.run(invocation)?;
        if !output.success() {
            return Err(EngineError::Failed {
                command,
                code: output.code,
                detail: output.diagnostic().to_string(),
            });
        }
        Ok(output)
    }

    fn image_id(&self, image: &str) -> Result<ImageId, EngineError> {
        let out = self.check(
            self.docker()
                .args(["image", "inspect", "--format", "{{.Id}}", image]),
        )?;
        let id = out.stdout.trim();
        if id.is_empty() {
            return Err(EngineError::Decode {
                command: format!("{} image inspect {image}", self.program),
                detail: "empty image id".to_string(),
            });
        }
        Ok(ImageId(id.to_string()))
    }
}

impl<R: CommandRunner> ContainerEngine for DockerCli<R> {
    fn login(&self, credentials: &Credentials) -> Result<(), EngineError> {
        self.check(
            self.docker()
                .args(["login", "--username", "AWS", "--password-stdin"])
                .arg(&credentials.registry_host)
                .stdin(SecretString::from(credentials.token.expose_secret())),
        )?;
        Ok(())
    }

    fn build(&self, request: &BuildRequest) -> Result<ImageId, EngineError> {
        let mut inv = self
            .docker()
            .arg("build")
            .arg("-f")
            .arg(request.dockerfile.display().to_string())
            .arg("-t")
            .arg(&request.local_ref);
        for (key, value) in &request.labels {
            inv = inv.arg("--label").arg(format!("{key}={value}"));
        }
        for (key, value) in &request.build_args {
            inv = inv.arg("--build-arg").arg(format!("{key}={value}"));
        }
        inv = inv.arg(request.context.display().to_string());

        self.check(inv)?;
        self.image_id(&request.local_ref)
    }

    fn tag(&self, source: &str, target: &ImageRef) -> Result<(), EngineError> {
        self.check(self.docker().arg("tag").arg(source).arg(target.to_string()))?;
        Ok(())
    }

    fn push(&self, image: &ImageRef) -> Result<(), EngineError> {
        self.check(self.docker().arg("push").arg(image.to_string()))?;
        Ok(())
    }

    fn pull(&self, image: &ImageRef) -> Result<ImageId, EngineError> {
        let reference = image.to_string();
        self.check(self.docker().arg("pull").arg(&reference))?;
        self.image_id(&reference)
    }

    fn labels(&self, image: &str) -> Result<BTreeMap<String, String>, EngineError> {
        let out = self.check(self.docker().args([
            "image",
            "inspect",
            "--format",
            "{{json .Config.Labels}}",
            image,
        ]))?;
        let labels: Option<BTreeMap<String, String>> = serde_json::from_str(out.stdout.trim())
            .map_err(|e| EngineError::Decode {
                command: format!("{} image inspect {image}", self.program),
                detail: e.to_string(),
            })?;
        Ok(labels.unwrap_or_default())
    }

    fn compose_down(&self, project: &ComposeProject) -> Result<(), EngineError> {
        self.check(self.compose(project).arg("down"))?;
        Ok(())
    }

    fn compose_up(&self, project: &ComposeProject) -> Result<(), EngineError> {
        self.check(self.compose(project).args(["up", "-d"]))?;
        Ok(())
    }

    fn is_running(&self, container: &str) -> Result<bool, EngineError> {
        let out = self.check(
            self.docker()
                .arg("ps")
                .arg("--filter")
                .arg(format!("name=^/?{container}$"))
                .args(["--filter", "status=running", "--format", "{{.Names}}"]),
        )?;
        let running = out.stdout.lines().any(|name| name.trim() == container);
        debug!(container, running, "container status");
        Ok(running)
    }

    fn logs(&self, container: &str, lines: usize) -> Result<String, EngineError> {
        let out = self.check(
            self.docker()
                .arg("logs")
                .arg("--tail")
                .arg(lines.to_string())
                .arg(container),
        )?;
        // docker logs replays the container's stderr on its own stderr.
        let mut combined = out.stdout;
        if !out.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&out.stderr);
        }
        Ok(combined)
    }
}
