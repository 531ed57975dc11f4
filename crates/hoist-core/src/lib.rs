//! hoist core: shared types, configuration, typed command execution, the
//! container engine port, and the per-run progress trace.

pub mod config;
pub mod engine;
pub mod exec;
pub mod progress;
pub mod types;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use config::{ConfigError, HoistConfig, Settings};
pub use engine::{BuildRequest, ComposeProject, ContainerEngine, DockerCli, EngineError};
pub use exec::{CommandOutput, CommandRunner, ExecError, Invocation, SystemRunner};
pub use progress::{Progress, Step, StepRecord, StepStatus};
pub use types::*;
pub use secrecy::{ExposeSecret, SecretString};
