//! Typed external command execution.
//!
//! Every call to `docker`, `aws` or `git` goes through a [`CommandRunner`] as
//! an [`Invocation`] and comes back as a [`CommandOutput`]. Adapters decide
//! what a non-zero exit means; nothing here turns it into an error.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::debug;


#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to pass input to {program}: {source}")]
    Stdin {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// One external command, fully described before it runs.
#[derive(Debug)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Written to the child's stdin, then closed. Never logged.
    pub stdin: Option<SecretString>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, secret: SecretString) -> Self {
        self.stdin = Some(secret);
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// The most useful diagnostic text: stderr if any, otherwise stdout.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() { self.stdout.trim() } else { stderr }
    }
}

/// Runs an [`Invocation`] to completion.
pub trait CommandRunner {
    fn run(&self, invocation: Invocation) -> Result<CommandOutput, ExecError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: Invocation) -> Result<CommandOutput, ExecError> {
        (**self).run(invocation)
    }
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: Invocation) -> Result<CommandOutput, ExecError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        debug!("Running: {}", invocation);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        if let Some(secret) = &invocation.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(secret.expose_secret().as_bytes())
                    .map_err(|source| ExecError::Stdin {
                        program: invocation.program.clone(),
                        source,
                    })?;
            }
        }

        let output = child.wait_with_output().map_err(|source| ExecError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
