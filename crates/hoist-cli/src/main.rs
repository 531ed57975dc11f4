use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use hoist_core::{ConfigError, HoistConfig, Settings};
use hoist_core::config::DEFAULT_CONFIG_FILE;

use crate::pipeline::PipelineError;

mod commands;
mod pipeline;

#[derive(Parser)]
#[command(
    name = "hoist",
    about = "hoist: build, publish, and roll out a containerised service",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to hoist.toml. A missing file means defaults plus environment.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Log output format (logs go to stderr).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the source tree and publish it under a tag and `latest`.
    Release {
        /// Source tree to build (default: current directory)
        #[arg(short, long, default_value = ".")]
        path: String,
        /// Tag to publish in addition to `latest` (default: [publish].default_tag)
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Replace the running instance on this host with the image at `latest`.
    Rollout,
    /// Point `latest` at an already-published tag.
    ///
    /// Repairs a stale `latest` after a partial publish, or rolls back when
    /// given an older version. Does not restart the host.
    Promote {
        tag: String,
    },
    /// Create the registry repository if it does not exist.
    Repo,
    /// Show whether the service is running, with its recent output.
    Status,
    /// Print the resolved settings as JSON.
    Config,
    /// Generate a hoist.toml scaffold.
    Init {
        #[arg(short, long, default_value = ".")]
        path: String,
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        image: String,
    },
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("hoist=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    HoistConfig::load(path)?
        .apply_env(|key| std::env::var(key).ok())
        .validate()
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = || load_settings(&cli.config);
    match cli.command {
        Commands::Release { path, tag } => {
            commands::release::release(&settings()?, &path, tag.as_deref())
        }
        Commands::Rollout => commands::rollout::rollout(&settings()?),
        Commands::Promote { tag } => commands::promote::promote(&settings()?, &tag),
        Commands::Repo => commands::repo::repo(&settings()?),
        Commands::Status => commands::status::status(&settings()?),
        Commands::Config => commands::config::show(&settings()?),
        Commands::Init {
            path,
            namespace,
            image,
        } => commands::init::init(&path, &namespace, &image),
    }
}

/// 2 for configuration and usage problems, 3 for a stale `latest`,
/// 1 for everything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(pipeline) = cause.downcast_ref::<PipelineError>() {
            return pipeline.exit_code();
        }
        if cause.is::<ConfigError>() {
            return 2;
        }
    }
    1
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_format) {
        eprintln!("error: {e:#}");
        return ExitCode::from(2);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
