//! hoist.toml configuration parser.
//!
//! Configuration is read once: file, then environment overrides, then
//! [`HoistConfig::validate`] produces the typed [`Settings`] every component
//! receives. Nothing downstream reads the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::engine::ComposeProject;
use crate::types::{AccountId, Region, RepositoryName, Tag, TypeError};

pub const DEFAULT_CONFIG_FILE: &str = "hoist.toml";
pub const DEFAULT_REGION: &str = "us-east-2";
pub const DEFAULT_DOMAIN: &str = "amazonaws.com";
pub const DEFAULT_STATE_DIR: &str = "/opt/app";

/// Environment variables consulted by [`HoistConfig::apply_env`].
pub mod env {
    pub const REGION: &str = "HOIST_REGION";
    pub const AWS_REGION: &str = "AWS_REGION";
    pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
    pub const REGISTRY_ACCOUNT: &str = "HOIST_REGISTRY_ACCOUNT";
    pub const NAMESPACE: &str = "HOIST_NAMESPACE";
    pub const IMAGE: &str = "HOIST_IMAGE";
    pub const DEFAULT_TAG: &str = "HOIST_DEFAULT_TAG";
    pub const REVISION: &str = "HOIST_REVISION";
    pub const STATE_DIR: &str = "HOIST_STATE_DIR";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid `{field}`: {source}")]
    Invalid {
        field: &'static str,
        #[source]
        source: TypeError,
    },

    #[error("invalid `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Raw, unvalidated file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HoistConfig {
    pub registry: RegistryConfig,
    pub build: BuildConfig,
    pub publish: PublishConfig,
    pub rollout: RolloutConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub region: Option<String>,
    pub namespace: Option<String>,
    pub image: Option<String>,
    /// DNS suffix of the registry endpoint (`amazonaws.com.cn` in China regions).
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub context: Option<PathBuf>,
    pub dockerfile: Option<PathBuf>,
    /// Runtime-served assets that must be part of the build context.
    /// An empty string disables the check.
    pub static_dir: Option<String>,
    /// Pinned source revision; normally resolved from git.
    pub revision: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub default_tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RolloutConfig {
    pub state_dir: Option<PathBuf>,
    pub compose_file: Option<String>,
    pub env_file: Option<String>,
    pub helper: Option<String>,
    pub container: Option<String>,
    pub settle_secs: Option<u64>,
    pub log_tail_lines: Option<usize>,
    /// Registry account used for host-time authentication when the registry
    /// lives in a different account than the host.
    pub registry_account: Option<String>,
}

impl HoistConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `path` if it exists; otherwise start from defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.is_file() {
            debug!(path = %path.display(), "loading config");
            Self::from_file(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Overlay environment values. `lookup` is usually `|k| std::env::var(k).ok()`.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(region) = get(env::REGION)
            .or_else(|| get(env::AWS_REGION))
            .or_else(|| get(env::AWS_DEFAULT_REGION))
        {
            self.registry.region = Some(region);
        }
        if let Some(namespace) = get(env::NAMESPACE) {
            self.registry.namespace = Some(namespace);
        }
        if let Some(image) = get(env::IMAGE) {
            self.registry.image = Some(image);
        }
        if let Some(tag) = get(env::DEFAULT_TAG) {
            self.publish.default_tag = Some(tag);
        }
        if let Some(revision) = get(env::REVISION) {
            self.build.revision = Some(revision);
        }
        if let Some(dir) = get(env::STATE_DIR) {
            self.rollout.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(account) = get(env::REGISTRY_ACCOUNT) {
            self.rollout.registry_account = Some(account);
        }
        self
    }

    /// Validate everything once and produce typed settings.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let region = Region::new(self.registry.region.as_deref().unwrap_or(DEFAULT_REGION))
            .map_err(|source| ConfigError::Invalid {
                field: "registry.region",
                source,
            })?;
        let image = self
            .registry
            .image
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("registry.image"))?;
        let repository =
            RepositoryName::from_parts(self.registry.namespace.as_deref().unwrap_or(""), image)
                .map_err(|source| ConfigError::Invalid {
                    field: "registry.namespace/registry.image",
                    source,
                })?;
        let domain = self
            .registry
            .domain
            .clone()
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
        if domain.is_empty() || domain.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "registry.domain",
                reason: format!("{domain:?} is not a DNS suffix"),
            });
        }

        let default_tag = Tag::new(self.publish.default_tag.as_deref().unwrap_or(crate::LATEST))
            .map_err(|source| ConfigError::Invalid {
                field: "publish.default_tag",
                source,
            })?;

        let registry_account = match self.rollout.registry_account.as_deref() {
            None => None,
            Some(raw) => {
                let account = AccountId::new(raw).map_err(|source| ConfigError::Invalid {
                    field: "rollout.registry_account",
                    source,
                })?;
                if !account.is_aws_account() {
                    return Err(ConfigError::InvalidValue {
                        field: "rollout.registry_account",
                        reason: format!("{raw:?} is not a 12-digit account id"),
                    });
                }
                Some(account)
            }
        };

        let log_tail_lines = self.rollout.log_tail_lines.unwrap_or(50);
        if log_tail_lines == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rollout.log_tail_lines",
                reason: "must be at least 1".to_string(),
            });
        }

        let state_dir = self
            .rollout
            .state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

        Ok(Settings {
            registry: RegistrySettings {
                region,
                repository,
                domain,
            },
            build: BuildSettings {
                context: self.build.context.clone().unwrap_or_else(|| PathBuf::from(".")),
                dockerfile: self
                    .build
                    .dockerfile
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("Dockerfile")),
                static_dir: match self.build.static_dir.as_deref() {
                    None => Some(PathBuf::from("static")),
                    Some("") => None,
                    Some(dir) => Some(PathBuf::from(dir)),
                },
                revision: self.build.revision.clone(),
            },
            publish: PublishSettings { default_tag },
            rollout: RolloutSettings {
                compose_file: state_dir.join(
                    self.rollout
                        .compose_file
                        .as_deref()
                        .unwrap_or("docker-compose.yml"),
                ),
                env_file: state_dir.join(self.rollout.env_file.as_deref().unwrap_or(".env")),
                helper: state_dir.join(self.rollout.helper.as_deref().unwrap_or("update.sh")),
                state_dir,
                container: self
                    .rollout
                    .container
                    .clone()
                    .unwrap_or_else(|| image.to_string()),
                settle_secs: self.rollout.settle_secs.unwrap_or(5),
                log_tail_lines,
                registry_account,
            },
        })
    }

    /// Scaffold a minimal hoist.toml for a service.
    pub fn scaffold(namespace: &str, image: &str) -> Self {
        HoistConfig {
            registry: RegistryConfig {
                region: Some(DEFAULT_REGION.to_string()),
                namespace: Some(namespace.to_string()),
                image: Some(image.to_string()),
                domain: None,
            },
            build: BuildConfig {
                context: Some(PathBuf::from(".")),
                dockerfile: Some(PathBuf::from("Dockerfile")),
                static_dir: Some("static".to_string()),
                revision: None,
            },
            publish: PublishConfig {
                default_tag: Some(crate::LATEST.to_string()),
            },
            rollout: RolloutConfig {
                state_dir: Some(PathBuf::from(DEFAULT_STATE_DIR)),
                compose_file: Some("docker-compose.yml".to_string()),
                env_file: Some(".env".to_string()),
                helper: Some("update.sh".to_string()),
                container: Some(image.to_string()),
                settle_secs: Some(5),
                log_tail_lines: Some(50),
                registry_account: None,
            },
        }
    }
}

/// Validated configuration handed to every component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub registry: RegistrySettings,
    pub build: BuildSettings,
    pub publish: PublishSettings,
    pub rollout: RolloutSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySettings {
    pub region: Region,
    pub repository: RepositoryName,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSettings {
    pub context: PathBuf,
    pub dockerfile: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub revision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishSettings {
    pub default_tag: Tag,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolloutSettings {
    pub state_dir: PathBuf,
    pub compose_file: PathBuf,
    pub env_file: PathBuf,
    pub helper: PathBuf,
    pub container: String,
    pub settle_secs: u64,
    pub log_tail_lines: usize,
    pub registry_account: Option<AccountId>,
}

impl RolloutSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn compose_project(&self) -> ComposeProject {
        ComposeProject {
            dir: self.state_dir.clone(),
            compose_file: self.compose_file.clone(),
            env_file: self.env_file.clone(),
        }
    }
}
