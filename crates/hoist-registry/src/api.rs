//! Registry control API port and its `aws` CLI adapter.

use hoist_core::{AccountId, CommandOutput, CommandRunner, Invocation, Region, RepositoryName, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::RegistryApiError;

/// A repository as the registry reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub repository_name: String,
    pub repository_uri: String,
}

/// Identity and repository management calls against the registry provider.
pub trait RegistryApi {
    /// Account of the caller's own credentials.
    fn caller_account(&self) -> Result<AccountId, RegistryApiError>;

    fn list_repositories(
        &self,
        registry: &AccountId,
        region: &Region,
    ) -> Result<Vec<RepositoryRecord>, RegistryApiError>;

    fn create_repository(
        &self,
        registry: &AccountId,
        region: &Region,
        name: &RepositoryName,
    ) -> Result<RepositoryRecord, RegistryApiError>;

    /// A fresh registry login token for `region`.
    fn login_password(&self, region: &Region) -> Result<SecretString, RegistryApiError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
}

#[derive(Deserialize)]
struct DescribeRepositories {
    #[serde(default)]
    repositories: Vec<RepositoryRecord>,
}

#[derive(Deserialize)]
struct CreateRepository {
    repository: RepositoryRecord,
}

/// [`RegistryApi`] backed by the `aws` CLI.
#[derive(Debug, Clone)]
pub struct AwsCli<R> {
    runner: R,
}

impl<R: CommandRunner> AwsCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn check(&self, invocation: Invocation) -> Result<(String, CommandOutput), RegistryApiError> {
        let command = invocation.to_string();
        debug!(%command, "registry api call");
        let output = self.runner.run(invocation)?;
        if !output.success() {
            return Err(RegistryApiError::Failed {
                command,
                code: output.code,
                detail: output.diagnostic().to_string(),
            });
        }
        Ok((command, output))
    }

    fn json<T: for<'de> Deserialize<'de>>(&self, invocation: Invocation) -> Result<T, RegistryApiError> {
        let (command, output) = self.check(invocation)?;
        serde_json::from_str(&output.stdout).map_err(|e| RegistryApiError::Decode {
            command,
            detail: e.to_string(),
        })
    }
}

impl<R: CommandRunner> RegistryApi for AwsCli<R> {
    fn caller_account(&self) -> Result<AccountId, RegistryApiError> {
        let identity: CallerIdentity = self.json(
            Invocation::new("aws").args(["sts", "get-caller-identity", "--output", "json"]),
        )?;
        Ok(AccountId::new(&identity.account)?)
    }

    fn list_repositories(
        &self,
        registry: &AccountId,
        region: &Region,
    ) -> Result<Vec<RepositoryRecord>, RegistryApiError> {
        let listing: DescribeRepositories = self.json(
            Invocation::new("aws")
                .args(["ecr", "describe-repositories", "--registry-id"])
                .arg(registry.as_str())
                .arg("--region")
                .arg(region.as_str())
                .args(["--output", "json"]),
        )?;
        Ok(listing.repositories)
    }

    fn create_repository(
        &self,
        registry: &AccountId,
        region: &Region,
        name: &RepositoryName,
    ) -> Result<RepositoryRecord, RegistryApiError> {
        let created: CreateRepository = self.json(
            Invocation::new("aws")
                .args(["ecr", "create-repository", "--registry-id"])
                .arg(registry.as_str())
                .arg("--repository-name")
                .arg(name.as_str())
                .arg("--region")
                .arg(region.as_str())
                .args(["--output", "json"]),
        )?;
        Ok(created.repository)
    }

    fn login_password(&self, region: &Region) -> Result<SecretString, RegistryApiError> {
        let (command, output) = self.check(
            Invocation::new("aws")
                .args(["ecr", "get-login-password", "--region"])
                .arg(region.as_str()),
        )?;
        let token = output.stdout.trim();
        if token.is_empty() {
            return Err(RegistryApiError::Decode {
                command,
                detail: "empty login token".to_string(),
            });
        }
        Ok(SecretString::from(token))
    }
}
