//! In-memory registry control API for tests.

use std::collections::BTreeSet;
use std::sync::Mutex;

use hoist_core::config::DEFAULT_DOMAIN;
use hoist_core::{AccountId, Region, RepositoryName, SecretString, registry_host};

use crate::api::{RegistryApi, RepositoryRecord};
use crate::error::RegistryApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApiOp {
    Identity,
    List,
    Create,
    Token,
}

#[derive(Debug, Default)]
struct State {
    /// (account, region, record)
    repositories: Vec<(String, String, RepositoryRecord)>,
    calls: Vec<ApiOp>,
    failing: BTreeSet<ApiOp>,
    tokens_issued: u32,
}

#[derive(Debug)]
pub struct FakeRegistry {
    caller: String,
    state: Mutex<State>,
}

impl FakeRegistry {
    /// A registry whose caller identity resolves to `caller`.
    pub fn new(caller: &str) -> Self {
        Self {
            caller: caller.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_repository(self, account: &str, region: &str, name: &str) -> Self {
        let record = record(account, region, name);
        self.lock()
            .repositories
            .push((account.to_string(), region.to_string(), record));
        self
    }

    pub fn fail(self, op: ApiOp) -> Self {
        self.lock().failing.insert(op);
        self
    }

    pub fn count(&self, op: ApiOp) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn enter(&self, op: ApiOp) -> Result<std::sync::MutexGuard<'_, State>, RegistryApiError> {
        let mut state = self.lock();
        state.calls.push(op);
        if state.failing.contains(&op) {
            return Err(RegistryApiError::Failed {
                command: format!("fake {op:?}"),
                code: Some(254),
                detail: "AccessDeniedException".to_string(),
            });
        }
        Ok(state)
    }
}

fn record(account: &str, region: &str, name: &str) -> RepositoryRecord {
    let host = match (AccountId::new(account), Region::new(region)) {
        (Ok(account), Ok(region)) => registry_host(&account, &region, DEFAULT_DOMAIN),
        _ => format!("{account}.dkr.ecr.{region}.{DEFAULT_DOMAIN}"),
    };
    RepositoryRecord {
        repository_name: name.to_string(),
        repository_uri: format!("{host}/{name}"),
    }
}

impl RegistryApi for FakeRegistry {
    fn caller_account(&self) -> Result<AccountId, RegistryApiError> {
        drop(self.enter(ApiOp::Identity)?);
        Ok(AccountId::new(&self.caller)?)
    }

    fn list_repositories(
        &self,
        registry: &AccountId,
        region: &Region,
    ) -> Result<Vec<RepositoryRecord>, RegistryApiError> {
        let state = self.enter(ApiOp::List)?;
        Ok(state
            .repositories
            .iter()
            .filter(|(a, r, _)| a == registry.as_str() && r == region.as_str())
            .map(|(_, _, record)| record.clone())
            .collect())
    }

    fn create_repository(
        &self,
        registry: &AccountId,
        region: &Region,
        name: &RepositoryName,
    ) -> Result<RepositoryRecord, RegistryApiError> {
        let mut state = self.enter(ApiOp::Create)?;
        let created = record(registry.as_str(), region.as_str(), name.as_str());
        state.repositories.push((
            registry.to_string(),
            region.to_string(),
            created.clone(),
        ));
        Ok(created)
    }

    fn login_password(&self, _region: &Region) -> Result<SecretString, RegistryApiError> {
        let mut state = self.enter(ApiOp::Token)?;
        state.tokens_issued += 1;
        Ok(SecretString::from(format!("token-{}", state.tokens_issued)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_lookup_releases_the_state() {
        let api = FakeRegistry::new("acct1");

        assert_eq!(api.caller_account().unwrap().as_str(), "acct1");
        assert_eq!(api.caller_account().unwrap().as_str(), "acct1");
        let region = Region::new("us-east-2").unwrap();
        assert!(api.list_repositories(&AccountId::new("acct1").unwrap(), &region).unwrap().is_empty());
        assert_eq!(api.count(ApiOp::Identity), 2);
    }
}
