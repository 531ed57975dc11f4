//! Registry Gateway: identity, authentication, and repository bootstrap.

use chrono::Utc;
use hoist_core::{
    AccountId, ContainerEngine, Credentials, Region, RepositoryName, RepositoryRef, registry_host,
};
use tracing::{debug, info};

use crate::api::RegistryApi;
use crate::error::GatewayError;

/// Whose registry to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tenant {
    /// The account of the caller's own credentials, resolved at call time.
    Caller,
    /// A fixed registry account in a different tenant than the caller.
    /// Only the host-time rollout uses this.
    CrossAccount(AccountId),
}

impl Tenant {
    pub fn from_override(account: Option<AccountId>) -> Self {
        match account {
            Some(account) => Tenant::CrossAccount(account),
            None => Tenant::Caller,
        }
    }
}

pub struct RegistryGateway<'a, A, E> {
    api: &'a A,
    engine: &'a E,
    domain: String,
}

impl<'a, A: RegistryApi, E: ContainerEngine> RegistryGateway<'a, A, E> {
    pub fn new(api: &'a A, engine: &'a E, domain: &str) -> Self {
        Self {
            api,
            engine,
            domain: domain.to_string(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn resolve(&self, tenant: &Tenant) -> Result<AccountId, GatewayError> {
        match tenant {
            Tenant::CrossAccount(account) => {
                debug!(account = %account, "using cross-account registry");
                Ok(account.clone())
            }
            Tenant::Caller => self
                .api
                .caller_account()
                .map_err(|e| GatewayError::auth("resolving caller identity", e)),
        }
    }

    /// Make sure the repository exists, creating it only when absent.
    ///
    /// Existing repositories are matched by fully-qualified URI, so repeated
    /// calls return the same reference and never issue a second create.
    pub fn ensure_repository(
        &self,
        tenant: &Tenant,
        region: &Region,
        name: &RepositoryName,
    ) -> Result<RepositoryRef, GatewayError> {
        let account = self.resolve(tenant)?;
        let expected = RepositoryRef::new(account.clone(), region.clone(), name.clone(), &self.domain);

        let existing = self
            .api
            .list_repositories(&account, region)
            .map_err(|source| GatewayError::RepositoryLookup {
                region: region.to_string(),
                source,
            })?;

        if existing.iter().any(|r| r.repository_uri == expected.uri) {
            info!(repository = %expected.uri, "repository exists");
            return Ok(expected);
        }

        info!(repository = %expected.uri, "repository absent, creating");
        let created = self
            .api
            .create_repository(&account, region, name)
            .map_err(|source| GatewayError::RepositoryProvision {
                repository: expected.uri.clone(),
                source,
            })?;

        if created.repository_uri != expected.uri {
            return Err(GatewayError::RepositoryMismatch {
                expected: expected.uri,
                actual: created.repository_uri,
            });
        }

        info!(repository = %expected.uri, "repository created");
        Ok(expected)
    }

    /// Fetch a fresh login token and attach it to the engine's session.
    ///
    /// The returned credentials are for this pipeline run only.
    pub fn authenticate(&self, tenant: &Tenant, region: &Region) -> Result<Credentials, GatewayError> {
        let account = self.resolve(tenant)?;
        let token = self
            .api
            .login_password(region)
            .map_err(|e| GatewayError::auth("fetching registry login token", e))?;

        let credentials = Credentials {
            registry_host: registry_host(&account, region, &self.domain),
            account,
            region: region.clone(),
            token,
            issued_at: Utc::now(),
        };

        self.engine
            .login(&credentials)
            .map_err(|e| GatewayError::auth("logging the container engine in", e))?;

        info!(
            registry = %credentials.registry_host,
            expires_at = %credentials.expires_at().to_rfc3339(),
            "authenticated"
        );
        Ok(credentials)
    }

    /// Address a repository in the authenticated registry without touching it.
    pub fn locate(&self, credentials: &Credentials, name: &RepositoryName) -> RepositoryRef {
        RepositoryRef::new(
            credentials.account.clone(),
            credentials.region.clone(),
            name.clone(),
            &self.domain,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{ApiOp, FakeRegistry};
    use hoist_core::fake::{FakeEngine, FakeOp};

    fn region() -> Region {
        Region::new("us-east-2").unwrap()
    }

    fn name() -> RepositoryName {
        RepositoryName::new("ns/svc").unwrap()
    }

    #[test]
    fn ensure_repository_creates_once() {
        let api = FakeRegistry::new("acct1");
        let engine = FakeEngine::new();
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

        let first = gateway
            .ensure_repository(&Tenant::Caller, &region(), &name())
            .unwrap();
        let second = gateway
            .ensure_repository(&Tenant::Caller, &region(), &name())
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.uri, "acct1.dkr.ecr.us-east-2.amazonaws.com/ns/svc");
        assert_eq!(api.count(ApiOp::Create), 1);
        assert_eq!(api.count(ApiOp::List), 2);
    }

    #[test]
    fn ensure_repository_is_quiet_when_repository_exists() {
        let api = FakeRegistry::new("acct1").with_repository("acct1", "us-east-2", "ns/svc");
        let engine = FakeEngine::new();
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

        for _ in 0..3 {
            gateway
                .ensure_repository(&Tenant::Caller, &region(), &name())
                .unwrap();
        }
        assert_eq!(api.count(ApiOp::Create), 0);
    }

    #[test]
    fn same_name_in_other_region_does_not_count() {
        let api = FakeRegistry::new("acct1").with_repository("acct1", "eu-west-1", "ns/svc");
        let engine = FakeEngine::new();
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

        gateway
            .ensure_repository(&Tenant::Caller, &region(), &name())
            .unwrap();
        assert_eq!(api.count(ApiOp::Create), 1);
    }

    #[test]
    fn create_failure_is_fatal_and_not_retried() {
        let api = FakeRegistry::new("acct1").fail(ApiOp::Create);
        let engine = FakeEngine::new();
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

        let err = gateway
            .ensure_repository(&Tenant::Caller, &region(), &name())
            .unwrap_err();
        assert!(matches!(err, GatewayError::RepositoryProvision { .. }));
        assert_eq!(api.count(ApiOp::Create), 1);
    }

    #[test]
    fn list_failure_is_a_lookup_error() {
        let api = FakeRegistry::new("acct1").fail(ApiOp::List);
        let engine = FakeEngine::new();
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

        let err = gateway
            .ensure_repository(&Tenant::Caller, &region(), &name())
            .unwrap_err();
        assert!(matches!(err, GatewayError::RepositoryLookup { .. }));
        assert_eq!(api.count(ApiOp::Create), 0);
    }

    #[test]
    fn authenticate_logs_engine_in() {
        let api = FakeRegistry::new("acct1");
        let engine = FakeEngine::new();
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

        let creds = gateway.authenticate(&Tenant::Caller, &region()).unwrap();
        assert_eq!(creds.registry_host, "acct1.dkr.ecr.us-east-2.amazonaws.com");
        assert!(engine.logged_in("acct1.dkr.ecr.us-east-2.amazonaws.com"));
    }

    #[test]
    fn cross_account_skips_identity_lookup() {
        let api = FakeRegistry::new("acct1");
        let engine = FakeEngine::new();
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");
        let tenant = Tenant::from_override(Some(AccountId::new("999988887777").unwrap()));

        let creds = gateway.authenticate(&tenant, &region()).unwrap();
        assert_eq!(creds.account.as_str(), "999988887777");
        assert_eq!(api.count(ApiOp::Identity), 0);
        assert!(engine.logged_in("999988887777.dkr.ecr.us-east-2.amazonaws.com"));
    }

    #[test]
    fn token_failure_never_reaches_engine() {
        let api = FakeRegistry::new("acct1").fail(ApiOp::Token);
        let engine = FakeEngine::new();
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

        let err = gateway.authenticate(&Tenant::Caller, &region()).unwrap_err();
        assert!(matches!(err, GatewayError::Authentication { .. }));
        assert!(!engine.called(FakeOp::Login));
    }

    #[test]
    fn engine_login_failure_is_authentication_error() {
        let api = FakeRegistry::new("acct1");
        let engine = FakeEngine::new().fail(FakeOp::Login);
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

        let err = gateway.authenticate(&Tenant::Caller, &region()).unwrap_err();
        assert!(err.to_string().contains("logging the container engine in"));
    }

    #[test]
    fn each_authentication_fetches_a_new_token() {
        let api = FakeRegistry::new("acct1");
        let engine = FakeEngine::new();
        let gateway = RegistryGateway::new(&api, &engine, "amazonaws.com");

        gateway.authenticate(&Tenant::Caller, &region()).unwrap();
        gateway.authenticate(&Tenant::Caller, &region()).unwrap();
        assert_eq!(api.count(ApiOp::Token), 2);
    }
}
