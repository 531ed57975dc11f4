//! Shared types used across hoist crates.
//!
//! Identifiers are validated newtypes: once a `Region`, `RepositoryName` or
//! `Tag` exists it is known to be well formed, so components never re-check.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The tag every successful publish rebinds and every rollout pulls.
pub const LATEST: &str = "latest";

/// Registry login tokens are valid for twelve hours after issue.
pub const CREDENTIAL_LIFETIME_HOURS: i64 = 12;

static REGION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("static regex"));

static REPOSITORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$")
        .expect("static regex")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("static regex"));

static AWS_ACCOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{12}$").expect("static regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid account identifier: {0:?}")]
    InvalidAccount(String),
    #[error("invalid region: {0:?} (expected e.g. us-east-2)")]
    InvalidRegion(String),
    #[error("invalid repository name: {0:?} (expected lowercase segments such as ns/svc)")]
    InvalidRepositoryName(String),
    #[error("invalid tag: {0:?}")]
    InvalidTag(String),
}

/// Tenant (account) that owns a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: &str) -> Result<Self, TypeError> {
        let id = id.trim();
        if id.is_empty() || id.contains(['.', '/', ':']) || id.contains(char::is_whitespace) {
            return Err(TypeError::InvalidAccount(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    /// Whether this looks like a real AWS account number (12 digits).
    pub fn is_aws_account(&self) -> bool {
        AWS_ACCOUNT_RE.is_match(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Region a registry lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(String);

impl Region {
    pub fn new(region: &str) -> Result<Self, TypeError> {
        let region = region.trim();
        if !REGION_RE.is_match(region) {
            return Err(TypeError::InvalidRegion(region.to_string()));
        }
        Ok(Self(region.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Namespaced repository name, e.g. `stake-capital/x402-facilitator`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryName(String);

impl RepositoryName {
    pub fn new(name: &str) -> Result<Self, TypeError> {
        let name = name.trim();
        if name.len() > 256 || !REPOSITORY_RE.is_match(name) {
            return Err(TypeError::InvalidRepositoryName(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// Join a namespace and an image name. An empty namespace yields the bare image name.
    pub fn from_parts(namespace: &str, image: &str) -> Result<Self, TypeError> {
        let namespace = namespace.trim_matches('/');
        if namespace.is_empty() {
            Self::new(image)
        } else {
            Self::new(&format!("{namespace}/{image}"))
        }
    }

    /// Last path segment (the image name without namespace).
    pub fn image(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Mutable, human-meaningful pointer to one artifact within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

/// How a tag is interpreted for display and auditing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
    Latest,
    /// Semantic version, with or without a leading `v`.
    Version(semver::Version),
    /// Anything else, typically a branch name such as `main`.
    Label,
}

impl Tag {
    pub fn new(tag: &str) -> Result<Self, TypeError> {
        let tag = tag.trim();
        if !TAG_RE.is_match(tag) {
            return Err(TypeError::InvalidTag(tag.to_string()));
        }
        Ok(Self(tag.to_string()))
    }

    pub fn latest() -> Self {
        Self(LATEST.to_string())
    }

    pub fn is_latest(&self) -> bool {
        self.0 == LATEST
    }

    pub fn kind(&self) -> TagKind {
        if self.is_latest() {
            return TagKind::Latest;
        }
        let bare = self.0.strip_prefix('v').unwrap_or(&self.0);
        match semver::Version::parse(bare) {
            Ok(version) => TagKind::Version(version),
            Err(_) => TagKind::Label,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TagKind {
    pub fn describe(&self) -> String {
        match self {
            TagKind::Latest => "canonical latest".to_string(),
            TagKind::Version(v) => format!("version {v}"),
            TagKind::Label => "label".to_string(),
        }
    }
}

macro_rules! string_newtype {
    ($($ty:ident),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = TypeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(&value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }
    )*};
}

string_newtype!(AccountId, Region, RepositoryName, Tag);

/// Host part of a registry address: `{account}.dkr.ecr.{region}.{domain}`.
pub fn registry_host(account: &AccountId, region: &Region, domain: &str) -> String {
    format!("{account}.dkr.ecr.{region}.{domain}")
}

/// A repository known to exist in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryRef {
    pub account: AccountId,
    pub region: Region,
    pub name: RepositoryName,
    /// Fully-qualified URI without tag, e.g. `123.dkr.ecr.us-east-2.amazonaws.com/ns/svc`.
    pub uri: String,
}

impl RepositoryRef {
    pub fn new(account: AccountId, region: Region, name: RepositoryName, domain: &str) -> Self {
        let uri = format!("{}/{}", registry_host(&account, &region, domain), name);
        Self {
            account,
            region,
            name,
            uri,
        }
    }

    /// Registry host portion of the URI.
    pub fn host(&self) -> &str {
        self.uri.split_once('/').map(|(host, _)| host).unwrap_or(&self.uri)
    }

    pub fn image(&self, tag: &Tag) -> ImageRef {
        ImageRef {
            repository_uri: self.uri.clone(),
            tag: tag.clone(),
        }
    }
}

/// A tagged reference into a repository: `{uri}:{tag}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ImageRef {
    pub repository_uri: String,
    pub tag: Tag,
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository_uri, self.tag)
    }
}

/// Content address of a built image (`sha256:...`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ImageId(pub String);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commit the artifact was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRevision(pub String);

impl SourceRevision {
    /// First 12 characters, for local image names and log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for SourceRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable output of one build.
///
/// Only the builder constructs these, and only after the engine reported a
/// successful build, so holding an `Artifact` means there is something real
/// to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub id: ImageId,
    /// Local (unpublished) reference the engine knows the image by.
    pub local_ref: String,
    pub revision: SourceRevision,
    pub built_at: DateTime<Utc>,
    /// SHA-256 over the build context, hex encoded.
    pub context_digest: String,
}

/// Short-lived registry login material.
///
/// Deliberately not `Clone` and not serializable: each pipeline fetches its
/// own and drops it when the pipeline ends.
#[derive(Debug)]
pub struct Credentials {
    pub account: AccountId,
    pub region: Region,
    pub registry_host: String,
    pub token: SecretString,
    pub issued_at: DateTime<Utc>,
}

impl Credentials {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + ChronoDuration::hours(CREDENTIAL_LIFETIME_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_validation() {
        assert!(Region::new("us-east-2").is_ok());
        assert!(Region::new("ap-southeast-1").is_ok());
        assert!(Region::new("us-gov-west-1").is_ok());
        assert!(Region::new("US-EAST-2").is_err());
        assert!(Region::new("useast").is_err());
    }

    #[test]
    fn repository_name_validation() {
        assert!(RepositoryName::new("ns/svc").is_ok());
        assert!(RepositoryName::new("stake-capital/x402-facilitator").is_ok());
        assert!(RepositoryName::new("Ns/Svc").is_err());
        assert!(RepositoryName::new("ns//svc").is_err());
        assert!(RepositoryName::new("/svc").is_err());

        let joined = RepositoryName::from_parts("ns/", "svc").unwrap();
        assert_eq!(joined.as_str(), "ns/svc");
        assert_eq!(joined.image(), "svc");
        assert_eq!(RepositoryName::from_parts("", "svc").unwrap().as_str(), "svc");
    }

    #[test]
    fn tag_kinds() {
        assert_eq!(Tag::latest().kind(), TagKind::Latest);
        assert!(matches!(Tag::new("v1.0.0").unwrap().kind(), TagKind::Version(v) if v.major == 1));
        assert!(matches!(Tag::new("2.3.4").unwrap().kind(), TagKind::Version(_)));
        assert_eq!(Tag::new("main").unwrap().kind(), TagKind::Label);
        assert!(Tag::new(".hidden").is_err());
        assert!(Tag::new("has space").is_err());
        assert!(Tag::new(&"a".repeat(129)).is_err());
    }

    #[test]
    fn account_ids() {
        assert!(AccountId::new("acct1").is_ok());
        assert!(!AccountId::new("acct1").unwrap().is_aws_account());
        assert!(AccountId::new("123456789012").unwrap().is_aws_account());
        assert!(AccountId::new("").is_err());
        assert!(AccountId::new("a/b").is_err());
    }

    #[test]
    fn repository_addressing() {
        let repo = RepositoryRef::new(
            AccountId::new("123456789012").unwrap(),
            Region::new("us-east-2").unwrap(),
            RepositoryName::new("ns/svc").unwrap(),
            "amazonaws.com",
        );
        assert_eq!(repo.uri, "123456789012.dkr.ecr.us-east-2.amazonaws.com/ns/svc");
        assert_eq!(repo.host(), "123456789012.dkr.ecr.us-east-2.amazonaws.com");
        assert_eq!(
            repo.image(&Tag::new("v1.0.0").unwrap()).to_string(),
            "123456789012.dkr.ecr.us-east-2.amazonaws.com/ns/svc:v1.0.0"
        );
    }

    #[test]
    fn image_ids_order_by_digest() {
        let mut ids = vec![ImageId("sha256:b".into()), ImageId("sha256:a".into())];
        ids.sort();
        assert_eq!(ids[0].0, "sha256:a");
    }

    #[test]
    fn credentials_expire_after_twelve_hours() {
        let issued_at = Utc::now();
        let creds = Credentials {
            account: AccountId::new("acct1").unwrap(),
            region: Region::new("us-east-2").unwrap(),
            registry_host: "host".into(),
            token: SecretString::from("t"),
            issued_at,
        };
        assert_eq!(creds.expires_at(), issued_at + ChronoDuration::hours(12));
        let debug = format!("{creds:?}");
        assert!(!debug.contains("\"t\""), "token leaked into {debug}");
    }

    #[test]
    fn revision_short_form() {
        assert_eq!(SourceRevision("abc123".into()).short(), "abc123");
        assert_eq!(
            SourceRevision("0123456789abcdef0123".into()).short(),
            "0123456789ab"
        );
    }
}
