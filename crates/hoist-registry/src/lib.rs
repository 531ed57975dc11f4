//! hoist-registry: talks to the remote artifact registry.
//!
//! # Components
//!
//! - **`api`**: `RegistryApi` port and its `aws` CLI adapter
//! - **`gateway`**: repository bootstrap (create-if-absent) and authentication
//! - **`publisher`**: requested-tag + `latest` publishing, and `latest` rebinds

pub mod api;
pub mod error;
pub mod gateway;
pub mod publisher;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use api::{AwsCli, RegistryApi, RepositoryRecord};
pub use error::{GatewayError, PublishError, RegistryApiError};
pub use gateway::{RegistryGateway, Tenant};
pub use publisher::{Publication, TagPublisher};
