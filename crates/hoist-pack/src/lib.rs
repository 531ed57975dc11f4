//! hoist pack: build a deployable image from the current source tree.
//!
//! Pipeline: check context → resolve revision → digest context →
//! `docker build` with revision/timestamp labels → confirm labels landed.

pub mod builder;
pub mod context;
pub mod error;
pub mod revision;

pub use builder::{ArtifactBuilder, labels};
pub use context::context_digest;
pub use error::BuildError;
pub use revision::resolve_revision;
