//! hoist host rollout: bring the single running instance up to `latest`.
//!
//! This crate provides the rollout state machine run on the deployment host:
//! authenticate, pull, stop, start, verify. There is no traffic shifting and
//! no automatic rollback; a failed rollout stops and says where.
//!
//! # Components
//!
//! - **`phase`**: rollout phases and recorded transitions
//! - **`controller`**: the state machine (step, run)
//! - **`verify`**: post-start liveness probe and log tail

pub mod controller;
pub mod error;
pub mod phase;
pub mod verify;

pub use controller::{RolloutController, RolloutFailure, RolloutPlan, RolloutReport};
pub use error::RolloutError;
pub use phase::{RolloutPhase, Transition};
pub use verify::Liveness;
