//! Video processing orchestrator.
//!
//! This crate provides:
//! - The processing orchestrator (one run per video, run-sequence supersession)
//! - Synthetic progress checkpoints and event emission
//! - Bounded retry for metadata persistence
//! - The orphan sweeper for two-phase delete recovery
//! - Structured run logging and metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod sweeper;

pub use config::{label_policy_from_env, OrchestratorConfig, SweeperConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use logging::RunLogger;
pub use orchestrator::{Orchestrator, RunOutcome, RunTicket};
pub use sweeper::{OrphanSweeper, SweepReport, Tombstones};
