//! Node lifecycle orchestration for an externally driven cluster autoscaler.
//!
//! The orchestrator owns the moving parts the autoscaler itself does not:
//! instance naming, batch creation and termination, a durable tag store, a
//! pending-timeout watchdog for instances that never come up, deletion
//! tombstones that mask eventually-consistent cloud listings, and floating-IP
//! plumbing for head nodes.

pub mod bootstrap;
pub mod directory;
pub mod errors;
pub mod floating_ip;
pub mod ledger;
pub mod naming;
pub mod orchestrator;
pub mod pending;
pub mod settings;
pub mod tag_store;

pub use errors::NodeError;
pub use orchestrator::LifecycleOrchestrator;
pub use settings::{Settings, PENDING_TIMEOUT_DEFAULT};
