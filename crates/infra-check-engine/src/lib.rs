//! Infrastructure audit engine
//!
//! Executes a declarative check catalog against a fleet inventory and folds
//! the classified results into a severity-ranked run summary.
//!
//! # Flow
//! inventory + registry → plan → channel fetch → threshold policy → aggregator
//!
//! # Guarantees
//! - Every planned (subject, check) pair yields at least one result; cluster
//!   queries fan out to one result per resource
//! - Per-check failures never abort the run, they classify as UNKNOWN
//! - The exit status is a pure function of the final severity tallies

pub mod aggregate;
pub mod channel;
pub mod engine;
pub mod error;
pub mod policy;
pub mod registry;
pub mod telemetry;

// Re-export contracts
#[path = "../contracts/mod.rs"]
pub mod contracts;

pub use aggregate::Aggregator;
pub use channel::{Channel, ChannelError, ChannelOutput, ChannelSet, SimulatedChannel, Subject};
pub use contracts::*;
pub use engine::{compute_inputs_hash, plan, AuditEngine, WorkItem};
pub use error::{EngineError, Result};
pub use policy::classify;
pub use registry::CheckRegistry;
pub use telemetry::AuditMetrics;
