//! Combat-action engine for a voxel-world agent.
//!
//! Given a hostile target, the engine searches the world for legal charge
//! placements, scores and selects a non-overlapping subset maximizing damage
//! to the target, issues placement and destruction actions on schedules
//! decoupled from the host tick, and tracks the lifecycle of every charge it
//! placed so it never double-acts on a position.
//!
//! The host side of the boundary is the [`host::Host`] trait; everything the
//! engine does flows through it.

pub mod candidates;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod optimizer;
pub mod session;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testutil;

pub use candidates::PlacementCandidate;
pub use config::EngineConfig;
pub use error::EngineError;
pub use events::{EngineEvent, FastKillReason};
pub use host::{AgentState, Host, HostEvent, PlaceOptions};
pub use session::{Session, SessionStats, StatsSnapshot};
pub use tracker::{ChargeState, ChargeTracker};
