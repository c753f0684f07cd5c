//! Shared domain model for the landcase workspace.
//!
//! Everything that more than one crate needs to agree on lives here: the
//! case phase graph, the record shapes that cross the orchestrator boundary
//! (runs, tasks, milestones, proposals), configuration, and the persistence
//! collaborator trait.

pub mod config;
pub mod store;
pub mod types;
