//! Case lifecycle automation.
//!
//! [`orchestrator::AgentOrchestrator`] owns one [`state_machine::CaseStateMachine`]
//! per case and, whenever a case enters a phase, runs the phase's handler
//! over the deterministic sub-agents: [`timeline`], [`task_agent`] and
//! [`negotiation`]. External services sit behind the traits in
//! [`collaborators`] and `lc_core::store`.

pub mod collaborators;
pub mod negotiation;
pub mod orchestrator;
pub mod state_machine;
pub mod task_agent;
pub mod timeline;
