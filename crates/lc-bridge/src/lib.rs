//! In-process fan-out of case lifecycle events.
//!
//! The orchestrator, task agent and scheduler publish [`protocol::BridgeMessage`]s
//! on an [`event_bus::EventBus`]; any number of observers subscribe.

pub mod event_bus;
pub mod protocol;
