//! Background services for the case automation system.
//!
//! - Overdue-task sweeps on a fixed interval
//! - Pending-task summaries published on the event bus
//! - Cooperative shutdown for both loops

pub mod daemon;
pub mod patrol;
pub mod shutdown;
