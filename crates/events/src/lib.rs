//! Lifecycle event system for the robot interface
//!
//! This crate provides the event bus and the event types published while a
//! robot moves through its phases. Subscribers get a live view of phase,
//! level and per-action progress without polling the orchestrator.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
