//! Core abstractions of the phase/level execution model.
//!
//! - [`schedule`] - Levels and per-level actions of a phase
//! - [`ActionDispatcher`] - One handler per action type
//! - [`PhaseReport`] - Structured outcome of a phase
//! - [`LifecycleEmitter`] - Sequenced lifecycle event publishing
//! - [`CancelFlag`] - Cooperative cancellation shared with `interrupt()`

mod cancel;
mod dispatch;
mod events;
mod report;
pub mod schedule;

pub use cancel::CancelFlag;
pub use dispatch::ActionDispatcher;
pub use events::LifecycleEmitter;
pub use report::{ActionOutcome, PhaseReport};
pub use schedule::{LevelPlan, ScheduledAction};
