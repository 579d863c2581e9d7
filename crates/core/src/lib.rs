//! Core data model for the robot interface: parameters, action phases,
//! action types and the actions bound to devices.
//!
//! Everything here is plain data. Values are built once by a loader and
//! read by the orchestrator without locking.

pub mod domain;
pub mod error;

pub use domain::action::{Action, ActionPhase, ActionType};
pub use domain::param::{parse_list, Param, ParamList};
pub use error::CoreError;
