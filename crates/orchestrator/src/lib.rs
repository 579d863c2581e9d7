//! Device lifecycle orchestration for a robot.
//!
//! A [`Robot`] owns a [`DeviceList`] and drives it through lifecycle phases
//! (startup, run, interrupts, shutdown). Each phase executes the actions
//! configured on the devices level by level, joining every worker a level
//! started before the next level begins.

pub mod core;
pub mod device;
pub mod device_list;
pub mod driver;
pub mod error;
pub mod resources;
pub mod robot;

pub use crate::core::{
    ActionOutcome, CancelFlag, LevelPlan, LifecycleEmitter, PhaseReport, ScheduledAction,
};
pub use device::{Device, WorkerKind, WorkerOutcome};
pub use device_list::DeviceList;
pub use driver::{Driver, DriverEntry, DriverHandle, DriverList, DriverResult};
pub use error::{DeviceError, DispatchError, DriverError, OrchestratorError, Result};
pub use robot::{PhaseState, Robot};
