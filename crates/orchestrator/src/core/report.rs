//! Structured outcome of one `enter_phase` call.

use robotinterface_core::{ActionPhase, ActionType};

use crate::device::WorkerOutcome;
use crate::error::{DeviceError, DispatchError, OrchestratorError, Result};

use super::schedule::ScheduledAction;

/// Outcome of dispatching one action.
#[derive(Debug)]
pub struct ActionOutcome {
    pub device: String,
    pub action_type: ActionType,
    pub level: u32,
    pub result: std::result::Result<(), DispatchError>,
}

impl ActionOutcome {
    pub fn new(
        scheduled: &ScheduledAction,
        result: std::result::Result<(), DispatchError>,
    ) -> Self {
        Self {
            device: scheduled.device.name().to_string(),
            action_type: scheduled.action.action_type(),
            level: scheduled.action.level(),
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything that happened while a robot went through one phase.
///
/// `is_success()` is true only if no open, dispatch, worker or close step
/// failed and the phase was not cancelled.
#[derive(Debug)]
pub struct PhaseReport {
    pub phase: ActionPhase,
    /// Levels that were entered, in order.
    pub levels: Vec<u32>,
    pub actions: Vec<ActionOutcome>,
    /// Workers joined at level barriers of this phase.
    pub workers: Vec<WorkerOutcome>,
    pub open_failures: Vec<DeviceError>,
    pub close_failures: Vec<DeviceError>,
    /// The phase changed or `interrupt()` was called before all levels ran.
    pub cancelled: bool,
}

impl PhaseReport {
    pub fn new(phase: ActionPhase) -> Self {
        Self {
            phase,
            levels: Vec::new(),
            actions: Vec::new(),
            workers: Vec::new(),
            open_failures: Vec::new(),
            close_failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn actions_succeeded(&self) -> bool {
        self.actions.iter().all(ActionOutcome::is_success)
            && self.workers.iter().all(WorkerOutcome::is_success)
    }

    pub fn failure_count(&self) -> usize {
        self.actions.iter().filter(|a| !a.is_success()).count()
            + self.workers.iter().filter(|w| !w.is_success()).count()
            + self.open_failures.len()
            + self.close_failures.len()
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failure_count() == 0
    }

    /// Failed dispatches, in dispatch order.
    pub fn failed_actions(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.actions.iter().filter(|a| !a.is_success())
    }

    pub fn into_result(self) -> Result<Self> {
        if self.cancelled {
            return Err(OrchestratorError::PhaseCancelled(self.phase));
        }
        match self.failure_count() {
            0 => Ok(self),
            failures => Err(OrchestratorError::PhaseFailed {
                phase: self.phase,
                failures,
            }),
        }
    }
}
