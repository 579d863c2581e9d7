//! The robot: owner of the device ensemble and scheduler of its phases.
//!
//! A phase runs its actions level by level. Every level is a fork-join
//! step: actions are dispatched to their devices in list order, devices may
//! run long operations on workers, and all workers are joined before the
//! next level starts.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use robot_events::EventBus;
use robotinterface_core::{ActionPhase, ParamList};
use tracing::{debug, error, info, warn};

use crate::core::schedule::{self, LevelPlan};
use crate::core::{ActionDispatcher, ActionOutcome, CancelFlag, LifecycleEmitter, PhaseReport};
use crate::device::{Device, WorkerOutcome};
use crate::device_list::DeviceList;
use crate::error::{DeviceError, OrchestratorError, Result};
use crate::resources::PhaseScope;

const VERBOSE_PARAM: &str = "verbose";
const ALLOW_DEPRECATED_PARAM: &str = "allow-deprecated-devices";

/// Phase and level the robot is currently executing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseState {
    pub phase: ActionPhase,
    pub level: u32,
}

/// A named ensemble of devices driven through lifecycle phases.
///
/// `enter_phase` calls are not meant to overlap, with one exception: an
/// interrupt phase may be entered while another phase is in flight, and
/// [`interrupt`](Self::interrupt) may be called from any task. The phase
/// state and the cancellation flag are the only state shared between them.
pub struct Robot {
    name: String,
    build: u32,
    port_prefix: String,
    params: ParamList,
    devices: DeviceList,
    state: RwLock<PhaseState>,
    cancel: Mutex<CancelFlag>,
    emitter: LifecycleEmitter,
}

impl Robot {
    pub fn new(name: impl Into<String>, devices: DeviceList) -> Self {
        let name = name.into();
        Self {
            emitter: LifecycleEmitter::new(name.clone()),
            name,
            build: 0,
            port_prefix: String::new(),
            params: ParamList::new(),
            devices,
            state: RwLock::new(PhaseState::default()),
            cancel: Mutex::new(CancelFlag::new()),
        }
    }

    pub fn with_build(mut self, build: u32) -> Self {
        self.build = build;
        self
    }

    pub fn with_port_prefix(mut self, port_prefix: impl Into<String>) -> Self {
        self.port_prefix = port_prefix.into();
        self
    }

    pub fn with_params(mut self, params: ParamList) -> Self {
        self.params = params;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.emitter = LifecycleEmitter::new(self.name.clone()).with_bus(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self) -> u32 {
        self.build
    }

    pub fn port_prefix(&self) -> &str {
        &self.port_prefix
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.has_param(name)
    }

    pub fn find_param(&self, name: &str) -> Option<&str> {
        self.params.find_param(name)
    }

    pub fn devices(&self) -> &DeviceList {
        &self.devices
    }

    pub fn device(&self, name: &str) -> Result<&Arc<Device>> {
        self.devices
            .find(name)
            .ok_or_else(|| OrchestratorError::DeviceNotFound(name.to_string()))
    }

    pub fn current_phase(&self) -> ActionPhase {
        self.read_state().phase
    }

    pub fn current_level(&self) -> u32 {
        self.read_state().level
    }

    pub fn phase_state(&self) -> PhaseState {
        *self.read_state()
    }

    /// Levels holding actions of `phase` on the robot's own devices.
    pub fn levels(&self, phase: ActionPhase) -> Vec<u32> {
        schedule::levels(&self.devices, phase)
    }

    /// Level-by-level plan of `phase` on the robot's own devices.
    pub fn schedule(&self, phase: ActionPhase) -> Vec<LevelPlan> {
        schedule::plan(&self.devices, phase)
    }

    /// Add `verbose=1` to every device that does not set it explicitly.
    pub fn set_verbose(&self, verbose: bool) {
        if verbose {
            self.inject_param(VERBOSE_PARAM);
        }
    }

    /// Add `allow-deprecated-devices=1` to every device that does not set
    /// it explicitly.
    pub fn set_allow_deprecated_devices(&self, allow: bool) {
        if allow {
            self.inject_param(ALLOW_DEPRECATED_PARAM);
        }
    }

    fn inject_param(&self, name: &str) {
        for device in self.devices.iter() {
            if device.push_param_if_absent(name, "1") {
                debug!(device = %device.name(), param = name, "Parameter injected");
            }
        }
    }

    /// Ask every device to stop its running workers and cancel the phase in
    /// flight.
    ///
    /// The phase stops dispatching at its next level or action boundary.
    /// Work already running is only asked to quit, never killed.
    pub async fn interrupt(&self) {
        info!(robot = %self.name, "Interrupt received. Stopping all running threads.");

        self.lock_cancel().cancel();
        for device in self.devices.iter() {
            device.stop_threads().await;
        }
        self.emitter.devices_interrupted();
    }

    /// Run every action of `phase`, level by level.
    ///
    /// `external_devices` replace same-named devices of the robot for the
    /// duration of this call only. Startup opens devices before any action
    /// and rolls back on failure; Shutdown closes them after the last
    /// level. Run accepts no actions.
    pub async fn enter_phase(
        &self,
        phase: ActionPhase,
        external_devices: DeviceList,
    ) -> PhaseReport {
        info!(robot = %self.name, phase = %phase, "Phase starting");

        let mut scope = PhaseScope::new(phase, &self.devices, external_devices);
        let cancel = self.begin_phase(phase);
        self.emitter.phase_started(phase);

        let mut report = PhaseReport::new(phase);

        if phase == ActionPhase::Startup {
            if let Err(e) = self.open_devices(scope.effective(), &mut report).await {
                error!(
                    robot = %self.name,
                    error = %e,
                    "One or more devices failed opening... see previous log messages for more info"
                );
                report.open_failures.push(e);
                return self.finish_phase(report);
            }
        }

        if phase == ActionPhase::Run {
            if !schedule::levels(scope.effective(), phase).is_empty() {
                warn!(
                    phase = %phase,
                    "Phase does not accept actions. Skipping all actions for this phase"
                );
            }
            scope.mark_completed();
            return self.finish_phase(report);
        }

        // Interrupt2/3 run while earlier phases may be blocked; waiting on
        // their workers here would deadlock the interrupt path.
        if !phase.skips_join_barrier() {
            for leftover in self.join_devices(scope.effective()).await {
                if let Err(e) = &leftover.result {
                    warn!(error = %e, "Worker from a previous phase failed");
                }
            }
        }

        for level in schedule::levels(scope.effective(), phase) {
            if self.is_cancelled(phase, &cancel) {
                report.cancelled = true;
                break;
            }
            self.run_level(phase, level, scope.effective(), &cancel, &mut report)
                .await;
        }

        if report.cancelled {
            warn!(
                robot = %self.name,
                phase = %phase,
                "Phase was superseded before all levels ran"
            );
        } else if !report.actions_succeeded() {
            warn!(
                phase = %phase,
                "There was some problem running actions for this phase. Please check the log and your configuration"
            );
        }

        if phase == ActionPhase::Shutdown {
            self.close_devices(&mut report).await;
        }

        if !report.cancelled {
            scope.mark_completed();
        }
        self.finish_phase(report)
    }

    async fn run_level(
        &self,
        phase: ActionPhase,
        level: u32,
        devices: &DeviceList,
        cancel: &CancelFlag,
        report: &mut PhaseReport,
    ) {
        self.set_level(level);
        info!(phase = %phase, level, "Entering action level");
        self.emitter.level_started(phase, level);
        report.levels.push(level);

        let dispatcher = ActionDispatcher::new(devices);
        for scheduled in schedule::actions_at(devices, phase, level) {
            if self.is_cancelled(phase, cancel) {
                report.cancelled = true;
                break;
            }

            let result = dispatcher
                .dispatch(&scheduled.device, &scheduled.action)
                .await;
            match &result {
                Err(e) if e.is_configuration_error() => error!(
                    device = %scheduled.device.name(),
                    action = %scheduled.action,
                    error = %e,
                    "Invalid action. Please check your configuration"
                ),
                Err(e) => error!(
                    device = %scheduled.device.name(),
                    action = %scheduled.action.action_type(),
                    error = %e,
                    "Cannot run action on device"
                ),
                Ok(()) => debug!(
                    device = %scheduled.device.name(),
                    action = %scheduled.action.action_type(),
                    "Action dispatched"
                ),
            }

            self.emitter.action_dispatched(
                phase,
                level,
                scheduled.device.name(),
                scheduled.action.action_type(),
                result.as_ref().err().map(|e| e.to_string()),
            );
            report.actions.push(ActionOutcome::new(&scheduled, result));
        }

        info!(
            phase = %phase,
            level,
            "All actions for level started. Waiting for unfinished actions."
        );

        for outcome in self.join_devices(devices).await {
            if let Err(e) = &outcome.result {
                error!(error = %e, "Action worker failed");
            }
            report.workers.push(outcome);
        }

        info!(phase = %phase, level, "All actions for level finished.");
        self.emitter.level_finished(phase, level);
    }

    /// Open every device of the effective list that is not open yet, in
    /// list order, stopping at the first failure.
    ///
    /// On failure the devices opened by this call are closed again in
    /// reverse order, and the open error is returned.
    async fn open_devices(
        &self,
        devices: &DeviceList,
        report: &mut PhaseReport,
    ) -> std::result::Result<(), DeviceError> {
        let mut opened: Vec<&Arc<Device>> = Vec::new();

        for device in devices.iter() {
            if device.is_open() {
                debug!(device = %device.name(), "Device is already open");
                continue;
            }

            match device.open().await {
                Ok(()) => {
                    self.emitter.device_opened(device.name(), true);
                    opened.push(device);
                }
                Err(e) => {
                    warn!(device = %device.name(), error = %e, "Cannot open device");
                    self.emitter.device_opened(device.name(), false);

                    for device in opened.into_iter().rev() {
                        self.close_device(device, report).await;
                    }
                    if !report.close_failures.is_empty() {
                        error!("One or more devices failed closing");
                    }
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Close every device of the robot in reverse list order. Failures are
    /// collected and never stop the remaining closes.
    async fn close_devices(&self, report: &mut PhaseReport) {
        for device in self.devices.iter().rev() {
            if device.is_open() {
                self.close_device(device, report).await;
            }
        }

        if !report.close_failures.is_empty() {
            error!(
                failures = report.close_failures.len(),
                "There was some problem closing one or more devices. Please check the log and your configuration"
            );
        }
    }

    async fn close_device(&self, device: &Device, report: &mut PhaseReport) {
        match device.close().await {
            Ok(()) => self.emitter.device_closed(device.name(), true),
            Err(e) => {
                warn!(device = %device.name(), error = %e, "Cannot close device");
                self.emitter.device_closed(device.name(), false);
                report.close_failures.push(e);
            }
        }
    }

    /// Join the workers of every device the phase may have used: the
    /// robot's own devices and any external override.
    async fn join_devices(&self, effective: &DeviceList) -> Vec<WorkerOutcome> {
        let mut outcomes = Vec::new();
        for device in self.devices.union(effective).iter() {
            outcomes.extend(device.join_threads().await);
        }
        outcomes
    }

    fn begin_phase(&self, phase: ActionPhase) -> CancelFlag {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.phase = phase;
            state.level = 0;
        }

        let flag = CancelFlag::new();
        *self.lock_cancel() = flag.clone();
        flag
    }

    fn finish_phase(&self, report: PhaseReport) -> PhaseReport {
        let success = report.is_success();
        self.emitter
            .phase_finished(report.phase, success, report.cancelled);

        if success {
            info!(robot = %self.name, phase = %report.phase, "Phase finished");
        } else {
            warn!(
                robot = %self.name,
                phase = %report.phase,
                failures = report.failure_count(),
                cancelled = report.cancelled,
                "Phase finished with errors"
            );
        }
        report
    }

    fn is_cancelled(&self, phase: ActionPhase, cancel: &CancelFlag) -> bool {
        cancel.is_cancelled() || self.current_phase() != phase
    }

    fn set_level(&self, level: u32) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .level = level;
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, PhaseState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, CancelFlag> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Robot")
            .field("name", &self.name)
            .field("build", &self.build)
            .field("port_prefix", &self.port_prefix)
            .field("devices", &self.devices.names())
            .field("state", &self.phase_state())
            .finish()
    }
}

impl fmt::Display for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(name = \"{}\"", self.name)?;
        if !self.params.is_empty() {
            write!(f, ", params = [{}]", self.params)?;
        }
        if !self.devices.is_empty() {
            write!(f, ", devices = [{}]", self.devices)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Driver, DriverResult};
    use async_trait::async_trait;
    use robotinterface_core::{Action, ActionType};

    struct Null;

    #[async_trait]
    impl Driver for Null {
        async fn open(&self, _params: &ParamList) -> DriverResult {
            Ok(())
        }

        async fn close(&self) -> DriverResult {
            Ok(())
        }
    }

    fn robot() -> Robot {
        let devices = DeviceList::new()
            .with(
                Device::new("head", Arc::new(Null))
                    .with_params(ParamList::new().with("verbose", "0"))
                    .with_action(Action::new(ActionType::Configure, ActionPhase::Startup, 2)),
            )
            .with(Device::new("torso", Arc::new(Null)));
        Robot::new("test_robot", devices)
            .with_build(7)
            .with_port_prefix("/icub")
    }

    #[test]
    fn test_initial_state() {
        let robot = robot();
        assert_eq!(robot.current_phase(), ActionPhase::Unknown);
        assert_eq!(robot.current_level(), 0);
        assert_eq!(robot.build(), 7);
        assert_eq!(robot.port_prefix(), "/icub");
    }

    #[test]
    fn test_set_verbose_does_not_override_explicit_value() {
        let robot = robot();
        robot.set_verbose(true);
        robot.set_allow_deprecated_devices(false);

        let head = robot.device("head").unwrap();
        let torso = robot.device("torso").unwrap();
        assert_eq!(head.params().find_param("verbose"), Some("0"));
        assert_eq!(torso.params().find_param("verbose"), Some("1"));
        assert!(!torso.has_param("allow-deprecated-devices"));

        robot.set_allow_deprecated_devices(true);
        robot.set_allow_deprecated_devices(true);
        assert_eq!(torso.params().len(), 2);
    }

    #[test]
    fn test_device_lookup() {
        let robot = robot();
        assert!(robot.device("head").is_ok());
        assert!(matches!(
            robot.device("tail"),
            Err(OrchestratorError::DeviceNotFound(name)) if name == "tail"
        ));
    }

    #[test]
    fn test_levels_and_schedule() {
        let robot = robot();
        assert_eq!(robot.levels(ActionPhase::Startup), vec![2]);
        assert!(robot.levels(ActionPhase::Shutdown).is_empty());
        assert_eq!(robot.schedule(ActionPhase::Startup)[0].actions.len(), 1);
    }

    #[tokio::test]
    async fn test_run_phase_sets_state_and_succeeds() {
        let robot = robot();
        let report = robot.enter_phase(ActionPhase::Run, DeviceList::new()).await;

        assert!(report.is_success());
        assert!(report.levels.is_empty());
        assert_eq!(robot.current_phase(), ActionPhase::Run);
        assert_eq!(robot.current_level(), 0);
    }

    #[test]
    fn test_display() {
        let robot = Robot::new("bare", DeviceList::new())
            .with_params(ParamList::new().with("a", "1"));
        assert_eq!(robot.to_string(), "(name = \"bare\", params = [(\"a\" = \"1\")])");
    }
}
