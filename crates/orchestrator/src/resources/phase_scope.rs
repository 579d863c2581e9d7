//! RAII guard for the external-devices overlay of one phase.
//!
//! The overlay only exists for the duration of an `enter_phase` call and is
//! owned by it: no other caller can observe it, and it is released on every
//! return path, early or not.

use robotinterface_core::ActionPhase;
use tracing::{debug, warn};

use crate::device_list::DeviceList;

/// Guard owning the external devices and the effective device list derived
/// from them.
///
/// Dropping the guard before [`mark_completed`](Self::mark_completed) logs
/// that the phase ended early (failed startup, cancellation or a panic).
///
/// # Example
///
/// ```ignore
/// let mut scope = PhaseScope::new(phase, robot.devices(), external);
/// run_levels(scope.effective()).await;
/// scope.mark_completed();
/// // overlay released here
/// ```
pub struct PhaseScope {
    phase: ActionPhase,
    external: DeviceList,
    effective: DeviceList,
    completed: bool,
}

impl PhaseScope {
    pub fn new(phase: ActionPhase, devices: &DeviceList, external: DeviceList) -> Self {
        let effective = devices.with_overrides(&external);

        if !external.is_empty() {
            debug!(
                phase = %phase,
                external = external.len(),
                "External devices installed"
            );
        }

        Self {
            phase,
            external,
            effective,
            completed: false,
        }
    }

    /// Device list with the external overrides applied.
    pub fn effective(&self) -> &DeviceList {
        &self.effective
    }

    pub fn external(&self) -> &DeviceList {
        &self.external
    }

    pub fn phase(&self) -> ActionPhase {
        self.phase
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for PhaseScope {
    fn drop(&mut self) {
        if !self.completed {
            warn!(
                phase = %self.phase,
                "Phase scope released before the phase completed"
            );
        }

        let released = self.external.len();
        self.external = DeviceList::new();
        self.effective = DeviceList::new();

        if released > 0 {
            debug!(phase = %self.phase, released, "External devices released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::driver::{Driver, DriverResult};
    use async_trait::async_trait;
    use robotinterface_core::ParamList;
    use std::sync::Arc;

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

    #[test]
    fn test_scope_initial_state() {
        let devices = DeviceList::new().with(Device::new("head", Arc::new(Null)));
        let scope = PhaseScope::new(ActionPhase::Startup, &devices, DeviceList::new());

        assert!(!scope.is_completed());
        assert_eq!(scope.phase(), ActionPhase::Startup);
        assert!(scope.external().is_empty());
        assert_eq!(scope.effective().names(), vec!["head"]);
    }

    #[test]
    fn test_scope_applies_overrides() {
        let devices = DeviceList::new()
            .with(Device::new("head", Arc::new(Null)))
            .with(Device::new("torso", Arc::new(Null)));
        let external_head = Arc::new(Device::new("head", Arc::new(Null)));
        let mut external = DeviceList::new();
        external.push(external_head.clone());

        let mut scope = PhaseScope::new(ActionPhase::Interrupt1, &devices, external);
        assert!(Arc::ptr_eq(scope.effective().find("head").unwrap(), &external_head));

        scope.mark_completed();
        assert!(scope.is_completed());
    }

    #[test]
    fn test_drop_releases_external_devices() {
        let devices = DeviceList::new().with(Device::new("head", Arc::new(Null)));
        let external_head = Arc::new(Device::new("head", Arc::new(Null)));
        let mut external = DeviceList::new();
        external.push(external_head.clone());

        let scope = PhaseScope::new(ActionPhase::Startup, &devices, external);
        assert_eq!(Arc::strong_count(&external_head), 3);

        drop(scope);
        assert_eq!(Arc::strong_count(&external_head), 1);
    }
}
