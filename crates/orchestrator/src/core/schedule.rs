//! Level and action selection for a phase.
//!
//! Pure functions over a device list; nothing here touches a driver.

use std::collections::BTreeSet;
use std::sync::Arc;

use robotinterface_core::{Action, ActionPhase};

use crate::device::Device;
use crate::device_list::DeviceList;

/// An action together with the device it is bound to.
#[derive(Debug, Clone)]
pub struct ScheduledAction {
    pub device: Arc<Device>,
    pub action: Action,
}

/// All actions of one level, in dispatch order.
#[derive(Debug, Clone)]
pub struct LevelPlan {
    pub level: u32,
    pub actions: Vec<ScheduledAction>,
}

/// Sorted, deduplicated levels that hold at least one action of `phase`.
pub fn levels(devices: &DeviceList, phase: ActionPhase) -> Vec<u32> {
    devices
        .iter()
        .flat_map(|device| device.actions().iter())
        .filter(|action| action.phase() == phase)
        .map(|action| action.level())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Actions in the `(phase, level)` slot, in device list order and then in
/// configuration order within each device.
pub fn actions_at(devices: &DeviceList, phase: ActionPhase, level: u32) -> Vec<ScheduledAction> {
    devices
        .iter()
        .flat_map(|device| {
            device
                .actions()
                .iter()
                .filter(move |action| action.is_scheduled_at(phase, level))
                .map(move |action| ScheduledAction {
                    device: Arc::clone(device),
                    action: action.clone(),
                })
        })
        .collect()
}

/// Complete level-by-level plan of a phase.
pub fn plan(devices: &DeviceList, phase: ActionPhase) -> Vec<LevelPlan> {
    levels(devices, phase)
        .into_iter()
        .map(|level| LevelPlan {
            level,
            actions: actions_at(devices, phase, level),
        })
        .collect()
}
