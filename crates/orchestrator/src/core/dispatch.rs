//! Action dispatch: one handler per [`ActionType`].
//!
//! Handlers validate the action parameters, resolve the devices they refer
//! to in the effective device list and then call the matching device
//! operation. A failed precondition never reaches the device.

use std::sync::Arc;

use robotinterface_core::{parse_list, Action, ActionType, ParamList};
use tracing::{debug, warn};

use crate::device::Device;
use crate::device_list::DeviceList;
use crate::driver::DriverList;
use crate::error::DispatchError;

const ATTACH_ALL_KEY: &str = "all";

/// Dispatches actions against one effective device list.
pub struct ActionDispatcher<'a> {
    devices: &'a DeviceList,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(devices: &'a DeviceList) -> Self {
        Self { devices }
    }

    pub async fn dispatch(&self, device: &Device, action: &Action) -> Result<(), DispatchError> {
        let params = action.params();
        match action.action_type() {
            ActionType::Configure => self.configure(device, params),
            ActionType::Calibrate => self.calibrate(device, params),
            ActionType::Attach => self.attach(device, params).await,
            ActionType::Abort => self.abort(device, params),
            ActionType::Detach => self.detach(device, params).await,
            ActionType::Park => self.park(device, params),
            ActionType::Custom => self.custom(device, params),
            ActionType::Unknown => Err(DispatchError::Unhandled(ActionType::Unknown)),
        }
    }

    // TODO: forward to the device once drivers expose a reconfigure hook.
    fn configure(&self, device: &Device, _params: &ParamList) -> Result<(), DispatchError> {
        debug!(device = %device.name(), "configure action is a no-op");
        Ok(())
    }

    fn calibrate(&self, device: &Device, params: &ParamList) -> Result<(), DispatchError> {
        let target = self.resolve_target(ActionType::Calibrate, params)?;
        device.calibrate(target)?;
        Ok(())
    }

    async fn attach(&self, device: &Device, params: &ParamList) -> Result<(), DispatchError> {
        let drivers = self.attach_drivers(params)?;
        device.attach(&drivers).await?;
        Ok(())
    }

    fn abort(&self, device: &Device, _params: &ParamList) -> Result<(), DispatchError> {
        debug!(device = %device.name(), "abort action is a no-op");
        Ok(())
    }

    async fn detach(&self, device: &Device, params: &ParamList) -> Result<(), DispatchError> {
        if !params.is_empty() {
            warn!(
                device = %device.name(),
                "Action \"detach\" cannot have any parameter. Ignoring them."
            );
        }
        device.detach().await?;
        Ok(())
    }

    fn park(&self, device: &Device, params: &ParamList) -> Result<(), DispatchError> {
        let target = self.resolve_target(ActionType::Park, params)?;
        device.park(target)?;
        Ok(())
    }

    fn custom(&self, device: &Device, _params: &ParamList) -> Result<(), DispatchError> {
        debug!(device = %device.name(), "custom action is a no-op");
        Ok(())
    }

    /// Resolve the `target` parameter of a calibrate or park action.
    fn resolve_target(
        &self,
        action: ActionType,
        params: &ParamList,
    ) -> Result<&'a Arc<Device>, DispatchError> {
        let target = params
            .find_param("target")
            .ok_or_else(|| DispatchError::missing_param(action, "target"))?;

        self.devices
            .find(target)
            .ok_or_else(|| DispatchError::TargetNotFound {
                target: target.to_string(),
            })
    }

    fn resolve_network(
        &self,
        network: &str,
        target: &str,
    ) -> Result<&'a Arc<Device>, DispatchError> {
        self.devices
            .find(target)
            .ok_or_else(|| DispatchError::NetworkTargetNotFound {
                target: target.to_string(),
                network: network.to_string(),
            })
    }

    /// Build the driver list an attach action hands to its device.
    ///
    /// Exactly one of `network` (with `device`), `networks` (with one
    /// parameter per listed network naming its device) or `all` selects
    /// the drivers.
    pub fn attach_drivers(&self, params: &ParamList) -> Result<DriverList, DispatchError> {
        let modes = ["network", "networks", "all"]
            .iter()
            .filter(|mode| params.has_param(mode))
            .count();
        if modes > 1 {
            return Err(DispatchError::ConflictingAttachModes);
        }

        let mut drivers = DriverList::new();

        if let Some(network) = params.find_param("network") {
            let target = params
                .find_param("device")
                .ok_or_else(|| DispatchError::missing_param(ActionType::Attach, "device"))?;
            let device = self.resolve_network(network, target)?;
            drivers.push(network, device.name(), Arc::clone(device.driver()));
        } else if params.has_param("all") {
            for device in self.devices.iter() {
                drivers.push(ATTACH_ALL_KEY, device.name(), Arc::clone(device.driver()));
            }
        } else if let Some(networks) = params.find_param("networks") {
            for network in parse_list(networks) {
                let target = params
                    .find_param(&network)
                    .ok_or_else(|| DispatchError::missing_param(ActionType::Attach, &network))?;
                let device = self.resolve_network(&network, target)?;
                drivers.push(network.as_str(), device.name(), Arc::clone(device.driver()));
            }
        } else {
            return Err(DispatchError::MissingAttachMode);
        }

        if drivers.is_empty() {
            return Err(DispatchError::NoDriversResolved);
        }
        Ok(drivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Driver, DriverResult};
    use async_trait::async_trait;

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

    fn devices() -> DeviceList {
        DeviceList::new()
            .with(Device::new("left_arm", Arc::new(Null)))
            .with(Device::new("right_arm", Arc::new(Null)))
            .with(Device::new("wrapper", Arc::new(Null)))
    }

    #[test]
    fn test_attach_single_network() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let params = ParamList::new()
            .with("network", "left")
            .with("device", "left_arm");

        let drivers = dispatcher.attach_drivers(&params).unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers.find("left").map(|e| e.device()), Some("left_arm"));
    }

    #[test]
    fn test_attach_network_requires_device() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let params = ParamList::new().with("network", "left");

        assert!(matches!(
            dispatcher.attach_drivers(&params),
            Err(DispatchError::MissingParam { param, .. }) if param == "device"
        ));
    }

    #[test]
    fn test_attach_networks_list() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let params = ParamList::new()
            .with("networks", "(left right)")
            .with("left", "left_arm")
            .with("right", "right_arm");

        let drivers = dispatcher.attach_drivers(&params).unwrap();
        assert_eq!(drivers.keys().collect::<Vec<_>>(), vec!["left", "right"]);
        assert_eq!(drivers.find("right").map(|e| e.device()), Some("right_arm"));
    }

    #[test]
    fn test_attach_networks_missing_entry() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let params = ParamList::new()
            .with("networks", "(left right)")
            .with("left", "left_arm");

        assert!(matches!(
            dispatcher.attach_drivers(&params),
            Err(DispatchError::MissingParam { param, .. }) if param == "right"
        ));
    }

    #[test]
    fn test_attach_networks_unknown_target() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let params = ParamList::new()
            .with("networks", "(left)")
            .with("left", "tail");

        assert!(matches!(
            dispatcher.attach_drivers(&params),
            Err(DispatchError::NetworkTargetNotFound { target, network })
                if target == "tail" && network == "left"
        ));
    }

    #[test]
    fn test_attach_empty_networks_resolves_nothing() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let params = ParamList::new().with("networks", "()");

        assert!(matches!(
            dispatcher.attach_drivers(&params),
            Err(DispatchError::NoDriversResolved)
        ));
    }

    #[test]
    fn test_attach_all_takes_every_device() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let params = ParamList::new().with("all", "");

        let drivers = dispatcher.attach_drivers(&params).unwrap();
        assert_eq!(drivers.len(), 3);
        assert!(drivers.keys().all(|k| k == "all"));
    }

    #[test]
    fn test_attach_modes_are_exclusive() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let params = ParamList::new()
            .with("network", "left")
            .with("device", "left_arm")
            .with("all", "");

        assert!(matches!(
            dispatcher.attach_drivers(&params),
            Err(DispatchError::ConflictingAttachModes)
        ));
        assert!(matches!(
            dispatcher.attach_drivers(&ParamList::new()),
            Err(DispatchError::MissingAttachMode)
        ));
    }

    #[tokio::test]
    async fn test_unknown_action_type_is_unhandled() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let device = devices.find("wrapper").unwrap();
        let action = Action::new(
            ActionType::Unknown,
            robotinterface_core::ActionPhase::Startup,
            0,
        );

        assert!(matches!(
            dispatcher.dispatch(device, &action).await,
            Err(DispatchError::Unhandled(ActionType::Unknown))
        ));
    }

    #[tokio::test]
    async fn test_placeholders_succeed_on_closed_device() {
        let devices = devices();
        let dispatcher = ActionDispatcher::new(&devices);
        let device = devices.find("wrapper").unwrap();

        for action_type in [ActionType::Configure, ActionType::Abort, ActionType::Custom] {
            let action = Action::new(action_type, robotinterface_core::ActionPhase::Startup, 0);
            assert!(dispatcher.dispatch(device, &action).await.is_ok());
        }
    }
}
