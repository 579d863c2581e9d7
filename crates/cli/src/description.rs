//! TOML robot description.
//!
//! ```toml
//! name = "icub"
//! build = 2
//! portprefix = "/icub"
//!
//! [[devices]]
//! name = "motor"
//! type = "sim"
//! params = { delay_ms = 20 }
//!
//! [[devices.actions]]
//! phase = "startup"
//! level = 0
//! type = "configure"
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use orchestrator::{Device, DeviceList, Robot};
use robotinterface_core::{Action, ActionPhase, ActionType, Param, ParamList};
use serde::Deserialize;

use crate::sim::SimDriver;

const SIM_DEVICE_TYPE: &str = "sim";

#[derive(Debug, Deserialize)]
pub struct RobotDescription {
    pub name: String,
    #[serde(default)]
    pub build: u32,
    #[serde(default)]
    pub portprefix: String,
    #[serde(default)]
    pub params: toml::Table,
    #[serde(default)]
    pub devices: Vec<DeviceDescription>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub params: toml::Table,
    #[serde(default)]
    pub actions: Vec<ActionDescription>,
}

#[derive(Debug, Deserialize)]
pub struct ActionDescription {
    pub phase: String,
    #[serde(default)]
    pub level: u32,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: toml::Table,
}

impl RobotDescription {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid robot description")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Build the robot, creating one driver per device.
    pub fn into_robot(self) -> Result<Robot> {
        let mut devices = DeviceList::new();
        for device in self.devices {
            if devices.contains(&device.name) {
                bail!("Device \"{}\" is declared twice", device.name);
            }
            devices.push(Arc::new(device.into_device()?));
        }

        Ok(Robot::new(self.name, devices)
            .with_build(self.build)
            .with_port_prefix(self.portprefix)
            .with_params(to_param_list(&self.params)))
    }
}

impl DeviceDescription {
    fn into_device(self) -> Result<Device> {
        let params = to_param_list(&self.params);
        let driver = match self.device_type.as_str() {
            SIM_DEVICE_TYPE => SimDriver::from_params(&self.name, &params)?,
            other => bail!(
                "Device \"{}\" has unsupported type \"{}\"",
                self.name,
                other
            ),
        };

        let actions = self
            .actions
            .into_iter()
            .map(ActionDescription::into_action)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid action on device \"{}\"", self.name))?;

        Ok(Device::new(self.name, Arc::new(driver))
            .with_params(params)
            .with_actions(actions))
    }
}

impl ActionDescription {
    fn into_action(self) -> Result<Action> {
        let phase = ActionPhase::parse(&self.phase)
            .filter(|phase| *phase != ActionPhase::Unknown)
            .with_context(|| format!("Unknown phase \"{}\"", self.phase))?;

        // Unknown types are kept and reported when the action is dispatched.
        let action_type = ActionType::parse(&self.action_type).unwrap_or_else(|| {
            tracing::warn!(action = %self.action_type, "Unknown action type");
            ActionType::Unknown
        });

        Ok(Action::new(action_type, phase, self.level).with_params(to_param_list(&self.params)))
    }
}

fn to_param_list(table: &toml::Table) -> ParamList {
    table
        .iter()
        .map(|(name, value)| {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Array(items) => {
                    let items: Vec<String> = items.iter().map(value_to_string).collect();
                    format!("({})", items.join(" "))
                }
                other => other.to_string(),
            };
            Param::new(name.as_str(), value)
        })
        .collect()
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DESCRIPTION: &str = r#"
name = "icub"
build = 2
portprefix = "/icub"
params = { verbose = "1" }

[[devices]]
name = "motor"
type = "sim"

[[devices.actions]]
phase = "startup"
level = 0
type = "configure"

[[devices]]
name = "encoder"
type = "sim"
params = { delay_ms = 5 }

[[devices.actions]]
phase = "startup"
level = 1
type = "attach"
params = { network = "enc", device = "motor" }

[[devices.actions]]
phase = "shutdown"
level = 1
type = "wiggle"
"#;

    #[test]
    fn test_parse_description() {
        let description = RobotDescription::parse(DESCRIPTION).unwrap();
        assert_eq!(description.name, "icub");
        assert_eq!(description.build, 2);
        assert_eq!(description.devices.len(), 2);
        assert_eq!(description.devices[1].actions.len(), 2);
    }

    #[test]
    fn test_into_robot() {
        let robot = RobotDescription::parse(DESCRIPTION)
            .unwrap()
            .into_robot()
            .unwrap();

        assert_eq!(robot.name(), "icub");
        assert_eq!(robot.port_prefix(), "/icub");
        assert_eq!(robot.find_param("verbose"), Some("1"));
        assert_eq!(robot.levels(ActionPhase::Startup), vec![0, 1]);

        let encoder = robot.device("encoder").unwrap();
        assert_eq!(encoder.params().find_param("delay_ms"), Some("5"));
        assert_eq!(encoder.actions()[0].params().find_param("network"), Some("enc"));
        assert_eq!(encoder.actions()[1].action_type(), ActionType::Unknown);
    }

    #[test]
    fn test_array_params_become_lists() {
        let params: toml::Table = toml::from_str(r#"networks = ["left", "right"]"#).unwrap();
        let params = to_param_list(&params);
        assert_eq!(params.find_param("networks"), Some("(left right)"));
    }

    #[test]
    fn test_params_keep_file_order() {
        let params: toml::Table =
            toml::from_str("zeta = \"1\"\nalpha = \"2\"\nmid = \"3\"").unwrap();
        let params = to_param_list(&params);
        let names: Vec<&str> = params.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_unknown_phase_is_rejected() {
        let description = RobotDescription::parse(
            r#"
name = "icub"

[[devices]]
name = "motor"
type = "sim"

[[devices.actions]]
phase = "warmup"
type = "configure"
"#,
        )
        .unwrap();

        let err = description.into_robot().unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown phase \"warmup\""));
    }

    #[test]
    fn test_duplicate_and_unsupported_devices_are_rejected() {
        let duplicate = RobotDescription::parse(
            r#"
name = "icub"
[[devices]]
name = "motor"
type = "sim"
[[devices]]
name = "motor"
type = "sim"
"#,
        )
        .unwrap();
        assert!(duplicate.into_robot().is_err());

        let unsupported = RobotDescription::parse(
            r#"
name = "icub"
[[devices]]
name = "motor"
type = "canbus"
"#,
        )
        .unwrap();
        let err = unsupported.into_robot().unwrap_err();
        assert!(err.to_string().contains("unsupported type"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DESCRIPTION.as_bytes()).unwrap();

        let description = RobotDescription::load(file.path()).await.unwrap();
        assert_eq!(description.devices[0].name, "motor");

        let missing = RobotDescription::load(Path::new("/nonexistent/robot.toml")).await;
        assert!(missing.is_err());
    }
}
