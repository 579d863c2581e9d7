use robotinterface_core::{ActionPhase, ActionType};
use thiserror::Error;

/// Failure reported by a driver backend.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("{0} is not supported by this driver")]
    Unsupported(&'static str),

    #[error("{0}")]
    Failed(String),
}

impl DriverError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Failure of one operation on one device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device {0} is not open")]
    NotOpen(String),

    #[error("Device {device} failed to {operation}: {source}")]
    Driver {
        device: String,
        operation: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("Worker running {operation} on device {device} was lost: {reason}")]
    WorkerLost {
        device: String,
        operation: &'static str,
        reason: String,
    },
}

impl DeviceError {
    pub fn driver(device: impl Into<String>, operation: &'static str, source: DriverError) -> Self {
        Self::Driver {
            device: device.into(),
            operation,
            source,
        }
    }

    /// Name of the device the error belongs to.
    pub fn device(&self) -> &str {
        match self {
            Self::NotOpen(device) => device,
            Self::Driver { device, .. } | Self::WorkerLost { device, .. } => device,
        }
    }
}

/// Why a single action could not be dispatched.
///
/// Everything except [`DispatchError::Device`] is a configuration problem:
/// the action itself is malformed or points at something that does not
/// exist in the effective device list.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Action \"{action}\" requires \"{param}\" parameter")]
    MissingParam { action: ActionType, param: String },

    #[error("Action \"attach\": you can have only one option: \"network\", \"networks\" or \"all\"")]
    ConflictingAttachModes,

    #[error("Action \"attach\" requires either \"network\", \"networks\" or \"all\" parameter")]
    MissingAttachMode,

    #[error("Target device {target} does not exist")]
    TargetNotFound { target: String },

    #[error("Target device {target} (network = {network}) does not exist")]
    NetworkTargetNotFound { target: String, network: String },

    #[error("Action \"attach\" couldn't find any device")]
    NoDriversResolved,

    #[error("Unhandled action {0}")]
    Unhandled(ActionType),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl DispatchError {
    pub fn missing_param(action: ActionType, param: impl Into<String>) -> Self {
        Self::MissingParam {
            action,
            param: param.into(),
        }
    }

    /// True for errors caused by the action's configuration rather than by
    /// the device or its driver.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::Device(_))
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Phase {phase} failed with {failures} failure(s)")]
    PhaseFailed { phase: ActionPhase, failures: usize },

    #[error("Phase {0} was cancelled")]
    PhaseCancelled(ActionPhase),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_messages() {
        let err = DispatchError::missing_param(ActionType::Calibrate, "target");
        assert_eq!(
            err.to_string(),
            "Action \"calibrate\" requires \"target\" parameter"
        );

        let err = DispatchError::NetworkTargetNotFound {
            target: "left_arm".to_string(),
            network: "left".to_string(),
        };
        assert!(err.to_string().contains("network = left"));
    }

    #[test]
    fn test_configuration_vs_device_errors() {
        assert!(DispatchError::ConflictingAttachModes.is_configuration_error());
        assert!(DispatchError::Unhandled(ActionType::Unknown).is_configuration_error());

        let device_err = DispatchError::from(DeviceError::NotOpen("head".to_string()));
        assert!(!device_err.is_configuration_error());
    }

    #[test]
    fn test_device_error_names_device() {
        let err = DeviceError::driver("torso", "close", DriverError::failed("bus off"));
        assert_eq!(err.device(), "torso");
        assert_eq!(err.to_string(), "Device torso failed to close: bus off");
    }

    #[test]
    fn test_phase_failed_display() {
        let err = OrchestratorError::PhaseFailed {
            phase: ActionPhase::Startup,
            failures: 2,
        };
        assert_eq!(err.to_string(), "Phase startup failed with 2 failure(s)");
    }
}
