use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::param::ParamList;
use crate::error::CoreError;

/// Operational phase of a device ensemble.
///
/// Variants are listed in the order a process controller normally enters
/// them; nothing in the orchestrator relies on that order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
    /// Nothing entered yet.
    #[default]
    Unknown,
    Startup,
    Run,
    Interrupt1,
    Interrupt2,
    Interrupt3,
    Shutdown,
}

impl ActionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Startup => "startup",
            Self::Run => "run",
            Self::Interrupt1 => "interrupt1",
            Self::Interrupt2 => "interrupt2",
            Self::Interrupt3 => "interrupt3",
            Self::Shutdown => "shutdown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "startup" => Some(Self::Startup),
            "run" => Some(Self::Run),
            "interrupt1" => Some(Self::Interrupt1),
            "interrupt2" => Some(Self::Interrupt2),
            "interrupt3" => Some(Self::Interrupt3),
            "shutdown" => Some(Self::Shutdown),
            _ => None,
        }
    }

    /// Phases entered from the interrupt path while earlier work may still
    /// be blocked. They must not wait on workers left by previous phases.
    pub fn skips_join_barrier(&self) -> bool {
        matches!(self, Self::Interrupt2 | Self::Interrupt3)
    }
}

impl fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionPhase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownPhase(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// A type name the loader did not recognise. Dispatching it is a
    /// configuration error.
    #[default]
    Unknown,
    Configure,
    Calibrate,
    Attach,
    Abort,
    Detach,
    Park,
    Custom,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Configure => "configure",
            Self::Calibrate => "calibrate",
            Self::Attach => "attach",
            Self::Abort => "abort",
            Self::Detach => "detach",
            Self::Park => "park",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "configure" => Some(Self::Configure),
            "calibrate" => Some(Self::Calibrate),
            "attach" => Some(Self::Attach),
            "abort" => Some(Self::Abort),
            "detach" => Some(Self::Detach),
            "park" => Some(Self::Park),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownActionType(s.to_string()))
    }
}

/// One scheduled operation bound to a device.
///
/// `(phase, level)` selects the execution slot. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    action_type: ActionType,
    phase: ActionPhase,
    level: u32,
    #[serde(default)]
    params: ParamList,
}

impl Action {
    pub fn new(action_type: ActionType, phase: ActionPhase, level: u32) -> Self {
        Self {
            action_type,
            phase,
            level,
            params: ParamList::new(),
        }
    }

    pub fn with_params(mut self, params: ParamList) -> Self {
        self.params = params;
        self
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    pub fn phase(&self) -> ActionPhase {
        self.phase
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }

    /// Whether this action occupies the given execution slot.
    pub fn is_scheduled_at(&self, phase: ActionPhase, level: u32) -> bool {
        self.phase == phase && self.level == level
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(phase = {}, level = {}, type = {}",
            self.phase, self.level, self.action_type
        )?;
        if !self.params.is_empty() {
            write!(f, ", params = [{}]", self.params)?;
        }
        write!(f, ")")
    }
}
