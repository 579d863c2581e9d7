//! Event types for robot lifecycle observation

use chrono::{DateTime, Utc};
use robotinterface_core::{ActionPhase, ActionType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Position of the event in its robot's stream, starting at 1
    pub sequence: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(sequence: u64, event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Everything the orchestrator reports while driving a robot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Phase events
    #[serde(rename = "phase.started")]
    PhaseStarted { robot: String, phase: ActionPhase },

    /// Phase completed; `cancelled` is set when the phase was superseded
    /// or interrupted before all its levels ran
    #[serde(rename = "phase.finished")]
    PhaseFinished {
        robot: String,
        phase: ActionPhase,
        success: bool,
        cancelled: bool,
    },

    // Level events
    #[serde(rename = "level.started")]
    LevelStarted {
        robot: String,
        phase: ActionPhase,
        level: u32,
    },

    /// Every worker dispatched for the level has been joined
    #[serde(rename = "level.finished")]
    LevelFinished {
        robot: String,
        phase: ActionPhase,
        level: u32,
    },

    /// One action was handed to its device
    #[serde(rename = "action.dispatched")]
    ActionDispatched {
        robot: String,
        phase: ActionPhase,
        level: u32,
        device: String,
        action: ActionType,
        success: bool,
        error: Option<String>,
    },

    // Device events
    #[serde(rename = "device.opened")]
    DeviceOpened {
        robot: String,
        device: String,
        success: bool,
    },

    #[serde(rename = "device.closed")]
    DeviceClosed {
        robot: String,
        device: String,
        success: bool,
    },

    /// Stop was requested on every running device worker
    #[serde(rename = "devices.interrupted")]
    DevicesInterrupted { robot: String },
}

impl Event {
    /// Name of the robot that produced this event
    pub fn robot(&self) -> &str {
        match self {
            Event::PhaseStarted { robot, .. }
            | Event::PhaseFinished { robot, .. }
            | Event::LevelStarted { robot, .. }
            | Event::LevelFinished { robot, .. }
            | Event::ActionDispatched { robot, .. }
            | Event::DeviceOpened { robot, .. }
            | Event::DeviceClosed { robot, .. }
            | Event::DevicesInterrupted { robot } => robot,
        }
    }

    /// Get the phase this event belongs to, if any
    pub fn phase(&self) -> Option<ActionPhase> {
        match self {
            Event::PhaseStarted { phase, .. }
            | Event::PhaseFinished { phase, .. }
            | Event::LevelStarted { phase, .. }
            | Event::LevelFinished { phase, .. }
            | Event::ActionDispatched { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
