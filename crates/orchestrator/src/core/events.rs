//! Lifecycle event emitter with sequence numbering.
//!
//! Every emission takes the next sequence number, with or without a bus
//! attached. Published envelopes carry it so subscribers can order events
//! coming from concurrent phases.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use robot_events::{Event, EventBus, EventEnvelope};
use robotinterface_core::{ActionPhase, ActionType};

/// Publishes lifecycle events for one robot.
#[derive(Clone)]
pub struct LifecycleEmitter {
    robot: String,
    bus: Option<EventBus>,
    sequence: Arc<AtomicU64>,
}

impl LifecycleEmitter {
    pub fn new(robot: impl Into<String>) -> Self {
        Self {
            robot: robot.into(),
            bus: None,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn emit(&self, event: Event) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(ref bus) = self.bus {
            bus.publish(EventEnvelope::new(sequence, event));
        }
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn phase_started(&self, phase: ActionPhase) {
        self.emit(Event::PhaseStarted {
            robot: self.robot.clone(),
            phase,
        });
    }

    pub fn phase_finished(&self, phase: ActionPhase, success: bool, cancelled: bool) {
        self.emit(Event::PhaseFinished {
            robot: self.robot.clone(),
            phase,
            success,
            cancelled,
        });
    }

    pub fn level_started(&self, phase: ActionPhase, level: u32) {
        self.emit(Event::LevelStarted {
            robot: self.robot.clone(),
            phase,
            level,
        });
    }

    pub fn level_finished(&self, phase: ActionPhase, level: u32) {
        self.emit(Event::LevelFinished {
            robot: self.robot.clone(),
            phase,
            level,
        });
    }

    pub fn action_dispatched(
        &self,
        phase: ActionPhase,
        level: u32,
        device: &str,
        action: ActionType,
        error: Option<String>,
    ) {
        self.emit(Event::ActionDispatched {
            robot: self.robot.clone(),
            phase,
            level,
            device: device.to_string(),
            action,
            success: error.is_none(),
            error,
        });
    }

    pub fn device_opened(&self, device: &str, success: bool) {
        self.emit(Event::DeviceOpened {
            robot: self.robot.clone(),
            device: device.to_string(),
            success,
        });
    }

    pub fn device_closed(&self, device: &str, success: bool) {
        self.emit(Event::DeviceClosed {
            robot: self.robot.clone(),
            device: device.to_string(),
            success,
        });
    }

    pub fn devices_interrupted(&self) {
        self.emit(Event::DevicesInterrupted {
            robot: self.robot.clone(),
        });
    }
}

impl std::fmt::Debug for LifecycleEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEmitter")
            .field("robot", &self.robot)
            .field("has_bus", &self.bus.is_some())
            .field("sequence", &self.current_sequence())
            .finish()
    }
}
