//! Proprioceptive signals: drive activity and collisions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use pal_types::{MotorState, PalError};
use serde::Deserialize;
use tracing::{debug, info};

/// Directions the drive controller turns the wheels for. Anything else,
/// `"stop"` included, halts the motors.
const DRIVE_DIRECTIONS: [&str; 4] = ["forward", "backward", "left", "right"];

/// Drive command as published on the move topic. Speed only scales the
/// wheels, so it is not read here.
#[derive(Debug, Deserialize)]
struct MoveCommand {
    #[serde(default = "default_direction")]
    direction: String,
}

fn default_direction() -> String {
    "stop".to_string()
}

/// Collision notification from the frame-difference detector.
#[derive(Debug, Default, Deserialize)]
struct CollisionEvent {
    #[serde(default = "default_true")]
    collision: bool,
    #[serde(default)]
    diff: f64,
}

fn default_true() -> bool {
    true
}

/// Motor state plus a collision latch, shared between the sensor pump and
/// the cognitive loop.
#[derive(Debug, Default)]
pub struct BodySignals {
    motor: Mutex<MotorState>,
    collided: AtomicBool,
}

impl BodySignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn motor_state(&self) -> MotorState {
        *self.motor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_motor_state(&self, state: MotorState) {
        let mut motor = self.motor.lock().unwrap_or_else(PoisonError::into_inner);
        if *motor != state {
            debug!(from = ?*motor, to = ?state, "motor state changed");
        }
        *motor = state;
    }

    /// Infer motor activity from a drive command.
    ///
    /// Only the four drive directions mean running. `"stop"`, an unknown
    /// direction or a missing one means stopped, whatever the speed.
    pub fn apply_move_value(&self, payload: &serde_json::Value) -> Result<MotorState, PalError> {
        let cmd = MoveCommand::deserialize(payload)
            .map_err(|e| PalError::InvalidPayload(format!("move: {e}")))?;
        let state = if DRIVE_DIRECTIONS.contains(&cmd.direction.as_str()) {
            MotorState::Running
        } else {
            MotorState::Stopped
        };
        self.set_motor_state(state);
        Ok(state)
    }

    /// Latch a collision until the next cycle consumes it.
    pub fn record_collision(&self) {
        self.collided.store(true, Ordering::Release);
    }

    /// Latch a collision from a detector event. Events with
    /// `collision: false` are ignored.
    pub fn apply_collision_value(&self, payload: &serde_json::Value) -> Result<bool, PalError> {
        let event = CollisionEvent::deserialize(payload)
            .map_err(|e| PalError::InvalidPayload(format!("collision: {e}")))?;
        if event.collision {
            info!(diff = event.diff, "collision detected");
            self.record_collision();
        }
        Ok(event.collision)
    }

    /// Read and clear the collision latch.
    pub fn take_collision(&self) -> bool {
        self.collided.swap(false, Ordering::AcqRel)
    }
}
