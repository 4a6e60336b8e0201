//! PTZ command types

use serde::{Deserialize, Serialize};

/// Continuous pan/tilt velocity, each axis in [-1.0, 1.0].
///
/// (0, 0) is a hardware stop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub pan: f32,
    pub tilt: f32,
}

impl Velocity {
    pub const STOP: Velocity = Velocity { pan: 0.0, tilt: 0.0 };

    /// Build a velocity, clamping each axis. Non-finite values become 0.
    pub fn new(pan: f32, tilt: f32) -> Self {
        Self {
            pan: clamp_axis(pan),
            tilt: clamp_axis(tilt),
        }
    }

    /// Exactly (0, 0)
    pub fn is_stop(&self) -> bool {
        self.pan == 0.0 && self.tilt == 0.0
    }

    /// Whether either axis moved by more than `threshold` relative to `other`
    pub fn differs_from(&self, other: &Velocity, threshold: f32) -> bool {
        (self.pan - other.pan).abs() > threshold || (self.tilt - other.tilt).abs() > threshold
    }
}

fn clamp_axis(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// A request from the tracking logic to the hardware side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PtzRequest {
    /// Continuous move at the given velocity
    Move(Velocity),
    /// Explicit stop
    Stop,
    /// One-shot absolute move to a stored preset
    GotoPreset(String),
}

impl PtzRequest {
    /// Velocity implied by this request (presets imply a stop)
    pub fn velocity(&self) -> Velocity {
        match self {
            PtzRequest::Move(v) => *v,
            PtzRequest::Stop | PtzRequest::GotoPreset(_) => Velocity::STOP,
        }
    }
}
