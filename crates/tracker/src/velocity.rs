//! Offset-to-velocity mapping

use crate::config::TrackerConfig;
use crate::detection::FrameSize;
use ptz_control::Velocity;

/// Maps a target's offset from frame centre to a pan/tilt command.
///
/// Outside the dead zone the speed is `min((|d| * multiplier)^exponent, 1)`,
/// so corrections start small and grow super-linearly toward the edge.
/// Tilt is inverted: a target below centre (positive screen `dy`) gives a
/// negative tilt. The mechanical sign convention is hardware-specific.
#[derive(Debug, Clone)]
pub struct VelocityCalculator {
    pan_dead_zone: f32,
    tilt_dead_zone: f32,
    pan_multiplier: f32,
    tilt_multiplier: f32,
    exponent: f32,
}

impl VelocityCalculator {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            pan_dead_zone: config.pan_dead_zone,
            tilt_dead_zone: config.tilt_dead_zone,
            pan_multiplier: config.pan_velocity_multiplier,
            tilt_multiplier: config.tilt_velocity_multiplier,
            exponent: config.velocity_exponent,
        }
    }

    /// Command for a target at pixel position (`x`, `y`)
    pub fn calculate(&self, x: f32, y: f32, frame: FrameSize) -> Velocity {
        if frame.is_empty() {
            return Velocity::STOP;
        }
        let w = frame.width as f32;
        let h = frame.height as f32;
        let dx = (x - w / 2.0) / w;
        let dy = (y - h / 2.0) / h;
        self.from_offset(dx, dy)
    }

    /// Command for a normalized offset from centre (roughly -0.5..0.5)
    pub fn from_offset(&self, dx: f32, dy: f32) -> Velocity {
        let pan = axis_speed(dx, self.pan_dead_zone, self.pan_multiplier, self.exponent);
        let tilt = axis_speed(-dy, self.tilt_dead_zone, self.tilt_multiplier, self.exponent);
        Velocity::new(pan, tilt)
    }
}

fn axis_speed(offset: f32, dead_zone: f32, multiplier: f32, exponent: f32) -> f32 {
    if !offset.is_finite() || offset.abs() <= dead_zone {
        return 0.0;
    }
    let speed = (offset.abs() * multiplier).powf(exponent).min(1.0);
    speed.copysign(offset)
}
