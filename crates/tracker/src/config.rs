//! Tracker configuration

use crate::TrackerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Class id of the subject being followed
    pub primary_class: u32,

    /// Substitute classes accepted while the primary is out of view
    pub fallback_classes: Vec<u32>,

    /// Scoring weights (confidence vs. closeness to frame centre)
    pub confidence_weight: f32,
    pub distance_weight: f32,

    /// Normalized offset below which no correction is issued
    pub pan_dead_zone: f32,
    pub tilt_dead_zone: f32,

    pub pan_velocity_multiplier: f32,
    pub tilt_velocity_multiplier: f32,

    /// Acceleration curve exponent
    pub velocity_exponent: f32,

    /// Detection-free cycles tolerated before the target is lost
    pub loss_patience_frames: u32,

    /// Fallback candidates must lie within this normalized radius of the
    /// last primary position
    pub max_fallback_distance: f32,

    /// Maximum time spent following a fallback target (milliseconds)
    pub max_fallback_duration_ms: u64,

    /// Preset tokens visited while searching, in order
    pub search_presets: Vec<String>,

    /// Time between preset moves while searching (milliseconds)
    pub scan_interval_ms: u64,

    /// How long an audio trigger keeps the search alive (milliseconds)
    pub audio_trigger_window_ms: u64,

    /// Person count older than this is ignored (fail open)
    pub person_timeout_ms: u64,

    /// External signals are dropped for this long after start
    pub startup_ignore_ms: u64,

    pub status_log_interval_ms: u64,
    pub search_log_interval_ms: u64,

    /// Minimum time between debug snapshots (milliseconds)
    pub snapshot_interval_ms: u64,

    pub snapshots_enabled: bool,

    /// Wake checks while asleep are at most this frequent
    pub sleep_check_interval_ms: u64,

    /// Consecutive normal frames needed to leave Sleep
    pub sleep_wake_check_count: u32,

    /// Re-check period while idling with the source paused
    pub idle_check_interval_ms: u64,

    /// Evaluation rate limit
    pub target_fps: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            primary_class: 1,
            fallback_classes: vec![0, 2],
            confidence_weight: 0.6,
            distance_weight: 0.4,
            pan_dead_zone: 0.1,
            tilt_dead_zone: 0.15,
            pan_velocity_multiplier: 3.0,
            tilt_velocity_multiplier: 2.0,
            velocity_exponent: 1.3,
            loss_patience_frames: 10,
            max_fallback_distance: 0.3,
            max_fallback_duration_ms: 5000,
            search_presets: vec!["1".to_string(), "2".to_string(), "4".to_string()],
            scan_interval_ms: 30_000,
            audio_trigger_window_ms: 300_000,
            person_timeout_ms: 30_000,
            startup_ignore_ms: 10_000,
            status_log_interval_ms: 10_000,
            search_log_interval_ms: 5000,
            snapshot_interval_ms: 2000,
            snapshots_enabled: true,
            sleep_check_interval_ms: 1000,
            sleep_wake_check_count: 3,
            idle_check_interval_ms: 1000,
            target_fps: 10,
        }
    }
}

impl TrackerConfig {
    pub fn max_fallback_duration(&self) -> Duration {
        Duration::from_millis(self.max_fallback_duration_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn audio_trigger_window(&self) -> Duration {
        Duration::from_millis(self.audio_trigger_window_ms)
    }

    pub fn person_timeout(&self) -> Duration {
        Duration::from_millis(self.person_timeout_ms)
    }

    pub fn startup_ignore(&self) -> Duration {
        Duration::from_millis(self.startup_ignore_ms)
    }

    pub fn status_log_interval(&self) -> Duration {
        Duration::from_millis(self.status_log_interval_ms)
    }

    pub fn search_log_interval(&self) -> Duration {
        Duration::from_millis(self.search_log_interval_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn sleep_check_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_check_interval_ms)
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_millis(self.idle_check_interval_ms)
    }

    /// Minimum time between two evaluation cycles
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }

    pub fn is_fallback_class(&self, class_id: u32) -> bool {
        self.fallback_classes.contains(&class_id)
    }

    /// Reject configurations the control loop cannot run with
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.search_presets.is_empty() {
            return Err(config_error("search_presets must not be empty"));
        }
        if self.search_presets.iter().any(|p| p.trim().is_empty()) {
            return Err(config_error("search_presets must not contain blank tokens"));
        }
        if self.target_fps == 0 {
            return Err(config_error("target_fps must be positive"));
        }
        if self.sleep_wake_check_count == 0 {
            return Err(config_error("sleep_wake_check_count must be positive"));
        }

        let intervals = [
            ("max_fallback_duration_ms", self.max_fallback_duration_ms),
            ("scan_interval_ms", self.scan_interval_ms),
            ("audio_trigger_window_ms", self.audio_trigger_window_ms),
            ("person_timeout_ms", self.person_timeout_ms),
            ("status_log_interval_ms", self.status_log_interval_ms),
            ("search_log_interval_ms", self.search_log_interval_ms),
            ("sleep_check_interval_ms", self.sleep_check_interval_ms),
            ("idle_check_interval_ms", self.idle_check_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(config_error(&format!("{} must be positive", name)));
        }

        for (name, weight) in [
            ("confidence_weight", self.confidence_weight),
            ("distance_weight", self.distance_weight),
        ] {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(config_error(&format!("{} must be finite and non-negative", name)));
            }
        }
        for (name, zone) in [
            ("pan_dead_zone", self.pan_dead_zone),
            ("tilt_dead_zone", self.tilt_dead_zone),
        ] {
            if !(0.0..0.5).contains(&zone) {
                return Err(config_error(&format!("{} must be in [0, 0.5)", name)));
            }
        }
        for (name, value) in [
            ("pan_velocity_multiplier", self.pan_velocity_multiplier),
            ("tilt_velocity_multiplier", self.tilt_velocity_multiplier),
            ("velocity_exponent", self.velocity_exponent),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(config_error(&format!("{} must be positive", name)));
            }
        }

        if self.is_fallback_class(self.primary_class) {
            return Err(config_error("fallback_classes must not contain the primary class"));
        }
        if !(self.max_fallback_distance.is_finite() && self.max_fallback_distance > 0.0) {
            return Err(config_error("max_fallback_distance must be positive"));
        }

        Ok(())
    }
}

fn config_error(message: &str) -> TrackerError {
    TrackerError::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_interval(), Duration::from_millis(100));
        assert_eq!(config.search_presets, vec!["1", "2", "4"]);
    }

    #[test]
    fn test_rejects_empty_presets() {
        let config = TrackerConfig {
            search_presets: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TrackerError::Config(_))));

        let config = TrackerConfig {
            search_presets: vec!["1".into(), "  ".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let config = TrackerConfig {
            scan_interval_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scan_interval_ms"));

        let config = TrackerConfig {
            target_fps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_finite_weights() {
        for weight in [f32::INFINITY, f32::NAN, -0.1] {
            let config = TrackerConfig {
                confidence_weight: weight,
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("confidence_weight"));
        }

        let config = TrackerConfig {
            distance_weight: f32::INFINITY,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            max_fallback_distance: f32::INFINITY,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let config = TrackerConfig {
            pan_dead_zone: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            velocity_exponent: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            max_fallback_distance: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_primary_in_fallback_set() {
        let config = TrackerConfig {
            fallback_classes: vec![0, 1],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
