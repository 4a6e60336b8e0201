//! Layered settings
//!
//! Defaults, then an optional file, then `PTZ_TRACKER__*` environment
//! variables (`__` separates nesting levels, e.g.
//! `PTZ_TRACKER__TRACKER__TARGET_FPS=5`).

use crate::logging::LoggingConfig;
use crate::RuntimeError;
use camera_capture::{AnalyzerConfig, SnapshotConfig};
use ptz_control::CommandLoopConfig;
use serde::{Deserialize, Serialize};
use signal_bridge::BridgeConfig;
use std::path::Path;
use tracker::TrackerConfig;

pub const ENV_PREFIX: &str = "PTZ_TRACKER";

/// Complete runtime settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tracker: TrackerConfig,
    pub analyzer: AnalyzerConfig,
    pub ptz: CommandLoopConfig,
    pub mqtt: BridgeConfig,
    pub snapshots: SnapshotConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load and validate settings
    pub fn load(path: Option<&Path>) -> Result<Self, RuntimeError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings no loop can start with
    pub fn validate(&self) -> Result<(), RuntimeError> {
        self.tracker.validate()?;

        let ptz = &self.ptz;
        if ptz.tick_interval_ms == 0 || ptz.reconnect_delay_ms == 0 || ptz.shutdown_timeout_ms == 0 {
            return Err(RuntimeError::Config(
                "ptz intervals must be positive".to_string(),
            ));
        }
        if !(ptz.velocity_threshold >= 0.0 && ptz.velocity_threshold < 1.0) {
            return Err(RuntimeError::Config(
                "ptz.velocity_threshold must be in [0, 1)".to_string(),
            ));
        }
        // Commands must drain faster than the tracker produces them
        if ptz.tick_interval() >= self.tracker.frame_interval() {
            return Err(RuntimeError::Config(format!(
                "ptz.tick_interval_ms ({}) must be shorter than the evaluation period ({}ms)",
                ptz.tick_interval_ms,
                self.tracker.frame_interval().as_millis()
            )));
        }

        let analyzer = &self.analyzer;
        if !(analyzer.privacy_brightness_threshold >= 0.0 && analyzer.privacy_std_threshold >= 0.0) {
            return Err(RuntimeError::Config(
                "analyzer thresholds must be non-negative".to_string(),
            ));
        }

        if self.snapshots.enabled && self.snapshots.max_files == 0 {
            return Err(RuntimeError::Config(
                "snapshots.max_files must be positive".to_string(),
            ));
        }

        if self.mqtt.enabled {
            self.mqtt.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tracker.target_fps, 10);
        assert_eq!(settings.ptz.tick_interval_ms, 50);
    }

    #[test]
    fn test_ptz_tick_must_beat_frame_rate() {
        let mut settings = Settings::default();
        // 100ms frame period, 100ms tick
        settings.tracker.target_fps = 10;
        settings.ptz.tick_interval_ms = 100;
        assert!(matches!(settings.validate(), Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_tracker_errors_propagate() {
        let mut settings = Settings::default();
        settings.ptz.tick_interval_ms = 50;
        settings.tracker.search_presets.clear();
        assert!(matches!(settings.validate(), Err(RuntimeError::Tracker(_))));
    }

    #[test]
    fn test_disabled_bridge_is_not_validated() {
        let mut settings = Settings::default();
        settings.ptz.tick_interval_ms = 50;
        settings.mqtt.camera_name = "#".to_string();
        assert!(settings.validate().is_err());

        settings.mqtt.enabled = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[tracker]
target_fps = 5
search_presets = ["3", "5"]
pan_dead_zone = 0.05

[ptz]
tick_interval_ms = 50

[mqtt]
camera_name = "nursery"

[logging]
format = "json"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.tracker.target_fps, 5);
        assert_eq!(settings.tracker.search_presets, vec!["3", "5"]);
        assert_eq!(settings.tracker.pan_dead_zone, 0.05);
        // Untouched fields keep their defaults
        assert_eq!(settings.tracker.loss_patience_frames, 10);
        assert_eq!(settings.ptz.tick_interval_ms, 50);
        assert_eq!(settings.mqtt.person_topic(), "frigate/nursery/person");
        assert_eq!(settings.logging.format, crate::LogFormat::Json);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, "[tracker]\nsearch_presets = []\n").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(RuntimeError::Settings(_))
        ));
    }
}
