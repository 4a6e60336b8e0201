//! PTZ Tracker Runtime
//!
//! Wires the tracking core to its collaborators:
//! - Layered settings (file + environment) with startup validation
//! - Logging setup
//! - The evaluation loop (frame -> classification -> detection -> decision)
//! - Spawning and bounded shutdown of all loops

pub mod detector;
pub mod logging;
pub mod orchestrator;
pub mod runtime;
pub mod settings;

pub use detector::{DetectorError, ObjectDetector};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use orchestrator::{CycleStats, Orchestrator};
pub use runtime::{RuntimeHandle, RuntimeReport, TrackerRuntime};
pub use settings::Settings;

use thiserror::Error;

/// Runtime error types
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings could not be loaded: {0}")]
    Settings(#[from] config::ConfigError),

    #[error(transparent)]
    Tracker(#[from] tracker::TrackerError),

    #[error(transparent)]
    Bridge(#[from] signal_bridge::BridgeError),

    #[error(transparent)]
    Camera(#[from] camera_capture::CameraError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Task {0} failed: {1}")]
    Join(&'static str, String),

    #[error("Task {0} did not stop in time")]
    ShutdownTimeout(&'static str),
}
