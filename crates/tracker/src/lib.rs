//! PTZ Tracking Core
//!
//! Keeps a pan/tilt camera pointed at a single subject:
//! - Target selection with a proximity-limited fallback class set
//! - Offset-to-velocity mapping with dead zones and an acceleration curve
//! - Idle / Searching / Tracking / Sleep state machine
//!
//! Nothing in this crate performs I/O. The engine returns a [`Decision`]
//! per cycle and the runtime applies it.

pub mod config;
pub mod decision;
pub mod detection;
pub mod engine;
pub mod handlers;
pub mod selector;
pub mod signals;
pub mod state;
pub mod velocity;

pub use config::TrackerConfig;
pub use decision::{
    Decision, Gate, SnapshotRequest, SourceControl, StatusDetail, StatusObservation, Transition,
    TransitionReason,
};
pub use detection::{BoundingBox, Detection, FrameSize, NormalizedPoint, TargetKind, TargetSelection};
pub use engine::TrackingEngine;
pub use selector::TargetSelector;
pub use signals::{ExternalSignal, SignalEvent};
pub use state::{Mode, ModeKind, SearchSession, SleepSession, TrackSession, TrackerState};
pub use velocity::VelocityCalculator;

use thiserror::Error;

/// Tracker error types
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(String),
}
