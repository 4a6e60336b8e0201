//! Camera Capture Library for the PTZ Tracker
//!
//! Frame-side collaborators of the tracking core:
//! - Latest-frame slot with pause/resume for power saving
//! - Luminance statistics and privacy/blackout classification
//! - Annotated debug snapshots with file retention

pub mod analyzer;
pub mod frame;
pub mod snapshot;
pub mod source;

pub use analyzer::{AnalyzerConfig, FrameAnalyzer, FrameClass};
pub use frame::{LuminanceStats, VideoFrame};
pub use snapshot::{Annotation, SnapshotConfig, SnapshotSink, SnapshotWriter, StatusTone};
pub use source::{FrameSource, LatestFrameBuffer};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Snapshot directory unavailable: {0}")]
    SnapshotDir(String),

    #[error("Overlay font unusable: {0}")]
    Font(String),

    #[error("Snapshot encoding failed: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
