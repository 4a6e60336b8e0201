//! Per-cycle output of the state machine

use crate::state::ModeKind;
use camera_capture::StatusTone;
use ptz_control::{PtzRequest, Velocity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What the frame source should do after this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceControl {
    #[default]
    Keep,
    Pause,
    Resume,
}

/// Why the mode changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    TargetAcquired,
    TargetLost,
    FallbackExpired,
    AudioTrigger,
    SearchExpired,
    PrivacyFrame,
    Woke,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransitionReason::TargetAcquired => "target acquired",
            TransitionReason::TargetLost => "target lost",
            TransitionReason::FallbackExpired => "fallback time exceeded",
            TransitionReason::AudioTrigger => "audio trigger",
            TransitionReason::SearchExpired => "search window over",
            TransitionReason::PrivacyFrame => "privacy frame",
            TransitionReason::Woke => "normal frames again",
        };
        f.write_str(text)
    }
}

/// A mode change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ModeKind,
    pub to: ModeKind,
    pub reason: TransitionReason,
}

/// Mode-specific status payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusDetail {
    Idle {
        person_count: u32,
        person_present: bool,
        /// True when the source is paused because nobody is around
        standby: bool,
    },
    Searching {
        next_move_in: Duration,
        search_left: Duration,
    },
    Tracking {
        loss_count: u32,
        velocity: Velocity,
    },
    Sleeping {
        asleep_for: Duration,
        normal_streak: u32,
    },
}

/// Periodic status event for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusObservation {
    pub mode: ModeKind,
    pub detail: StatusDetail,
}

impl fmt::Display for StatusObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail {
            StatusDetail::Idle {
                person_count,
                person_present,
                standby,
            } => write!(
                f,
                "idle (persons {}, present {}, standby {})",
                person_count, person_present, standby
            ),
            StatusDetail::Searching {
                next_move_in,
                search_left,
            } => write!(
                f,
                "searching (next move in {}s, {}s left)",
                next_move_in.as_secs(),
                search_left.as_secs()
            ),
            StatusDetail::Tracking {
                loss_count,
                velocity,
            } => write!(
                f,
                "tracking (pan {:+.2}, tilt {:+.2}, misses {})",
                velocity.pan, velocity.tilt, loss_count
            ),
            StatusDetail::Sleeping {
                asleep_for,
                normal_streak,
            } => write!(
                f,
                "sleeping ({}s, normal streak {})",
                asleep_for.as_secs(),
                normal_streak
            ),
        }
    }
}

/// Request to persist an annotated copy of the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRequest {
    pub label: String,
    pub tone: StatusTone,
    pub bbox: Option<[f32; 4]>,
    /// Detection confidence, drawn next to the box
    pub confidence: Option<f32>,
    /// Command sent this cycle, drawn in the status bar
    pub velocity: Option<Velocity>,
}

impl SnapshotRequest {
    /// Status-bar-only snapshot without a target
    pub fn status(label: impl Into<String>, tone: StatusTone) -> Self {
        Self {
            label: label.into(),
            tone,
            bbox: None,
            confidence: None,
            velocity: None,
        }
    }
}

/// Everything a cycle wants done; applying it is the caller's job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pub command: Option<PtzRequest>,
    pub transition: Option<Transition>,
    pub observation: Option<StatusObservation>,
    pub snapshot: Option<SnapshotRequest>,
    pub source: SourceControl,
}

impl Decision {
    pub fn command(request: PtzRequest) -> Self {
        Self {
            command: Some(request),
            ..Default::default()
        }
    }

    pub fn stop() -> Self {
        Self::command(PtzRequest::Stop)
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn with_source(mut self, source: SourceControl) -> Self {
        self.source = source;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Decision::default()
    }
}

/// Result of the pre-detection admission check
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// Run detection and evaluate this frame
    Evaluate,
    /// Skip detection, apply `decision`, and wait before the next cycle
    Hold { decision: Decision, wait: Duration },
}
