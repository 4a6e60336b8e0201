//! Tracking engine
//!
//! Owns the state machine and exposes the per-cycle entry points used by
//! the evaluation loop:
//!
//! 1. [`apply_signal`](TrackingEngine::apply_signal) for every queued signal
//! 2. while asleep: [`sleep_check_due`](TrackingEngine::sleep_check_due) /
//!    [`evaluate_sleep`](TrackingEngine::evaluate_sleep) only
//! 3. otherwise [`admit`](TrackingEngine::admit) the frame, then
//!    [`evaluate`](TrackingEngine::evaluate) its detections

use crate::config::TrackerConfig;
use crate::decision::{Decision, Gate};
use crate::detection::{Detection, FrameSize, TargetSelection};
use crate::handlers::{self, HandlerContext};
use crate::selector::TargetSelector;
use crate::signals::ExternalSignal;
use crate::state::{Mode, ModeKind, TrackerState};
use crate::velocity::VelocityCalculator;
use crate::TrackerError;
use camera_capture::FrameClass;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Single-target tracking state machine
#[derive(Debug, Clone)]
pub struct TrackingEngine {
    config: TrackerConfig,
    selector: TargetSelector,
    velocity: VelocityCalculator,
    state: TrackerState,
}

impl TrackingEngine {
    /// Create an engine; fails on invalid configuration
    pub fn new(config: TrackerConfig, now: Instant) -> Result<Self, TrackerError> {
        config.validate()?;
        Ok(Self {
            selector: TargetSelector::new(&config),
            velocity: VelocityCalculator::new(&config),
            state: TrackerState::new(now),
            config,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn is_asleep(&self) -> bool {
        self.state.is_asleep()
    }

    /// Record an external signal. Returns `false` if it was dropped.
    pub fn apply_signal(&mut self, signal: ExternalSignal, now: Instant) -> bool {
        if self.state.is_startup_period(now, self.config.startup_ignore()) {
            debug!("Ignoring {} during startup", signal);
            return false;
        }

        match signal {
            ExternalSignal::Audio { active: true } => {
                if self.state.is_asleep() {
                    debug!("Ignoring audio trigger while asleep");
                    return false;
                }
                let window = self.config.audio_trigger_window();
                if !self.state.trigger_active(now, window) {
                    info!(
                        window_secs = window.as_secs(),
                        "Audio detected, search armed"
                    );
                }
                self.state.arm_audio_trigger(now);
            }
            ExternalSignal::Audio { active: false } => {
                debug!("Audio cleared");
            }
            ExternalSignal::PersonCount(count) => {
                if count != self.state.person_count {
                    debug!(count, "Person count changed");
                }
                self.state.update_person_count(count, now);
            }
        }
        true
    }

    /// Pre-detection check for the current frame's classification.
    ///
    /// A privacy frame enters Sleep; a true idle (nobody present, nothing
    /// pending) holds the camera and pauses the source.
    pub fn admit(&mut self, frame_class: Option<FrameClass>, now: Instant) -> Gate {
        if self.state.is_asleep() {
            return Gate::Hold {
                decision: Decision::default(),
                wait: self.next_sleep_check_in(now),
            };
        }

        if frame_class.is_some_and(FrameClass::is_privacy) {
            let decision = handlers::enter_sleep(&mut self.state, now);
            log_transition(&decision);
            return Gate::Hold {
                decision,
                wait: self.config.sleep_check_interval(),
            };
        }

        let idle = self.state.is_idle(
            now,
            self.config.person_timeout(),
            self.config.audio_trigger_window(),
        );
        if idle {
            let ctx = HandlerContext {
                config: &self.config,
                velocity: &self.velocity,
            };
            return Gate::Hold {
                decision: handlers::standby(&ctx, &mut self.state, now),
                wait: self.config.idle_check_interval(),
            };
        }

        Gate::Evaluate
    }

    /// Run one cycle over this frame's detections.
    ///
    /// `frame` is `None` when no frame was available; that and an empty
    /// list both count as "no detection".
    pub fn evaluate(
        &mut self,
        frame: Option<FrameSize>,
        detections: &[Detection],
        now: Instant,
    ) -> Decision {
        if self.state.is_asleep() {
            return Decision::default();
        }

        let selection = frame
            .filter(|f| !f.is_empty())
            .and_then(|f| self.select(f, detections).map(|s| (f, s)));

        let ctx = HandlerContext {
            config: &self.config,
            velocity: &self.velocity,
        };
        let decision = match (selection, self.state.kind()) {
            (Some((frame, selection)), _) => {
                handlers::track(&ctx, &mut self.state, frame, &selection, now)
            }
            (None, ModeKind::Tracking) => handlers::coast(&ctx, &mut self.state, now),
            (None, ModeKind::Searching) => handlers::search(&ctx, &mut self.state, now),
            (None, ModeKind::Idle) => handlers::idle(&ctx, &mut self.state, now),
            (None, ModeKind::Sleep) => Decision::default(),
        };

        log_transition(&decision);
        decision
    }

    /// Primary pass, then the fallback pass if we were already tracking
    fn select(&self, frame: FrameSize, detections: &[Detection]) -> Option<TargetSelection> {
        let primary = self.selector.select(
            detections,
            frame,
            &[self.config.primary_class],
            None,
        );
        if primary.is_some() || !self.state.is_tracking() {
            return primary;
        }
        self.selector.select(
            detections,
            frame,
            &self.config.fallback_classes,
            self.state.last_primary_center,
        )
    }

    /// Whether a wake check is due (always false when awake)
    pub fn sleep_check_due(&self, now: Instant) -> bool {
        match self.state.mode() {
            Mode::Sleep(session) => session.last_check_at.map_or(true, |at| {
                now.saturating_duration_since(at) >= self.config.sleep_check_interval()
            }),
            _ => false,
        }
    }

    /// Time until the next wake check
    pub fn next_sleep_check_in(&self, now: Instant) -> Duration {
        match self.state.mode() {
            Mode::Sleep(session) => session
                .last_check_at
                .map(|at| {
                    self.config
                        .sleep_check_interval()
                        .saturating_sub(now.saturating_duration_since(at))
                })
                .unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    /// Wake check on one frame while asleep
    pub fn evaluate_sleep(&mut self, frame_class: Option<FrameClass>, now: Instant) -> Decision {
        let ctx = HandlerContext {
            config: &self.config,
            velocity: &self.velocity,
        };
        let decision = handlers::sleep_check(&ctx, &mut self.state, frame_class, now);
        log_transition(&decision);
        decision
    }
}

fn log_transition(decision: &Decision) {
    if let Some(t) = &decision.transition {
        info!(from = %t.from, to = %t.to, reason = %t.reason, "Mode transition");
    }
}
