//! Mode handlers
//!
//! One function per mode. Each takes the state and the current cycle's
//! inputs, updates the state, and describes the side effects as a
//! [`Decision`]. None of them touch hardware or disk.

use crate::config::TrackerConfig;
use crate::decision::{
    Decision, SnapshotRequest, SourceControl, StatusDetail, StatusObservation, Transition,
    TransitionReason,
};
use crate::detection::{FrameSize, TargetKind, TargetSelection};
use crate::state::{Mode, ModeKind, SearchSession, SleepSession, TrackSession, TrackerState};
use crate::velocity::VelocityCalculator;
use camera_capture::{FrameClass, StatusTone};
use ptz_control::PtzRequest;
use std::time::Instant;
use tracing::{debug, info};

/// Read-only inputs shared by the handlers
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub config: &'a TrackerConfig,
    pub velocity: &'a VelocityCalculator,
}

/// A target is visible: follow it (entering Tracking if needed)
pub fn track(
    ctx: &HandlerContext<'_>,
    state: &mut TrackerState,
    frame: FrameSize,
    selection: &TargetSelection,
    now: Instant,
) -> Decision {
    let mut session = match state.mode() {
        Mode::Tracking(session) => *session,
        _ => TrackSession::default(),
    };

    match selection.kind {
        TargetKind::Primary => {
            session.loss_count = 0;
            session.fallback_started_at = None;
            state.last_primary_center = Some(selection.center);
        }
        TargetKind::Fallback => {
            let started = match session.fallback_started_at {
                Some(started) => started,
                None => {
                    info!(
                        class = selection.detection.class_id,
                        "Primary target missing, following fallback"
                    );
                    now
                }
            };
            if now.saturating_duration_since(started) >= ctx.config.max_fallback_duration() {
                return lose_target(ctx, state, TransitionReason::FallbackExpired, now);
            }
            session.fallback_started_at = Some(started);
            session.loss_count = 0;
        }
    }

    let transition = if state.is_tracking() {
        *state.mode_mut() = Mode::Tracking(session);
        None
    } else {
        let from = state.enter(Mode::Tracking(session), now);
        Some(Transition {
            from,
            to: ModeKind::Tracking,
            reason: TransitionReason::TargetAcquired,
        })
    };

    let (x, y) = selection.pixel_center();
    let velocity = ctx.velocity.calculate(x, y, frame);
    let confidence = selection.detection.confidence;

    let mut decision = Decision::command(PtzRequest::Move(velocity));
    decision.transition = transition;

    let label = match selection.kind {
        TargetKind::Primary => "[TRACKING]".to_string(),
        TargetKind::Fallback => format!("[FALLBACK] class {}", selection.detection.class_id),
    };
    decision.snapshot = snapshot_if_due(
        ctx,
        state,
        now,
        SnapshotRequest {
            label,
            tone: StatusTone::Tracking,
            bbox: Some(selection.detection.bbox.to_array()),
            confidence: Some(confidence),
            velocity: Some(velocity),
        },
    );

    if state.can_log_status(now, ctx.config.status_log_interval()) {
        state.mark_status_logged(now);
        decision.observation = Some(StatusObservation {
            mode: ModeKind::Tracking,
            detail: StatusDetail::Tracking {
                loss_count: 0,
                velocity,
            },
        });
    }

    decision
}

/// Tracking with nothing acceptable in view: hold still, then give up
pub fn coast(ctx: &HandlerContext<'_>, state: &mut TrackerState, now: Instant) -> Decision {
    let mut session = match state.mode() {
        Mode::Tracking(session) => *session,
        _ => return Decision::default(),
    };

    session.loss_count += 1;
    if session.loss_count > ctx.config.loss_patience_frames {
        return lose_target(ctx, state, TransitionReason::TargetLost, now);
    }

    debug!(
        misses = session.loss_count,
        patience = ctx.config.loss_patience_frames,
        "Target not visible, holding"
    );
    *state.mode_mut() = Mode::Tracking(session);
    Decision::stop()
}

/// Leave Tracking: stop, forget the anchor, resume a pending search or idle
pub fn lose_target(
    ctx: &HandlerContext<'_>,
    state: &mut TrackerState,
    reason: TransitionReason,
    now: Instant,
) -> Decision {
    let next = if state.trigger_active(now, ctx.config.audio_trigger_window()) {
        // Hold at the spot where the target vanished for one scan interval
        Mode::Searching(SearchSession {
            last_move_at: Some(now),
        })
    } else {
        Mode::Idle
    };
    let to = next.kind();

    state.last_primary_center = None;
    let from = state.enter(next, now);

    let label = match reason {
        TransitionReason::FallbackExpired => "[LOST] Fallback time exceeded",
        _ => "[LOST] Target Disappeared",
    };

    let mut decision = Decision::stop().with_transition(Transition { from, to, reason });
    decision.snapshot = snapshot_if_due(
        ctx,
        state,
        now,
        SnapshotRequest::status(label, StatusTone::Alert),
    );
    decision
}

/// Audio-triggered search across the preset list
pub fn search(ctx: &HandlerContext<'_>, state: &mut TrackerState, now: Instant) -> Decision {
    let window = ctx.config.audio_trigger_window();
    if !state.trigger_active(now, window) {
        state.disarm_audio_trigger();
        let from = state.enter(Mode::Idle, now);
        return Decision::stop().with_transition(Transition {
            from,
            to: ModeKind::Idle,
            reason: TransitionReason::SearchExpired,
        });
    }

    let session = match state.mode() {
        Mode::Searching(session) => *session,
        _ => SearchSession::default(),
    };
    let scan = ctx.config.scan_interval();
    let since_move = session
        .last_move_at
        .map(|at| now.saturating_duration_since(at));

    if since_move.map_or(true, |elapsed| elapsed >= scan) {
        let presets = &ctx.config.search_presets;
        let index = state.next_preset(presets.len());
        let Some(token) = presets.get(index).cloned() else {
            return Decision::default();
        };
        *state.mode_mut() = Mode::Searching(SearchSession {
            last_move_at: Some(now),
        });
        info!(preset = %token, "Searching, moving to preset");

        let mut decision = Decision::command(PtzRequest::GotoPreset(token.clone()));
        decision.snapshot = snapshot_if_due(
            ctx,
            state,
            now,
            SnapshotRequest::status(format!("[SEARCHING] Preset {}", token), StatusTone::Searching),
        );
        return decision;
    }

    if !state.can_log_status(now, ctx.config.search_log_interval()) {
        return Decision::default();
    }
    state.mark_status_logged(now);

    let next_move_in = scan.saturating_sub(since_move.unwrap_or_default());
    let search_left = state.search_remaining(now, window);
    Decision {
        observation: Some(StatusObservation {
            mode: ModeKind::Searching,
            detail: StatusDetail::Searching {
                next_move_in,
                search_left,
            },
        }),
        snapshot: snapshot_if_due(
            ctx,
            state,
            now,
            SnapshotRequest::status(
                format!(
                    "[SEARCHING] next move in {}s ({}s left)",
                    next_move_in.as_secs(),
                    search_left.as_secs()
                ),
                StatusTone::Searching,
            ),
        ),
        ..Default::default()
    }
}

/// Nothing to follow: keep the camera stopped, start a search if triggered
pub fn idle(ctx: &HandlerContext<'_>, state: &mut TrackerState, now: Instant) -> Decision {
    if state.trigger_active(now, ctx.config.audio_trigger_window()) {
        let from = state.enter(Mode::Searching(SearchSession::default()), now);
        let mut decision = search(ctx, state, now);
        decision.transition = Some(Transition {
            from,
            to: ModeKind::Searching,
            reason: TransitionReason::AudioTrigger,
        });
        return decision;
    }

    let mut decision = Decision::stop();
    if state.can_log_status(now, ctx.config.status_log_interval()) {
        state.mark_status_logged(now);
        decision.observation = Some(idle_observation(ctx, state, now, false));
        decision.snapshot = snapshot_if_due(
            ctx,
            state,
            now,
            SnapshotRequest::status("[IDLE] Waiting", StatusTone::Idle),
        );
    }
    decision
}

/// Nobody present and nothing pending: stop and pause the frame source
pub fn standby(ctx: &HandlerContext<'_>, state: &mut TrackerState, now: Instant) -> Decision {
    let mut decision = Decision::stop().with_source(SourceControl::Pause);
    if state.can_log_status(now, ctx.config.status_log_interval()) {
        state.mark_status_logged(now);
        decision.observation = Some(idle_observation(ctx, state, now, true));
    }
    decision
}

fn idle_observation(
    ctx: &HandlerContext<'_>,
    state: &TrackerState,
    now: Instant,
    standby: bool,
) -> StatusObservation {
    StatusObservation {
        mode: ModeKind::Idle,
        detail: StatusDetail::Idle {
            person_count: state.person_count,
            person_present: state.person_present(now, ctx.config.person_timeout()),
            standby,
        },
    }
}

/// Privacy frame: stop, drop all tracking and search state, pause the source
pub fn enter_sleep(state: &mut TrackerState, now: Instant) -> Decision {
    state.disarm_audio_trigger();
    state.last_primary_center = None;
    let from = state.enter(
        Mode::Sleep(SleepSession {
            entered_at: now,
            last_check_at: Some(now),
            normal_streak: 0,
        }),
        now,
    );
    Decision::stop()
        .with_transition(Transition {
            from,
            to: ModeKind::Sleep,
            reason: TransitionReason::PrivacyFrame,
        })
        .with_source(SourceControl::Pause)
}

/// One throttled wake check. `frame_class` is `None` when no frame was
/// available; such a check neither counts nor resets the streak.
pub fn sleep_check(
    ctx: &HandlerContext<'_>,
    state: &mut TrackerState,
    frame_class: Option<FrameClass>,
    now: Instant,
) -> Decision {
    let mut session = match state.mode() {
        Mode::Sleep(session) => *session,
        _ => return Decision::default(),
    };
    session.last_check_at = Some(now);

    match frame_class {
        None => {
            *state.mode_mut() = Mode::Sleep(session);
            Decision::default()
        }
        Some(class) if class.is_normal() => {
            session.normal_streak += 1;
            if session.normal_streak < ctx.config.sleep_wake_check_count {
                *state.mode_mut() = Mode::Sleep(session);
                return Decision::default();
            }

            let asleep_for = now.saturating_duration_since(session.entered_at);
            state.enter(Mode::Idle, now);
            Decision {
                transition: Some(Transition {
                    from: ModeKind::Sleep,
                    to: ModeKind::Idle,
                    reason: TransitionReason::Woke,
                }),
                observation: Some(StatusObservation {
                    mode: ModeKind::Sleep,
                    detail: StatusDetail::Sleeping {
                        asleep_for,
                        normal_streak: session.normal_streak,
                    },
                }),
                source: SourceControl::Resume,
                ..Default::default()
            }
        }
        Some(_) => {
            session.normal_streak = 0;
            *state.mode_mut() = Mode::Sleep(session);

            let mut decision = Decision::default().with_source(SourceControl::Pause);
            if state.can_log_status(now, ctx.config.status_log_interval()) {
                state.mark_status_logged(now);
                decision.observation = Some(StatusObservation {
                    mode: ModeKind::Sleep,
                    detail: StatusDetail::Sleeping {
                        asleep_for: now.saturating_duration_since(session.entered_at),
                        normal_streak: 0,
                    },
                });
            }
            decision
        }
    }
}

fn snapshot_if_due(
    ctx: &HandlerContext<'_>,
    state: &mut TrackerState,
    now: Instant,
    request: SnapshotRequest,
) -> Option<SnapshotRequest> {
    if !ctx.config.snapshots_enabled || !state.can_snapshot(now, ctx.config.snapshot_interval()) {
        return None;
    }
    state.mark_snapshot(now);
    Some(request)
}
