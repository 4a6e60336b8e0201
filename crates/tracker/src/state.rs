//! Tracker state
//!
//! A single [`Mode`] tag carries the data that only makes sense in that
//! mode, so "tracking while asleep" and similar combinations cannot be
//! represented. Everything else here is shared bookkeeping: trigger and
//! presence signals, the last primary position and rate-limit stamps.

use crate::detection::NormalizedPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Searching payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchSession {
    /// Time of the last preset move; `None` moves on the next cycle
    pub last_move_at: Option<Instant>,
}

/// Tracking payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackSession {
    /// Consecutive cycles without any acceptable target
    pub loss_count: u32,
    /// Set on the first cycle spent following a fallback target
    pub fallback_started_at: Option<Instant>,
}

/// Sleep payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepSession {
    pub entered_at: Instant,
    pub last_check_at: Option<Instant>,
    /// Consecutive normal frames seen by wake checks
    pub normal_streak: u32,
}

/// Active mode with its per-mode data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    Searching(SearchSession),
    Tracking(TrackSession),
    Sleep(SleepSession),
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Idle => ModeKind::Idle,
            Mode::Searching(_) => ModeKind::Searching,
            Mode::Tracking(_) => ModeKind::Tracking,
            Mode::Sleep(_) => ModeKind::Sleep,
        }
    }
}

/// Payload-free mode tag, for logs and transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeKind {
    Idle,
    Searching,
    Tracking,
    Sleep,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModeKind::Idle => "idle",
            ModeKind::Searching => "searching",
            ModeKind::Tracking => "tracking",
            ModeKind::Sleep => "sleep",
        };
        f.write_str(name)
    }
}

/// Tracker state (lives for the whole run)
#[derive(Debug, Clone)]
pub struct TrackerState {
    mode: Mode,
    mode_entered_at: Instant,
    started_at: Instant,

    /// Where the primary subject was last seen
    pub last_primary_center: Option<NormalizedPoint>,

    /// Monotonic preset cursor; wrapped on use
    pub preset_index: usize,

    /// Armed audio trigger
    pub last_audio_trigger_at: Option<Instant>,

    pub person_count: u32,
    pub last_person_signal_at: Option<Instant>,

    pub last_snapshot_at: Option<Instant>,
    pub last_status_log_at: Option<Instant>,
}

impl TrackerState {
    pub fn new(now: Instant) -> Self {
        Self {
            mode: Mode::Idle,
            mode_entered_at: now,
            started_at: now,
            last_primary_center: None,
            preset_index: 0,
            last_audio_trigger_at: None,
            person_count: 0,
            last_person_signal_at: None,
            last_snapshot_at: None,
            last_status_log_at: None,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn mode_mut(&mut self) -> &mut Mode {
        &mut self.mode
    }

    pub fn kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn mode_entered_at(&self) -> Instant {
        self.mode_entered_at
    }

    /// Time spent in the current mode
    pub fn time_in_mode(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.mode_entered_at)
    }

    /// Switch modes, returning the previous kind
    pub fn enter(&mut self, mode: Mode, now: Instant) -> ModeKind {
        let previous = self.mode.kind();
        self.mode = mode;
        self.mode_entered_at = now;
        previous
    }

    /// Zero outside Tracking
    pub fn loss_count(&self) -> u32 {
        match &self.mode {
            Mode::Tracking(session) => session.loss_count,
            _ => 0,
        }
    }

    pub fn fallback_started_at(&self) -> Option<Instant> {
        match &self.mode {
            Mode::Tracking(session) => session.fallback_started_at,
            _ => None,
        }
    }

    /// Zero outside Sleep
    pub fn normal_frame_streak(&self) -> u32 {
        match &self.mode {
            Mode::Sleep(session) => session.normal_streak,
            _ => 0,
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.mode, Mode::Tracking(_))
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.mode, Mode::Searching(_))
    }

    pub fn is_asleep(&self) -> bool {
        matches!(self.mode, Mode::Sleep(_))
    }

    /// Sleep duration so far (zero when awake)
    pub fn sleep_duration(&self, now: Instant) -> Duration {
        match &self.mode {
            Mode::Sleep(session) => now.saturating_duration_since(session.entered_at),
            _ => Duration::ZERO,
        }
    }

    pub fn is_startup_period(&self, now: Instant, ignore: Duration) -> bool {
        now.saturating_duration_since(self.started_at) < ignore
    }

    // --- Audio trigger ---

    pub fn arm_audio_trigger(&mut self, now: Instant) {
        self.last_audio_trigger_at = Some(now);
    }

    pub fn disarm_audio_trigger(&mut self) {
        self.last_audio_trigger_at = None;
    }

    /// Armed and not older than `window`
    pub fn trigger_active(&self, now: Instant, window: Duration) -> bool {
        self.last_audio_trigger_at
            .is_some_and(|at| now.saturating_duration_since(at) <= window)
    }

    /// Search time left before the trigger expires
    pub fn search_remaining(&self, now: Instant, window: Duration) -> Duration {
        self.last_audio_trigger_at
            .map(|at| window.saturating_sub(now.saturating_duration_since(at)))
            .unwrap_or(Duration::ZERO)
    }

    // --- Presence ---

    pub fn update_person_count(&mut self, count: u32, now: Instant) {
        self.person_count = count;
        self.last_person_signal_at = Some(now);
    }

    /// Fails open: a missing or stale count means somebody is present
    pub fn person_present(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_person_signal_at {
            Some(at) if now.saturating_duration_since(at) <= timeout => self.person_count > 0,
            _ => true,
        }
    }

    /// Nobody around, no pending search and nothing tracked: the frame
    /// source can be paused
    pub fn is_idle(&self, now: Instant, person_timeout: Duration, trigger_window: Duration) -> bool {
        matches!(self.mode, Mode::Idle)
            && !self.trigger_active(now, trigger_window)
            && !self.person_present(now, person_timeout)
    }

    // --- Presets ---

    /// Current preset slot (wrapped), advancing the cursor
    pub fn next_preset(&mut self, preset_count: usize) -> usize {
        if preset_count == 0 {
            return 0;
        }
        let index = self.preset_index % preset_count;
        self.preset_index = (index + 1) % preset_count;
        index
    }

    // --- Rate limits ---

    pub fn can_log_status(&self, now: Instant, interval: Duration) -> bool {
        is_due(self.last_status_log_at, now, interval)
    }

    pub fn mark_status_logged(&mut self, now: Instant) {
        self.last_status_log_at = Some(now);
    }

    pub fn can_snapshot(&self, now: Instant, interval: Duration) -> bool {
        is_due(self.last_snapshot_at, now, interval)
    }

    pub fn mark_snapshot(&mut self, now: Instant) {
        self.last_snapshot_at = Some(now);
    }
}

fn is_due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    last.map_or(true, |at| now.saturating_duration_since(at) >= interval)
}
