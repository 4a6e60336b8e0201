//! PTZ Command Loop
//!
//! Runs on its own fixed tick, independent of detection processing. The
//! tracking side only ever overwrites a single "desired command" cell
//! (last write wins); each tick compares it with what was last sent and
//! talks to the hardware only when something meaningful changed.

use crate::command::{PtzRequest, Velocity};
use crate::error::PtzError;
use crate::link::PtzLink;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Configuration for the command loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandLoopConfig {
    /// Tick interval in milliseconds; must be shorter than the evaluation period
    pub tick_interval_ms: u64,
    /// Minimum per-axis change that triggers a re-send
    pub velocity_threshold: f32,
    /// Fixed backoff after a failed reconnect, in milliseconds
    pub reconnect_delay_ms: u64,
    /// Bound on waiting for the loop to finish at shutdown, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for CommandLoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            velocity_threshold: 0.01,
            reconnect_delay_ms: 3000,
            shutdown_timeout_ms: 2000,
        }
    }
}

impl CommandLoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// The single shared cell between the tracker and the loop
#[derive(Debug, Default)]
struct DesiredCommand {
    velocity: Velocity,
    preset: Option<String>,
}

/// Cheap, cloneable writer for the desired command.
///
/// Never blocks on I/O; safe to call from the evaluation loop.
#[derive(Debug, Clone, Default)]
pub struct PtzHandle {
    desired: Arc<Mutex<DesiredCommand>>,
}

impl PtzHandle {
    /// Overwrite the desired continuous velocity (clamped)
    pub fn set_velocity(&self, pan: f32, tilt: f32) {
        let velocity = Velocity::new(pan, tilt);
        self.with_desired(|d| d.velocity = velocity);
    }

    /// Request a stop
    pub fn stop(&self) {
        self.with_desired(|d| d.velocity = Velocity::STOP);
    }

    /// Request a one-shot move to a preset; also zeroes the desired velocity
    pub fn goto_preset(&self, token: impl Into<String>) {
        let token = token.into();
        self.with_desired(|d| {
            d.preset = Some(token);
            d.velocity = Velocity::STOP;
        });
    }

    /// Forward a tracker request
    pub fn apply(&self, request: &PtzRequest) {
        match request {
            PtzRequest::Move(v) => self.set_velocity(v.pan, v.tilt),
            PtzRequest::Stop => self.stop(),
            PtzRequest::GotoPreset(token) => self.goto_preset(token.clone()),
        }
    }

    /// Current desired velocity
    pub fn desired_velocity(&self) -> Velocity {
        self.with_desired(|d| d.velocity)
    }

    fn take(&self) -> (Velocity, Option<String>) {
        self.with_desired(|d| (d.velocity, d.preset.take()))
    }

    fn with_desired<T>(&self, f: impl FnOnce(&mut DesiredCommand) -> T) -> T {
        let mut guard = self.desired.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Link was down and is now up; nothing dispatched this tick
    Reconnected,
    /// Link is still down
    ReconnectFailed,
    /// A velocity or stop command was sent
    Dispatched,
    /// A preset move was sent
    PresetSent,
    /// Desired command matched the last one sent
    Suppressed,
    /// Sending failed; the link was dropped
    DispatchFailed,
}

/// Counters kept by the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandLoopStats {
    pub dispatched: u64,
    pub suppressed: u64,
    pub failures: u64,
    pub reconnects: u64,
    pub reconnect_failures: u64,
}

/// Whether `desired` must be sent given that `last` was the last command sent.
///
/// A transition to exactly (0, 0) is always sent so the camera cannot drift.
pub fn needs_dispatch(desired: &Velocity, last: &Velocity, threshold: f32) -> bool {
    desired.differs_from(last, threshold) || (desired.is_stop() && !last.is_stop())
}

/// Fixed-tick dispatcher that owns the hardware link
pub struct PtzCommandLoop<L: PtzLink> {
    link: L,
    config: CommandLoopConfig,
    desired: Arc<Mutex<DesiredCommand>>,
    last_sent: Velocity,
    stats: CommandLoopStats,
}

impl<L: PtzLink> PtzCommandLoop<L> {
    /// Create a loop around `link` and the handle that feeds it
    pub fn new(link: L, config: CommandLoopConfig) -> (Self, PtzHandle) {
        let handle = PtzHandle::default();
        let command_loop = Self {
            link,
            config,
            desired: Arc::clone(&handle.desired),
            last_sent: Velocity::STOP,
            stats: CommandLoopStats::default(),
        };
        (command_loop, handle)
    }

    /// Last velocity successfully sent to the hardware
    pub fn last_sent(&self) -> Velocity {
        self.last_sent
    }

    pub fn stats(&self) -> CommandLoopStats {
        self.stats
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn take_desired(&self) -> (Velocity, Option<String>) {
        PtzHandle {
            desired: Arc::clone(&self.desired),
        }
        .take()
    }

    /// Run one tick: reconnect if needed, otherwise dispatch what changed
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.link.is_connected() {
            return match self.link.connect().await {
                Ok(()) => {
                    info!("PTZ link connected");
                    self.stats.reconnects += 1;
                    metrics::counter!("ptz_reconnects_total").increment(1);
                    TickOutcome::Reconnected
                }
                Err(e) => {
                    warn!(
                        "PTZ connection failed: {} (retrying in {}ms)",
                        e, self.config.reconnect_delay_ms
                    );
                    self.stats.reconnect_failures += 1;
                    TickOutcome::ReconnectFailed
                }
            };
        }

        let (velocity, preset) = self.take_desired();

        if let Some(token) = preset {
            return match self.link.goto_preset(&token).await {
                Ok(()) => {
                    info!(preset = %token, "Moved to preset");
                    // The preset move must not be overridden by a stale velocity
                    self.last_sent = Velocity::STOP;
                    self.record_dispatch();
                    TickOutcome::PresetSent
                }
                Err(e) => {
                    self.drop_link(e).await;
                    TickOutcome::DispatchFailed
                }
            };
        }

        if !needs_dispatch(&velocity, &self.last_sent, self.config.velocity_threshold) {
            self.stats.suppressed += 1;
            return TickOutcome::Suppressed;
        }

        let result = if velocity.is_stop() {
            self.link.stop().await
        } else {
            self.link.continuous_move(velocity).await
        };

        match result {
            Ok(()) => {
                debug!(pan = velocity.pan, tilt = velocity.tilt, "PTZ command sent");
                self.last_sent = velocity;
                self.record_dispatch();
                TickOutcome::Dispatched
            }
            Err(e) => {
                self.drop_link(e).await;
                TickOutcome::DispatchFailed
            }
        }
    }

    fn record_dispatch(&mut self) {
        self.stats.dispatched += 1;
        metrics::counter!("ptz_commands_dispatched_total").increment(1);
    }

    async fn drop_link(&mut self, error: PtzError) {
        warn!("PTZ command failed, dropping link: {}", error);
        self.stats.failures += 1;
        metrics::counter!("ptz_command_failures_total").increment(1);
        self.link.disconnect().await;
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Sends a final explicit stop before releasing the link.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> CommandLoopStats {
        info!(
            "Starting PTZ command loop (tick {}ms, threshold {})",
            self.config.tick_interval_ms, self.config.velocity_threshold
        );
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            if self.tick().await == TickOutcome::ReconnectFailed {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
                }
            }
        }

        self.release().await;
        self.stats
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<CommandLoopStats>
    where
        L: 'static,
    {
        tokio::spawn(self.run(shutdown))
    }

    async fn release(&mut self) {
        if self.link.is_connected() {
            match self.link.stop().await {
                Ok(()) => info!("Final PTZ stop sent"),
                Err(e) => warn!("Final PTZ stop failed: {}", e),
            }
        }
        self.link.disconnect().await;
        info!(
            dispatched = self.stats.dispatched,
            suppressed = self.stats.suppressed,
            failures = self.stats.failures,
            "PTZ command loop stopped"
        );
    }
}
