//! Hardware link abstraction
//!
//! A `PtzLink` is the transport to the actuator (ONVIF, serial, ...).
//! It is owned exclusively by the command loop.

use crate::command::Velocity;
use crate::error::PtzError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Transport to a pan/tilt device
#[async_trait]
pub trait PtzLink: Send {
    /// Establish (or re-establish) the link
    async fn connect(&mut self) -> Result<(), PtzError>;

    /// Whether the link is currently usable
    fn is_connected(&self) -> bool;

    /// Start or update a continuous move
    async fn continuous_move(&mut self, velocity: Velocity) -> Result<(), PtzError>;

    /// Halt all pan/tilt motion
    async fn stop(&mut self) -> Result<(), PtzError>;

    /// Move to a stored preset position
    async fn goto_preset(&mut self, token: &str) -> Result<(), PtzError>;

    /// Drop the link; the next `connect` starts from scratch
    async fn disconnect(&mut self);
}

/// Operation observed by a [`MockPtzLink`]
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCall {
    Connect,
    Move(Velocity),
    Stop,
    GotoPreset(String),
    Disconnect,
}

impl LinkCall {
    fn is_dispatch(&self) -> bool {
        matches!(self, LinkCall::Move(_) | LinkCall::Stop | LinkCall::GotoPreset(_))
    }
}

#[derive(Debug, Default)]
struct MockShared {
    calls: Mutex<Vec<LinkCall>>,
    failing_dispatches: AtomicUsize,
    failing_connects: AtomicUsize,
}

impl MockShared {
    fn record(&self, call: LinkCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory link for tests and dry runs (no hardware required).
///
/// Only successful operations are recorded; failures can be injected
/// through the paired [`MockLinkProbe`].
#[derive(Debug)]
pub struct MockPtzLink {
    connected: bool,
    shared: Arc<MockShared>,
}

/// Test-side view of a [`MockPtzLink`]
#[derive(Debug, Clone)]
pub struct MockLinkProbe {
    shared: Arc<MockShared>,
}

impl MockPtzLink {
    /// Create a disconnected mock link and its probe
    pub fn new() -> (Self, MockLinkProbe) {
        info!("Creating mock PTZ link");
        let shared = Arc::new(MockShared::default());
        (
            Self {
                connected: false,
                shared: Arc::clone(&shared),
            },
            MockLinkProbe { shared },
        )
    }

    /// Create an already connected mock link
    pub fn connected() -> (Self, MockLinkProbe) {
        let (mut link, probe) = Self::new();
        link.connected = true;
        (link, probe)
    }

    fn dispatch(&mut self, call: LinkCall, command: &'static str) -> Result<(), PtzError> {
        if !self.connected {
            return Err(PtzError::NotConnected);
        }
        if MockShared::take_failure(&self.shared.failing_dispatches) {
            return Err(PtzError::Command {
                command,
                reason: "injected failure".to_string(),
            });
        }
        debug!("Mock PTZ {:?}", call);
        self.shared.record(call);
        Ok(())
    }
}

#[async_trait]
impl PtzLink for MockPtzLink {
    async fn connect(&mut self) -> Result<(), PtzError> {
        if MockShared::take_failure(&self.shared.failing_connects) {
            return Err(PtzError::Connection("injected failure".to_string()));
        }
        self.connected = true;
        self.shared.record(LinkCall::Connect);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn continuous_move(&mut self, velocity: Velocity) -> Result<(), PtzError> {
        self.dispatch(LinkCall::Move(velocity), "ContinuousMove")
    }

    async fn stop(&mut self) -> Result<(), PtzError> {
        self.dispatch(LinkCall::Stop, "Stop")
    }

    async fn goto_preset(&mut self, token: &str) -> Result<(), PtzError> {
        self.dispatch(LinkCall::GotoPreset(token.to_string()), "GotoPreset")
    }

    async fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.shared.record(LinkCall::Disconnect);
        }
    }
}

impl MockLinkProbe {
    /// All recorded operations, oldest first
    pub fn calls(&self) -> Vec<LinkCall> {
        self.shared.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Recorded move/stop/preset commands only
    pub fn dispatches(&self) -> Vec<LinkCall> {
        self.calls().into_iter().filter(LinkCall::is_dispatch).collect()
    }

    /// Make the next `n` dispatches fail
    pub fn fail_next_dispatches(&self, n: usize) {
        self.shared.failing_dispatches.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` connection attempts fail
    pub fn fail_next_connects(&self, n: usize) {
        self.shared.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.shared.calls.lock() {
            calls.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_requires_connection() {
        let (mut link, probe) = MockPtzLink::new();
        assert!(!link.is_connected());
        assert!(matches!(link.stop().await, Err(PtzError::NotConnected)));

        link.connect().await.unwrap();
        link.stop().await.unwrap();
        assert_eq!(probe.calls(), vec![LinkCall::Connect, LinkCall::Stop]);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let (mut link, probe) = MockPtzLink::connected();
        probe.fail_next_dispatches(1);

        assert!(link.continuous_move(Velocity::new(0.5, 0.0)).await.is_err());
        assert!(link.continuous_move(Velocity::new(0.5, 0.0)).await.is_ok());
        assert_eq!(probe.dispatches(), vec![LinkCall::Move(Velocity::new(0.5, 0.0))]);
    }

    #[tokio::test]
    async fn test_connect_failures() {
        let (mut link, probe) = MockPtzLink::new();
        probe.fail_next_connects(2);

        assert!(link.connect().await.is_err());
        assert!(link.connect().await.is_err());
        assert!(link.connect().await.is_ok());
        assert!(link.is_connected());
    }
}
