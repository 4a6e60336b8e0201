//! Asynchronous external signals

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// A signal delivered by the messaging collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalSignal {
    /// Audio event detector switched on or off
    Audio { active: bool },
    /// Number of people currently seen by the external person detector
    PersonCount(u32),
}

impl fmt::Display for ExternalSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalSignal::Audio { active: true } => write!(f, "audio ON"),
            ExternalSignal::Audio { active: false } => write!(f, "audio OFF"),
            ExternalSignal::PersonCount(n) => write!(f, "person count {}", n),
        }
    }
}

/// A signal stamped with the time its message arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    pub signal: ExternalSignal,
    pub received_at: Instant,
}

impl SignalEvent {
    pub fn new(signal: ExternalSignal, received_at: Instant) -> Self {
        Self {
            signal,
            received_at,
        }
    }
}
