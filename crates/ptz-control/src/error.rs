//! PTZ Error Types

use thiserror::Error;

/// Errors that can occur while talking to the pan/tilt hardware
#[derive(Debug, Error)]
pub enum PtzError {
    /// Could not establish the link
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The link is not established
    #[error("PTZ link not connected")]
    NotConnected,

    /// The device has no usable media profile
    #[error("No PTZ profile available")]
    NoProfile,

    /// A command was sent but the device rejected it or the transport failed
    #[error("Command {command} failed: {reason}")]
    Command { command: &'static str, reason: String },

    /// Timeout waiting for the device
    #[error("Timeout waiting for PTZ response after {0}ms")]
    Timeout(u64),
}

impl From<std::io::Error> for PtzError {
    fn from(err: std::io::Error) -> Self {
        PtzError::Connection(err.to_string())
    }
}
