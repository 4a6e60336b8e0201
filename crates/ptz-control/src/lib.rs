//! PTZ Hardware Control
//!
//! This crate owns everything that talks to the pan/tilt actuator:
//! the command types, the hardware link abstraction, and the command loop
//! that drains the latest desired velocity at a fixed tick.

mod command;
mod command_loop;
mod error;
mod link;

pub use command::{PtzRequest, Velocity};
pub use command_loop::{CommandLoopConfig, CommandLoopStats, PtzCommandLoop, PtzHandle, TickOutcome};
pub use error::PtzError;
pub use link::{LinkCall, MockLinkProbe, MockPtzLink, PtzLink};
