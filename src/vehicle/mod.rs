//! Vehicle control interface.
//!
//! Everything the orchestrator asks of the aircraft goes through
//! [`VehicleControl`]. [`TelloVehicle`] talks to real hardware over the SDK's
//! UDP text protocol; [`SimulatedVehicle`] is an in-process stand-in used for
//! dry runs and tests.

pub mod feed;
pub mod sim;
pub mod tello;

#[cfg(test)]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use strum_macros::Display;
use thiserror::Error;

use crate::media::frame::Frame;

pub use sim::SimulatedVehicle;
pub use tello::TelloVehicle;

#[derive(Debug, Error)]
pub enum VehicleError {
    #[error("link error: {0}")]
    Link(#[from] std::io::Error),
    #[error("no reply to `{command}` within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` rejected by vehicle: {reply}")]
    Rejected { command: String, reply: String },
    #[error("unexpected reply to `{command}`: {reply}")]
    Malformed { command: String, reply: String },
    #[error("video decoder unavailable: {0}")]
    DecoderUnavailable(std::io::Error),
    #[error("video feed closed")]
    FeedClosed,
    #[error("bad video frame: {0}")]
    BadFrame(String),
}

impl VehicleError {
    /// Errors after which no further frames will ever arrive.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            VehicleError::FeedClosed | VehicleError::DecoderUnavailable(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Forward,
    Back,
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Rotation {
    #[strum(serialize = "cw")]
    Clockwise,
    #[strum(serialize = "ccw")]
    CounterClockwise,
}

#[async_trait]
pub trait VehicleControl: Send + Sync {
    /// Puts the vehicle into command mode.
    async fn connect(&self) -> Result<(), VehicleError>;

    async fn takeoff(&self) -> Result<(), VehicleError>;

    async fn land(&self) -> Result<(), VehicleError>;

    async fn move_by(&self, direction: Direction, cm: u32) -> Result<(), VehicleError>;

    async fn rotate(&self, rotation: Rotation, degrees: u32) -> Result<(), VehicleError>;

    async fn stream_on(&self) -> Result<(), VehicleError>;

    async fn reboot(&self) -> Result<(), VehicleError>;

    /// Next decoded frame from the video feed. Must be cancel safe: dropping
    /// the future part way through may not lose frame alignment.
    async fn read_frame(&self) -> Result<Frame, VehicleError>;

    /// Battery level in percent.
    async fn battery(&self) -> Result<u8, VehicleError>;

    /// Height above take-off point in centimetres.
    async fn height(&self) -> Result<i32, VehicleError>;
}
