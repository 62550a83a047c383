//! Broker command protocol.
//!
//! Inbound bodies are bare keywords (`patrol`, `status`). Outbound replies
//! are the keyword `picture` or `status` followed by a space and the payload.

pub mod dispatcher;
pub mod status;

#[cfg(test)]
mod tests;

use std::str::FromStr;

use thiserror::Error;

pub use dispatcher::{CommandDispatcher, Dispatch, ReplyPublisher};
pub use status::{StatusReporter, StatusSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Patrol,
    Status,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0:?}")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(body: &str) -> Result<Self, Self::Err> {
        match body.trim() {
            "patrol" => Ok(Command::Patrol),
            "status" => Ok(Command::Status),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Picture(String),
    Status(StatusSnapshot),
}

impl Reply {
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        Ok(match self {
            Reply::Picture(url) => format!("picture {}", url),
            Reply::Status(snapshot) => format!("status {}", serde_json::to_string(snapshot)?),
        })
    }
}
