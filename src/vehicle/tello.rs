use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::feed::{FeedSettings, FfmpegFeed};
use super::{Direction, Rotation, VehicleControl, VehicleError};
use crate::config::VehicleConfig;
use crate::media::frame::Frame;

/// Tello SDK binding. Commands are plain text datagrams answered by `ok`,
/// `error ...` or a value; one command is in flight at a time.
pub struct TelloVehicle {
    socket: Mutex<UdpSocket>,
    response_timeout: Duration,
    feed_settings: FeedSettings,
    feed: Mutex<Option<FfmpegFeed>>,
}

impl TelloVehicle {
    pub async fn bind(config: &VehicleConfig) -> Result<Self, VehicleError> {
        let address: SocketAddr = config.address.parse().map_err(|e| {
            VehicleError::Link(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid vehicle address {}: {}", config.address, e),
            ))
        })?;

        let socket = UdpSocket::bind(("0.0.0.0", config.local_port)).await?;
        socket.connect(address).await?;
        info!("Tello link bound on port {} -> {}", config.local_port, address);

        Ok(Self {
            socket: Mutex::new(socket),
            response_timeout: Duration::from_secs(config.response_timeout_secs),
            feed_settings: FeedSettings {
                program: config.ffmpeg.clone(),
                url: config.video_url.clone(),
                width: config.frame_width,
                height: config.frame_height,
            },
            feed: Mutex::new(None),
        })
    }

    async fn send_command(&self, command: &str) -> Result<String, VehicleError> {
        let socket = self.socket.lock().await;
        let mut buf = [0u8; 1024];

        // Late replies from a previous timed-out command would otherwise be
        // read as the answer to this one.
        while let Ok(n) = socket.try_recv(&mut buf) {
            debug!(
                "Discarding stale reply: {}",
                String::from_utf8_lossy(&buf[..n]).trim()
            );
        }

        debug!("Sending command: {}", command);
        socket.send(command.as_bytes()).await?;

        let n = tokio::time::timeout(self.response_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| VehicleError::Timeout {
                command: command.to_string(),
                timeout: self.response_timeout,
            })??;

        let reply = String::from_utf8_lossy(&buf[..n]).trim().to_string();
        debug!("Reply to {}: {}", command, reply);
        Ok(reply)
    }

    async fn control(&self, command: &str) -> Result<(), VehicleError> {
        let reply = self.send_command(command).await?;
        check_ok(command, &reply)
    }
}

pub(crate) fn check_ok(command: &str, reply: &str) -> Result<(), VehicleError> {
    if reply.eq_ignore_ascii_case("ok") {
        Ok(())
    } else if reply.to_ascii_lowercase().starts_with("error") {
        Err(VehicleError::Rejected {
            command: command.to_string(),
            reply: reply.to_string(),
        })
    } else {
        Err(VehicleError::Malformed {
            command: command.to_string(),
            reply: reply.to_string(),
        })
    }
}

pub(crate) fn parse_battery(reply: &str) -> Result<u8, VehicleError> {
    reply
        .trim()
        .parse::<u8>()
        .map_err(|_| VehicleError::Malformed {
            command: "battery?".to_string(),
            reply: reply.to_string(),
        })
}

/// `height?` answers in decimetres, e.g. `"3dm"`.
pub(crate) fn parse_height(reply: &str) -> Result<i32, VehicleError> {
    let trimmed = reply.trim();
    let digits = trimmed.strip_suffix("dm").unwrap_or(trimmed);
    digits
        .trim()
        .parse::<i32>()
        .map(|dm| dm * 10)
        .map_err(|_| VehicleError::Malformed {
            command: "height?".to_string(),
            reply: reply.to_string(),
        })
}

#[async_trait]
impl VehicleControl for TelloVehicle {
    async fn connect(&self) -> Result<(), VehicleError> {
        self.control("command").await
    }

    async fn takeoff(&self) -> Result<(), VehicleError> {
        self.control("takeoff").await
    }

    async fn land(&self) -> Result<(), VehicleError> {
        self.control("land").await
    }

    async fn move_by(&self, direction: Direction, cm: u32) -> Result<(), VehicleError> {
        self.control(&format!("{} {}", direction, cm)).await
    }

    async fn rotate(&self, rotation: Rotation, degrees: u32) -> Result<(), VehicleError> {
        self.control(&format!("{} {}", rotation, degrees)).await
    }

    async fn stream_on(&self) -> Result<(), VehicleError> {
        self.control("streamon").await
    }

    async fn reboot(&self) -> Result<(), VehicleError> {
        // The vehicle drops the link while rebooting, so no reply is expected.
        let socket = self.socket.lock().await;
        socket.send(b"reboot").await?;
        Ok(())
    }

    async fn read_frame(&self) -> Result<Frame, VehicleError> {
        let mut feed = self.feed.lock().await;
        if feed.is_none() {
            *feed = Some(FfmpegFeed::spawn(&self.feed_settings)?);
        }
        let Some(decoder) = feed.as_mut() else {
            return Err(VehicleError::FeedClosed);
        };

        let frame = decoder.next_frame().await;
        if matches!(frame, Err(VehicleError::FeedClosed)) {
            *feed = None;
        }
        frame
    }

    async fn battery(&self) -> Result<u8, VehicleError> {
        let reply = self.send_command("battery?").await?;
        parse_battery(&reply)
    }

    async fn height(&self) -> Result<i32, VehicleError> {
        let reply = self.send_command("height?").await?;
        parse_height(&reply)
    }
}
