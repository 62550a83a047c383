use std::process::Stdio;

use image::RgbImage;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::info;

use super::VehicleError;
use crate::media::frame::Frame;

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub program: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl FeedSettings {
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Decodes the H.264 video stream with an external ffmpeg process that
/// writes raw `rgb24` frames to stdout.
pub struct FfmpegFeed {
    // Held so the decoder is killed when the feed is dropped.
    _child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    buf: Vec<u8>,
    filled: usize,
}

impl FfmpegFeed {
    pub fn spawn(settings: &FeedSettings) -> Result<Self, VehicleError> {
        let size = format!("{}x{}", settings.width, settings.height);
        let mut child = Command::new(&settings.program)
            .args([
                "-loglevel",
                "error",
                "-i",
                settings.url.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                size.as_str(),
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(VehicleError::DecoderUnavailable)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            VehicleError::DecoderUnavailable(std::io::Error::other("decoder stdout not captured"))
        })?;

        info!("Video decoder started for {} at {}", settings.url, size);
        Ok(Self {
            _child: child,
            stdout,
            width: settings.width,
            height: settings.height,
            buf: vec![0; settings.frame_len()],
            filled: 0,
        })
    }

    /// Progress is kept in `self`, so cancelling this future between reads
    /// keeps the frame boundary intact.
    pub async fn next_frame(&mut self) -> Result<Frame, VehicleError> {
        while self.filled < self.buf.len() {
            let n = self.stdout.read(&mut self.buf[self.filled..]).await?;
            if n == 0 {
                return Err(VehicleError::FeedClosed);
            }
            self.filled += n;
        }
        self.filled = 0;

        let image = RgbImage::from_raw(self.width, self.height, self.buf.clone())
            .ok_or_else(|| VehicleError::BadFrame("frame buffer size mismatch".to_string()))?;
        Ok(Frame::new(image))
    }
}
