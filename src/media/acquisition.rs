use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::capture::PictureCapture;
use super::frame::FrameSlot;
use super::readiness::ReadinessGate;
use crate::vehicle::{VehicleControl, VehicleError};

/// Operator-local input for the video worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalControl {
    Capture,
    Quit,
}

impl LocalControl {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim() {
            "p" | "P" => Some(LocalControl::Capture),
            "q" | "Q" => Some(LocalControl::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video feed unrecoverable: {0}")]
    FeedUnrecoverable(#[source] VehicleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Quit,
}

/// Keeps [`FrameSlot`] fresh for the lifetime of the process and opens the
/// [`ReadinessGate`] on the first good frame.
pub struct VideoAcquisitionWorker {
    vehicle: Arc<dyn VehicleControl>,
    frames: FrameSlot,
    gate: ReadinessGate,
    capture: Arc<PictureCapture>,
    controls: mpsc::Receiver<LocalControl>,
    retry_delay: Duration,
}

impl VideoAcquisitionWorker {
    pub fn new(
        vehicle: Arc<dyn VehicleControl>,
        frames: FrameSlot,
        gate: ReadinessGate,
        capture: Arc<PictureCapture>,
        controls: mpsc::Receiver<LocalControl>,
    ) -> Self {
        Self {
            vehicle,
            frames,
            gate,
            capture,
            controls,
            retry_delay: Duration::from_millis(100),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub async fn run(mut self) -> Result<WorkerExit, VideoError> {
        info!("Video acquisition started");
        let mut controls_open = true;
        let mut failures: u64 = 0;

        loop {
            tokio::select! {
                biased;

                control = self.controls.recv(), if controls_open => match control {
                    Some(LocalControl::Capture) => self.capture_current().await,
                    Some(LocalControl::Quit) => {
                        info!("Quit requested, stopping video acquisition");
                        return Ok(WorkerExit::Quit);
                    }
                    None => {
                        debug!("Operator input closed, continuing without it");
                        controls_open = false;
                    }
                },

                frame = self.vehicle.read_frame() => match frame {
                    Ok(frame) => {
                        failures = 0;
                        self.frames.store(frame);
                        if self.gate.signal() {
                            info!("Event signal set: stream is live");
                        }
                    }
                    Err(e) if e.is_unrecoverable() => {
                        error!(operation = "read_frame", "Video feed lost: {}", e);
                        return Err(VideoError::FeedUnrecoverable(e));
                    }
                    Err(e) => {
                        failures += 1;
                        warn!(
                            operation = "read_frame",
                            consecutive_failures = failures,
                            "Frame acquisition failed: {}",
                            e
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                },
            }
        }
    }

    async fn capture_current(&self) {
        match self.frames.snapshot() {
            Some(frame) => {
                self.capture.capture(frame).await;
            }
            None => warn!("Capture requested before any frame arrived"),
        }
    }
}
