use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use super::state::PatrolGuard;
use crate::config::FlightConfig;
use crate::media::{FrameSlot, PictureCapture, ReadinessGate, SavedImage};
use crate::vehicle::{Direction, Rotation, VehicleControl, VehicleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maneuver {
    Takeoff,
    Move(Direction, u32),
    Rotate(Rotation, u32),
    Capture,
    Land,
}

impl fmt::Display for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Maneuver::Takeoff => write!(f, "takeoff"),
            Maneuver::Move(direction, cm) => write!(f, "{} {}", direction, cm),
            Maneuver::Rotate(rotation, degrees) => write!(f, "{} {}", rotation, degrees),
            Maneuver::Capture => write!(f, "capture"),
            Maneuver::Land => write!(f, "land"),
        }
    }
}

/// take-off, forward, up, picture, back, down, turn, picture, turn back, land.
pub fn patrol_sequence(distance_cm: u32, rotation_deg: u32) -> Vec<Maneuver> {
    vec![
        Maneuver::Takeoff,
        Maneuver::Move(Direction::Forward, distance_cm),
        Maneuver::Move(Direction::Up, distance_cm),
        Maneuver::Capture,
        Maneuver::Move(Direction::Back, distance_cm),
        Maneuver::Move(Direction::Down, distance_cm),
        Maneuver::Rotate(Rotation::Clockwise, rotation_deg),
        Maneuver::Capture,
        Maneuver::Rotate(Rotation::CounterClockwise, rotation_deg),
        Maneuver::Land,
    ]
}

#[derive(Debug, Error)]
pub enum FlightError {
    #[error("video feed not live after {0:?}")]
    FeedNeverReady(Duration),
    #[error("vehicle did not come back after reboot: {0}")]
    Reconnect(#[source] VehicleError),
    #[error("flight aborted at `{step}` (landed: {landed}): {source}")]
    Aborted {
        step: Maneuver,
        #[source]
        source: VehicleError,
        landed: bool,
    },
}

#[derive(Debug, Default, Clone)]
pub struct FlightReport {
    pub completed: Vec<Maneuver>,
    pub pictures: Vec<SavedImage>,
}

impl FlightReport {
    pub fn last_picture(&self) -> Option<&SavedImage> {
        self.pictures.last()
    }
}

/// Flies the fixed patrol against the vehicle once the video feed is live.
pub struct FlightRoutine {
    vehicle: Arc<dyn VehicleControl>,
    frames: FrameSlot,
    gate: ReadinessGate,
    capture: Arc<PictureCapture>,
    sequence: Vec<Maneuver>,
    readiness_timeout: Option<Duration>,
    reboot_after: bool,
    // Set once a reboot has been requested; the next patrol re-enters
    // command mode and restarts the stream before taking off.
    rebooted: AtomicBool,
}

impl FlightRoutine {
    pub fn new(
        vehicle: Arc<dyn VehicleControl>,
        frames: FrameSlot,
        gate: ReadinessGate,
        capture: Arc<PictureCapture>,
        config: &FlightConfig,
    ) -> Self {
        Self {
            vehicle,
            frames,
            gate,
            capture,
            sequence: patrol_sequence(config.distance_cm, config.rotation_deg),
            readiness_timeout: config.readiness_timeout(),
            reboot_after: config.reboot_after_patrol,
            rebooted: AtomicBool::new(false),
        }
    }

    pub fn sequence(&self) -> &[Maneuver] {
        &self.sequence
    }

    /// Runs one patrol. The guard is held until the routine, including the
    /// post-flight reboot request, is over and is released on every path.
    pub async fn run(&self, guard: PatrolGuard) -> Result<FlightReport, FlightError> {
        let _guard = guard;

        info!("Waiting for video stream readiness");
        match self.readiness_timeout {
            Some(limit) => self
                .gate
                .wait_timeout(limit)
                .await
                .map_err(|_| FlightError::FeedNeverReady(limit))?,
            None => self.gate.wait().await,
        }
        info!("Video stream ready, starting patrol");

        if self.rebooted.load(Ordering::SeqCst) {
            self.reconnect().await?;
        }

        let outcome = self.fly().await;
        match &outcome {
            Ok(report) => info!(
                "Flight routine ended with {} picture(s)",
                report.pictures.len()
            ),
            Err(e) => error!(operation = "flight_routine", "{}", e),
        }

        if self.reboot_after {
            info!("Rebooting vehicle");
            if let Err(e) = self.vehicle.reboot().await {
                warn!(operation = "reboot", "Vehicle reboot failed: {}", e);
            }
            self.rebooted.store(true, Ordering::SeqCst);
        }

        outcome
    }

    async fn reconnect(&self) -> Result<(), FlightError> {
        info!("Re-entering command mode after reboot");
        let result = match self.vehicle.connect().await {
            Ok(()) => self.vehicle.stream_on().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(operation = "reconnect", "Vehicle not ready after reboot: {}", e);
            return Err(FlightError::Reconnect(e));
        }
        self.rebooted.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn fly(&self) -> Result<FlightReport, FlightError> {
        let mut report = FlightReport::default();

        for &step in &self.sequence {
            info!("{}", step);
            if let Err(source) = self.execute(step, &mut report).await {
                error!(step = %step, "Maneuver failed: {}", source);
                let landed = match step {
                    Maneuver::Land => false,
                    _ => self.emergency_land().await,
                };
                return Err(FlightError::Aborted {
                    step,
                    source,
                    landed,
                });
            }
            report.completed.push(step);
        }

        Ok(report)
    }

    async fn execute(
        &self,
        step: Maneuver,
        report: &mut FlightReport,
    ) -> Result<(), VehicleError> {
        match step {
            Maneuver::Takeoff => self.vehicle.takeoff().await,
            Maneuver::Move(direction, cm) => self.vehicle.move_by(direction, cm).await,
            Maneuver::Rotate(rotation, degrees) => self.vehicle.rotate(rotation, degrees).await,
            Maneuver::Land => self.vehicle.land().await,
            Maneuver::Capture => {
                match self.frames.snapshot() {
                    Some(frame) => {
                        if let Some(saved) = self.capture.capture(frame).await {
                            report.pictures.push(saved);
                        }
                    }
                    None => warn!("No frame available for picture"),
                }
                Ok(())
            }
        }
    }

    async fn emergency_land(&self) -> bool {
        warn!("Attempting to land after failed maneuver");
        match self.vehicle.land().await {
            Ok(()) => true,
            Err(e) => {
                error!(operation = "land", "Emergency land failed: {}", e);
                false
            }
        }
    }
}
