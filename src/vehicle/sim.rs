use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tracing::debug;

use super::{Direction, Rotation, VehicleControl, VehicleError};
use crate::media::frame::Frame;

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

/// In-process vehicle. Records every flight command it receives and can be
/// told to fail specific calls.
#[derive(Debug)]
pub struct SimulatedVehicle {
    log: Mutex<Vec<String>>,
    flight_commands: AtomicUsize,
    fail_at: Mutex<Option<usize>>,
    connect_fault: AtomicBool,
    battery_fault: AtomicBool,
    height_fault: AtomicBool,
    feed_closed: AtomicBool,
    frames_held: AtomicBool,
    frames: AtomicU64,
    frame_interval: Duration,
    command_delay: Duration,
    battery: u8,
    height_cm: i32,
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVehicle {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            flight_commands: AtomicUsize::new(0),
            fail_at: Mutex::new(None),
            connect_fault: AtomicBool::new(false),
            battery_fault: AtomicBool::new(false),
            height_fault: AtomicBool::new(false),
            feed_closed: AtomicBool::new(false),
            frames_held: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            frame_interval: Duration::from_millis(33),
            command_delay: Duration::ZERO,
            battery: 87,
            height_cm: 0,
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Each flight command takes this long to complete.
    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = delay;
        self
    }

    pub fn with_telemetry(mut self, battery: u8, height_cm: i32) -> Self {
        self.battery = battery;
        self.height_cm = height_cm;
        self
    }

    /// Fails the flight command with this zero-based index (take-off, moves,
    /// rotations and land are counted; reboot and stream control are not).
    pub fn fail_command_at(&self, index: usize) {
        *self.fail_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(index);
    }

    /// While set, `connect` gets no answer, as from a vehicle still booting.
    pub fn fail_connect(&self, fail: bool) {
        self.connect_fault.store(fail, Ordering::SeqCst);
    }

    pub fn fail_battery(&self, fail: bool) {
        self.battery_fault.store(fail, Ordering::SeqCst);
    }

    pub fn fail_height(&self, fail: bool) {
        self.height_fault.store(fail, Ordering::SeqCst);
    }

    /// Makes the next frame read report a permanently closed feed.
    pub fn close_feed(&self) {
        self.feed_closed.store(true, Ordering::SeqCst);
    }

    /// While held, frame reads fail with a transient error.
    pub fn hold_frames(&self, hold: bool) {
        self.frames_held.store(hold, Ordering::SeqCst);
    }

    pub fn frames_served(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Every command received so far, in SDK text form.
    pub fn commands(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, command: String) {
        debug!("Simulated vehicle received: {}", command);
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }

    async fn flight_command(&self, command: String) -> Result<(), VehicleError> {
        let index = self.flight_commands.fetch_add(1, Ordering::SeqCst);
        self.record(command.clone());
        if !self.command_delay.is_zero() {
            tokio::time::sleep(self.command_delay).await;
        }

        let fail_at = *self.fail_at.lock().unwrap_or_else(PoisonError::into_inner);
        if fail_at == Some(index) {
            return Err(VehicleError::Rejected {
                command,
                reply: "error Motor stop".to_string(),
            });
        }
        Ok(())
    }

    fn render_frame(&self, sequence: u64) -> RgbImage {
        let shade = (sequence % 256) as u8;
        RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            Rgb([shade, (x * 4) as u8, (y * 5) as u8])
        })
    }
}

#[async_trait]
impl VehicleControl for SimulatedVehicle {
    async fn connect(&self) -> Result<(), VehicleError> {
        self.record("command".to_string());
        if self.connect_fault.load(Ordering::SeqCst) {
            return Err(VehicleError::Timeout {
                command: "command".to_string(),
                timeout: Duration::from_secs(1),
            });
        }
        Ok(())
    }

    async fn takeoff(&self) -> Result<(), VehicleError> {
        self.flight_command("takeoff".to_string()).await
    }

    async fn land(&self) -> Result<(), VehicleError> {
        self.flight_command("land".to_string()).await
    }

    async fn move_by(&self, direction: Direction, cm: u32) -> Result<(), VehicleError> {
        self.flight_command(format!("{} {}", direction, cm)).await
    }

    async fn rotate(&self, rotation: Rotation, degrees: u32) -> Result<(), VehicleError> {
        self.flight_command(format!("{} {}", rotation, degrees)).await
    }

    async fn stream_on(&self) -> Result<(), VehicleError> {
        self.record("streamon".to_string());
        Ok(())
    }

    async fn reboot(&self) -> Result<(), VehicleError> {
        self.record("reboot".to_string());
        Ok(())
    }

    async fn read_frame(&self) -> Result<Frame, VehicleError> {
        tokio::time::sleep(self.frame_interval).await;
        if self.feed_closed.load(Ordering::SeqCst) {
            return Err(VehicleError::FeedClosed);
        }
        if self.frames_held.load(Ordering::SeqCst) {
            return Err(VehicleError::BadFrame("no frame decoded yet".to_string()));
        }
        let sequence = self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(Frame::new(self.render_frame(sequence)))
    }

    async fn battery(&self) -> Result<u8, VehicleError> {
        if self.battery_fault.load(Ordering::SeqCst) {
            return Err(VehicleError::Timeout {
                command: "battery?".to_string(),
                timeout: Duration::from_secs(1),
            });
        }
        Ok(self.battery)
    }

    async fn height(&self) -> Result<i32, VehicleError> {
        if self.height_fault.load(Ordering::SeqCst) {
            return Err(VehicleError::Timeout {
                command: "height?".to_string(),
                timeout: Duration::from_secs(1),
            });
        }
        Ok(self.height_cm)
    }
}
