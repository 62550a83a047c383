use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::command::{CommandDispatcher, ReplyPublisher, StatusReporter};
use crate::config::PatrolConfig;
use crate::media::{FrameSlot, LocalControl, PictureCapture, ReadinessGate, VideoAcquisitionWorker};
use crate::patrol::{FlightRoutine, StateMachine};
use crate::vehicle::VehicleControl;
use crate::web::PictureLocator;

/// Process-wide orchestration state, created once at startup and shared by
/// explicit handles instead of globals.
#[derive(Clone)]
pub struct PatrolContext {
    pub vehicle: Arc<dyn VehicleControl>,
    pub state: StateMachine,
    pub gate: ReadinessGate,
    pub frames: FrameSlot,
    pub capture: Arc<PictureCapture>,
}

impl PatrolContext {
    pub fn new(vehicle: Arc<dyn VehicleControl>, capture: PictureCapture) -> Self {
        Self {
            vehicle,
            state: StateMachine::new(),
            gate: ReadinessGate::new(),
            frames: FrameSlot::new(),
            capture: Arc::new(capture),
        }
    }

    pub fn from_config(vehicle: Arc<dyn VehicleControl>, config: &PatrolConfig) -> Self {
        let capture = PictureCapture::new(
            &config.pictures.dir,
            Duration::from_millis(config.pictures.pause_ms),
        );
        Self::new(vehicle, capture)
    }

    pub fn video_worker(&self, controls: mpsc::Receiver<LocalControl>) -> VideoAcquisitionWorker {
        VideoAcquisitionWorker::new(
            self.vehicle.clone(),
            self.frames.clone(),
            self.gate.clone(),
            self.capture.clone(),
            controls,
        )
    }

    pub fn status_reporter(&self) -> StatusReporter {
        StatusReporter::new(self.vehicle.clone(), self.state.clone())
    }

    pub fn dispatcher(
        &self,
        config: &PatrolConfig,
        publisher: Arc<dyn ReplyPublisher>,
    ) -> CommandDispatcher {
        let routine = FlightRoutine::new(
            self.vehicle.clone(),
            self.frames.clone(),
            self.gate.clone(),
            self.capture.clone(),
            &config.flight,
        );
        CommandDispatcher::new(
            self.state.clone(),
            Arc::new(routine),
            self.status_reporter(),
            publisher,
            PictureLocator::new(&config.web, &config.pictures),
        )
    }
}
