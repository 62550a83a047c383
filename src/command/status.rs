use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::patrol::{StateMachine, VehicleState};
use crate::vehicle::{VehicleControl, VehicleError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub battery: Option<u8>,
    pub height: Option<i32>,
    pub state: VehicleState,
}

#[derive(Clone)]
pub struct StatusReporter {
    vehicle: Arc<dyn VehicleControl>,
    state: StateMachine,
}

impl StatusReporter {
    pub fn new(vehicle: Arc<dyn VehicleControl>, state: StateMachine) -> Self {
        Self { vehicle, state }
    }

    /// Never fails: a metric that cannot be read is reported as `None`.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let (battery, height) = tokio::join!(self.vehicle.battery(), self.vehicle.height());
        StatusSnapshot {
            battery: metric("battery", battery),
            height: metric("height", height),
            state: self.state.current(),
        }
    }
}

fn metric<T>(name: &str, reading: Result<T, VehicleError>) -> Option<T> {
    match reading {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(metric = name, "Metric unavailable: {}", e);
            None
        }
    }
}
