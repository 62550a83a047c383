use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VehicleState {
    Idle,
    Patrol,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatrolError {
    #[error("a patrol is already active")]
    AlreadyActive,
}

/// Idle/Patrol state shared by the dispatcher, the flight routine and the
/// status reporter. The only transitions are Idle -> Patrol through
/// [`StateMachine::request_patrol`] and Patrol -> Idle through
/// [`StateMachine::complete`].
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    patrolling: Arc<AtomicBool>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> VehicleState {
        if self.patrolling.load(Ordering::SeqCst) {
            VehicleState::Patrol
        } else {
            VehicleState::Idle
        }
    }

    /// Atomically moves Idle -> Patrol. The returned guard moves the machine
    /// back to Idle when dropped, whatever path the patrol takes.
    pub fn request_patrol(&self) -> Result<PatrolGuard, PatrolError> {
        self.patrolling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| PatrolError::AlreadyActive)?;
        info!("State: idle -> patrol");
        Ok(PatrolGuard {
            machine: self.clone(),
        })
    }

    /// Patrol -> Idle. Idempotent.
    pub fn complete(&self) {
        if self.patrolling.swap(false, Ordering::SeqCst) {
            info!("State: patrol -> idle");
        }
    }
}

/// Proof that the caller owns the active patrol.
#[derive(Debug)]
#[must_use = "dropping the guard immediately ends the patrol"]
pub struct PatrolGuard {
    machine: StateMachine,
}

impl Drop for PatrolGuard {
    fn drop(&mut self) {
        self.machine.complete();
    }
}
