pub mod routine;
pub mod state;


pub use routine::{patrol_sequence, FlightError, FlightReport, FlightRoutine, Maneuver};
pub use state::{PatrolError, PatrolGuard, StateMachine, VehicleState};
