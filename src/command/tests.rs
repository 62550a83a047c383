use super::*;
use crate::config::FlightConfig;
use crate::media::{Frame, FrameSlot, PictureCapture, ReadinessGate};
use crate::patrol::{FlightRoutine, StateMachine, VehicleState};
use crate::test_support::init_tracing;
use crate::vehicle::SimulatedVehicle;
use crate::web::PictureLocator;
use anyhow::{bail, Result};
use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const BASE_URL: &str = "http://10.0.0.5:8000";

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl RecordingPublisher {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyPublisher for RecordingPublisher {
    async fn publish(&self, payload: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("broker connection lost");
        }
        self.sent.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

struct DispatchHarness {
    vehicle: Arc<SimulatedVehicle>,
    state: StateMachine,
    publisher: Arc<RecordingPublisher>,
    dispatcher: CommandDispatcher,
    pictures: PathBuf,
    _dir: tempfile::TempDir,
}

impl DispatchHarness {
    async fn finish(&self, outcome: Dispatch) -> Result<()> {
        if !matches!(outcome, Dispatch::PatrolStarted) {
            bail!("expected a started patrol, got {:?}", outcome);
        }
        tokio::time::timeout(Duration::from_secs(5), self.dispatcher.finish_patrols()).await?;
        Ok(())
    }

    fn saved_pictures(&self) -> Result<Vec<String>> {
        let mut names = std::fs::read_dir(&self.pictures)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }
}

fn dispatch_harness(vehicle: SimulatedVehicle) -> Result<DispatchHarness> {
    harness_with(vehicle, true)
}

/// Open gate and, unless `with_frame` is false, one frame in the slot.
fn harness_with(vehicle: SimulatedVehicle, with_frame: bool) -> Result<DispatchHarness> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let pictures = dir.path().join("pictures");
    let vehicle = Arc::new(vehicle);
    let state = StateMachine::new();
    let frames = FrameSlot::new();
    let gate = ReadinessGate::new();
    if with_frame {
        frames.store(Frame::new(RgbImage::new(16, 12)));
    }
    gate.signal();

    let capture = Arc::new(PictureCapture::new(&pictures, Duration::ZERO));
    let routine = FlightRoutine::new(
        vehicle.clone(),
        frames,
        gate,
        capture,
        &FlightConfig::default(),
    );
    let publisher = Arc::new(RecordingPublisher::default());
    let dispatcher = CommandDispatcher::new(
        state.clone(),
        Arc::new(routine),
        StatusReporter::new(vehicle.clone(), state.clone()),
        publisher.clone(),
        PictureLocator::with_base_url(&pictures, BASE_URL),
    );

    Ok(DispatchHarness {
        vehicle,
        state,
        publisher,
        dispatcher,
        pictures,
        _dir: dir,
    })
}

#[test]
fn test_command_parsing() {
    assert_eq!("patrol".parse::<Command>(), Ok(Command::Patrol));
    assert_eq!(" status\n".parse::<Command>(), Ok(Command::Status));
    assert_eq!(
        "land".parse::<Command>(),
        Err(CommandError::Unknown("land".to_string()))
    );
    assert!("PATROL".parse::<Command>().is_err());
    assert!("".parse::<Command>().is_err());
}

#[test]
fn test_reply_payloads() -> Result<()> {
    let picture = Reply::Picture(format!("{}/1.png", BASE_URL));
    assert_eq!(picture.to_payload()?, "picture http://10.0.0.5:8000/1.png");

    let status = Reply::Status(StatusSnapshot {
        battery: Some(55),
        height: None,
        state: VehicleState::Patrol,
    });
    assert_eq!(
        status.to_payload()?,
        r#"status {"battery":55,"height":null,"state":"patrol"}"#
    );
    Ok(())
}

#[tokio::test]
async fn test_status_while_idle() -> Result<()> {
    let harness = dispatch_harness(SimulatedVehicle::new())?;

    let outcome = harness.dispatcher.dispatch("status").await;
    assert!(matches!(outcome, Dispatch::StatusPublished));
    assert_eq!(
        harness.publisher.sent(),
        vec![r#"status {"battery":87,"height":0,"state":"idle"}"#.to_string()]
    );
    // Status never moves the vehicle.
    assert!(harness.vehicle.commands().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_status_reports_unreadable_metric_as_null() -> Result<()> {
    let harness = dispatch_harness(SimulatedVehicle::new().with_telemetry(42, 130))?;
    harness.vehicle.fail_height(true);

    harness.dispatcher.dispatch("status").await;
    harness.vehicle.fail_height(false);
    harness.vehicle.fail_battery(true);
    harness.dispatcher.dispatch("status").await;

    assert_eq!(
        harness.publisher.sent(),
        vec![
            r#"status {"battery":42,"height":null,"state":"idle"}"#.to_string(),
            r#"status {"battery":null,"height":130,"state":"idle"}"#.to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_status_publish_failure_is_reported() -> Result<()> {
    let harness = dispatch_harness(SimulatedVehicle::new())?;
    harness.publisher.offline.store(true, Ordering::SeqCst);

    let outcome = harness.dispatcher.dispatch("status").await;
    assert!(matches!(outcome, Dispatch::StatusUndelivered));
    assert!(harness.publisher.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_patrol_replies_with_last_picture_url() -> Result<()> {
    let harness = dispatch_harness(SimulatedVehicle::new())?;

    let outcome = harness.dispatcher.dispatch("patrol").await;
    harness.finish(outcome).await?;

    assert_eq!(
        harness.vehicle.commands(),
        vec![
            "takeoff",
            "forward 20",
            "up 20",
            "back 20",
            "down 20",
            "cw 180",
            "ccw 180",
            "land",
            "reboot",
        ]
    );
    assert_eq!(harness.state.current(), VehicleState::Idle);

    let saved = harness.saved_pictures()?;
    assert_eq!(saved.len(), 2);
    let last = saved.last().map(String::as_str).unwrap_or_default();
    assert_eq!(
        harness.publisher.sent(),
        vec![format!("picture {}/{}", BASE_URL, last)]
    );
    Ok(())
}

#[tokio::test]
async fn test_patrol_without_frames_replies_with_newest_file() -> Result<()> {
    let harness = harness_with(SimulatedVehicle::new(), false)?;
    std::fs::create_dir_all(&harness.pictures)?;
    std::fs::write(harness.pictures.join("1700000000.000001.png"), b"earlier")?;

    let outcome = harness.dispatcher.dispatch("patrol").await;
    harness.finish(outcome).await?;

    assert_eq!(harness.saved_pictures()?, vec!["1700000000.000001.png"]);
    assert_eq!(
        harness.publisher.sent(),
        vec![format!("picture {}/1700000000.000001.png", BASE_URL)]
    );
    Ok(())
}

#[tokio::test]
async fn test_patrol_without_any_picture_sends_no_reply() -> Result<()> {
    let harness = harness_with(SimulatedVehicle::new(), false)?;
    std::fs::create_dir_all(&harness.pictures)?;

    let outcome = harness.dispatcher.dispatch("patrol").await;
    harness.finish(outcome).await?;

    assert_eq!(harness.vehicle.commands().last().map(String::as_str), Some("reboot"));
    assert!(harness.saved_pictures()?.is_empty());
    assert!(harness.publisher.sent().is_empty());
    assert_eq!(harness.state.current(), VehicleState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_patrol_rejected_while_patrolling() -> Result<()> {
    let harness = dispatch_harness(
        SimulatedVehicle::new().with_command_delay(Duration::from_millis(30)),
    )?;

    let first = harness.dispatcher.dispatch("patrol").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(harness.state.current(), VehicleState::Patrol);

    let second = harness.dispatcher.dispatch("patrol").await;
    assert!(matches!(second, Dispatch::PatrolRejected));

    // Status is still answered during a patrol and reflects it.
    harness.dispatcher.dispatch("status").await;
    assert_eq!(
        harness.publisher.sent(),
        vec![r#"status {"battery":87,"height":0,"state":"patrol"}"#.to_string()]
    );

    harness.finish(first).await?;
    let takeoffs = harness
        .vehicle
        .commands()
        .iter()
        .filter(|c| *c == "takeoff")
        .count();
    assert_eq!(takeoffs, 1);

    let sent = harness.publisher.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].starts_with("picture "));
    Ok(())
}

#[tokio::test]
async fn test_failed_patrol_sends_no_reply() -> Result<()> {
    let harness = dispatch_harness(SimulatedVehicle::new())?;
    // Fail "up 20".
    harness.vehicle.fail_command_at(2);

    let outcome = harness.dispatcher.dispatch("patrol").await;
    harness.finish(outcome).await?;

    assert_eq!(
        harness.vehicle.commands(),
        vec!["takeoff", "forward 20", "up 20", "land", "reboot"]
    );
    assert!(harness.publisher.sent().is_empty());
    assert_eq!(harness.state.current(), VehicleState::Idle);

    // The next patrol is accepted again.
    harness.vehicle.fail_command_at(usize::MAX);
    let outcome = harness.dispatcher.dispatch("patrol").await;
    harness.finish(outcome).await?;
    assert_eq!(harness.publisher.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unknown_command_is_ignored() -> Result<()> {
    let harness = dispatch_harness(SimulatedVehicle::new())?;

    let outcome = harness.dispatcher.dispatch("flip").await;
    assert!(matches!(
        outcome,
        Dispatch::Ignored(CommandError::Unknown(ref word)) if word == "flip"
    ));
    assert!(harness.publisher.sent().is_empty());
    assert!(harness.vehicle.commands().is_empty());
    assert_eq!(harness.state.current(), VehicleState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_run_handles_messages_until_inbound_closes() -> Result<()> {
    let harness = dispatch_harness(SimulatedVehicle::new())?;
    let (tx, rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tx.send("status".to_string()).await?;
    tx.send("hello".to_string()).await?;
    tx.send("status".to_string()).await?;
    drop(tx);

    tokio::time::timeout(
        Duration::from_secs(2),
        harness.dispatcher.run(rx, shutdown_rx),
    )
    .await?;
    assert_eq!(harness.publisher.sent().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_run_stops_on_shutdown() -> Result<()> {
    let harness = dispatch_harness(SimulatedVehicle::new())?;
    let (_tx, rx) = mpsc::channel::<String>(8);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    shutdown_tx.send(())?;
    tokio::time::timeout(
        Duration::from_secs(2),
        harness.dispatcher.run(rx, shutdown_rx),
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_lands_in_flight_patrol() -> Result<()> {
    let harness = dispatch_harness(
        SimulatedVehicle::new().with_command_delay(Duration::from_millis(20)),
    )?;
    let (tx, rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tx.send("patrol".to_string()).await?;
    let stop = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(())
    });

    tokio::time::timeout(
        Duration::from_secs(5),
        harness.dispatcher.run(rx, shutdown_rx),
    )
    .await?;
    stop.await??;

    // run() only returns once the patrol has flown to the end.
    let commands = harness.vehicle.commands();
    assert_eq!(
        &commands[commands.len() - 2..],
        ["land".to_string(), "reboot".to_string()]
    );
    assert_eq!(harness.state.current(), VehicleState::Idle);
    assert_eq!(harness.publisher.sent().len(), 1);
    Ok(())
}
