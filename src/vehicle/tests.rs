use super::tello::{check_ok, parse_battery, parse_height};
use super::*;
use crate::config::{VehicleConfig, VehicleKind};
use anyhow::Result;
use tokio::net::UdpSocket;

#[test]
fn test_sdk_command_words() {
    assert_eq!(format!("{} {}", Direction::Forward, 20), "forward 20");
    assert_eq!(format!("{} {}", Direction::Down, 20), "down 20");
    assert_eq!(format!("{} {}", Rotation::Clockwise, 180), "cw 180");
    assert_eq!(format!("{} {}", Rotation::CounterClockwise, 180), "ccw 180");
}

#[test]
fn test_reply_classification() {
    assert!(check_ok("takeoff", "ok").is_ok());
    assert!(matches!(
        check_ok("takeoff", "error Not joystick"),
        Err(VehicleError::Rejected { .. })
    ));
    assert!(matches!(
        check_ok("takeoff", "87"),
        Err(VehicleError::Malformed { .. })
    ));
}

#[test]
fn test_telemetry_parsing() {
    assert_eq!(parse_battery("87\r\n").unwrap(), 87);
    assert!(parse_battery("error").is_err());
    assert_eq!(parse_height("3dm").unwrap(), 30);
    assert_eq!(parse_height("0dm").unwrap(), 0);
    assert!(parse_height("high").is_err());
}

#[test]
fn test_only_feed_loss_is_unrecoverable() {
    assert!(VehicleError::FeedClosed.is_unrecoverable());
    assert!(!VehicleError::BadFrame("short".into()).is_unrecoverable());
    assert!(!VehicleError::Timeout {
        command: "battery?".into(),
        timeout: std::time::Duration::from_secs(1),
    }
    .is_unrecoverable());
}

#[tokio::test]
async fn test_simulated_vehicle_injects_faults() -> Result<()> {
    let vehicle = SimulatedVehicle::new().with_frame_interval(std::time::Duration::ZERO);
    vehicle.fail_command_at(1);

    vehicle.takeoff().await?;
    assert!(vehicle.move_by(Direction::Forward, 20).await.is_err());
    vehicle.land().await?;
    assert_eq!(vehicle.commands(), vec!["takeoff", "forward 20", "land"]);

    vehicle.fail_battery(true);
    assert!(vehicle.battery().await.is_err());
    assert_eq!(vehicle.height().await?, 0);

    let frame = vehicle.read_frame().await?;
    assert_eq!((frame.width(), frame.height()), (64, 48));
    vehicle.close_feed();
    assert!(matches!(
        vehicle.read_frame().await,
        Err(VehicleError::FeedClosed)
    ));
    Ok(())
}

async fn fake_tello() -> Result<(UdpSocket, String)> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let address = socket.local_addr()?.to_string();
    Ok((socket, address))
}

fn tello_config(address: String) -> VehicleConfig {
    VehicleConfig {
        kind: VehicleKind::Tello,
        address,
        local_port: 0,
        response_timeout_secs: 2,
        ..VehicleConfig::default()
    }
}

#[tokio::test]
async fn test_tello_speaks_sdk_text_protocol() -> Result<()> {
    let (drone, address) = fake_tello().await?;
    let responder = tokio::spawn(async move {
        let mut buf = [0u8; 256];
        let mut seen = Vec::new();
        for _ in 0..5 {
            let (n, peer) = drone.recv_from(&mut buf).await.unwrap();
            let command = String::from_utf8_lossy(&buf[..n]).to_string();
            let reply = match command.as_str() {
                "battery?" => "64",
                "height?" => "2dm",
                "land" => "error Not airborne",
                _ => "ok",
            };
            drone.send_to(reply.as_bytes(), peer).await.unwrap();
            seen.push(command);
        }
        seen
    });

    let tello = TelloVehicle::bind(&tello_config(address)).await?;
    tello.connect().await?;
    tello.move_by(Direction::Up, 20).await?;
    assert_eq!(tello.battery().await?, 64);
    assert_eq!(tello.height().await?, 20);
    assert!(matches!(
        tello.land().await,
        Err(VehicleError::Rejected { .. })
    ));

    let seen = responder.await?;
    assert_eq!(seen, vec!["command", "up 20", "battery?", "height?", "land"]);
    Ok(())
}

#[tokio::test]
async fn test_tello_times_out_without_reply() -> Result<()> {
    let (_drone, address) = fake_tello().await?;
    let mut config = tello_config(address);
    config.response_timeout_secs = 1;

    let tello = TelloVehicle::bind(&config).await?;
    let result = tello.takeoff().await;
    assert!(matches!(result, Err(VehicleError::Timeout { .. })));
    Ok(())
}

#[tokio::test]
async fn test_missing_decoder_is_unrecoverable() -> Result<()> {
    let (_drone, address) = fake_tello().await?;
    let mut config = tello_config(address);
    config.ffmpeg = "/nonexistent/ffmpeg-binary".to_string();

    let tello = TelloVehicle::bind(&config).await?;
    let error = tello.read_frame().await.unwrap_err();
    assert!(error.is_unrecoverable());
    Ok(())
}
