use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use drone_patrol::broker::BrokerClient;
use drone_patrol::config::{PatrolConfig, VehicleKind};
use drone_patrol::context::PatrolContext;
use drone_patrol::media::{operator, VideoAcquisitionWorker, WorkerExit};
use drone_patrol::util::setup_logging;
use drone_patrol::vehicle::{SimulatedVehicle, TelloVehicle, VehicleControl};
use drone_patrol::web::PictureServer;

#[tokio::main]
async fn main() -> Result<()> {
    let config = PatrolConfig::load().context("Failed to load configuration")?;
    let _log_guard = setup_logging(&config.log_level, config.log_dir.as_deref())?;
    info!("drone-patrol {} starting...", env!("CARGO_PKG_VERSION"));

    let (shutdown_tx, _) = broadcast::channel(1);

    let vehicle = connect_vehicle(&config).await?;
    let context = PatrolContext::from_config(vehicle, &config);

    let (control_tx, control_rx) = mpsc::channel(8);
    let video_handle = spawn_video_worker(context.video_worker(control_rx));
    if let Err(e) = operator::spawn_console(control_tx) {
        warn!("Operator console unavailable: {}", e);
    }

    let server = PictureServer::new(&config.web, &config.pictures);
    let web_handle = spawn_picture_server(server, shutdown_tx.subscribe());

    let (inbound_tx, inbound_rx) = mpsc::channel(32);
    let broker = Arc::new(
        BrokerClient::connect(&config.broker, inbound_tx)
            .await
            .context("Broker unreachable at startup")?,
    );

    let dispatcher = context.dispatcher(&config, broker.clone());
    let dispatch_shutdown = shutdown_tx.subscribe();
    let dispatch_handle =
        tokio::spawn(async move { dispatcher.run(inbound_rx, dispatch_shutdown).await });

    let shutdown_signal = async {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping services...");
                if shutdown_tx.send(()).is_err() {
                    warn!("No service was listening for shutdown");
                }
                tokio::spawn(async {
                    if signal::ctrl_c().await.is_ok() {
                        warn!("Second interrupt, exiting without waiting for the patrol");
                        std::process::exit(130);
                    }
                });
            }
            Err(err) => {
                error!("Failed to listen for shutdown signal: {}", err);
            }
        }
    };

    let results = tokio::join!(dispatch_handle, web_handle, shutdown_signal);
    for (result, name) in [results.0, results.1]
        .into_iter()
        .zip(["Command dispatcher", "Picture server"])
    {
        if let Err(e) = result {
            error!("{} join error: {}", name, e);
        }
    }

    video_handle.abort();
    if let Ok(broker) = Arc::try_unwrap(broker) {
        broker.disconnect().await;
    }

    info!("All services stopped, shutting down");
    Ok(())
}

async fn connect_vehicle(config: &PatrolConfig) -> Result<Arc<dyn VehicleControl>> {
    let vehicle: Arc<dyn VehicleControl> = match config.vehicle.kind {
        VehicleKind::Tello => Arc::new(
            TelloVehicle::bind(&config.vehicle)
                .await
                .context("Failed to open vehicle link")?,
        ),
        VehicleKind::Simulated => {
            info!("Using simulated vehicle");
            Arc::new(SimulatedVehicle::new())
        }
    };

    if let Err(e) = vehicle.connect().await {
        error!(operation = "connect", "Vehicle did not enter command mode: {}", e);
    }
    match vehicle.stream_on().await {
        Ok(()) => info!("Drone connected and stream on"),
        Err(e) => error!(operation = "streamon", "Failed to start video stream: {}", e),
    }

    Ok(vehicle)
}

fn spawn_video_worker(worker: VideoAcquisitionWorker) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match worker.run().await {
            Ok(WorkerExit::Quit) => info!("Video worker stopped by operator"),
            Err(e) => error!("Video worker terminated: {}", e),
        }
    })
}

fn spawn_picture_server(
    server: PictureServer,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = server.start() => {
                if let Err(e) = result {
                    error!("Picture server error: {:#}", e);
                }
            }
            _ = shutdown.recv() => {
                info!("Shutting down picture server...");
            }
        }
    })
}
