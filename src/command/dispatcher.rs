use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::status::StatusReporter;
use super::{Command, CommandError, Reply};
use crate::patrol::{FlightRoutine, StateMachine};
use crate::web::PictureLocator;

/// Outbound side of the broker.
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    async fn publish(&self, payload: &str) -> Result<()>;
}

/// What the dispatcher did with one inbound message.
#[derive(Debug)]
pub enum Dispatch {
    PatrolStarted,
    PatrolRejected,
    StatusPublished,
    StatusUndelivered,
    Ignored(CommandError),
}

pub struct CommandDispatcher {
    state: StateMachine,
    routine: Arc<FlightRoutine>,
    reporter: StatusReporter,
    publisher: Arc<dyn ReplyPublisher>,
    locator: PictureLocator,
    patrols: Mutex<JoinSet<()>>,
}

impl CommandDispatcher {
    pub fn new(
        state: StateMachine,
        routine: Arc<FlightRoutine>,
        reporter: StatusReporter,
        publisher: Arc<dyn ReplyPublisher>,
        locator: PictureLocator,
    ) -> Self {
        Self {
            state,
            routine,
            reporter,
            publisher,
            locator,
            patrols: Mutex::new(JoinSet::new()),
        }
    }

    /// Handles messages one at a time until the inbound channel closes or
    /// shutdown is broadcast. Patrols run on their own tasks; an in-flight
    /// patrol is always flown to completion before this returns.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<String>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Command dispatcher waiting for messages");
        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(body) => {
                        let outcome = self.dispatch(&body).await;
                        debug!("Dispatched {:?}: {:?}", body, outcome);
                    }
                    None => {
                        info!("Inbound message stream closed");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Shutting down command dispatcher...");
                    break;
                }
            }
        }
        self.finish_patrols().await;
    }

    /// Waits for every spawned patrol, including its reply, to finish.
    pub async fn finish_patrols(&self) {
        let mut patrols = std::mem::take(
            &mut *self.patrols.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !patrols.is_empty() {
            info!("Waiting for the in-flight patrol to land");
        }
        while let Some(result) = patrols.join_next().await {
            if let Err(e) = result {
                error!(operation = "patrol", "Patrol task failed: {}", e);
            }
        }
    }

    pub async fn dispatch(&self, body: &str) -> Dispatch {
        info!("Received: {}", body);
        match body.parse::<Command>() {
            Ok(Command::Patrol) => self.start_patrol(),
            Ok(Command::Status) => self.report_status().await,
            Err(e) => {
                debug!("Ignoring message: {}", e);
                Dispatch::Ignored(e)
            }
        }
    }

    fn start_patrol(&self) -> Dispatch {
        let guard = match self.state.request_patrol() {
            Ok(guard) => guard,
            Err(e) => {
                info!("Drone is already patrolling ({})", e);
                return Dispatch::PatrolRejected;
            }
        };

        info!("Starting patrol");
        let routine = self.routine.clone();
        let publisher = self.publisher.clone();
        let locator = self.locator.clone();

        let mut patrols = self.patrols.lock().unwrap_or_else(PoisonError::into_inner);
        while patrols.try_join_next().is_some() {}
        patrols.spawn(async move {
            let report = match routine.run(guard).await {
                Ok(report) => report,
                Err(e) => {
                    error!(operation = "patrol", "Patrol failed, no picture reply: {}", e);
                    return;
                }
            };

            let file_name = report
                .last_picture()
                .map(|saved| saved.file_name.clone())
                .or_else(|| {
                    warn!("Patrol saved no picture, falling back to newest file");
                    locator.latest_file()
                });
            let Some(file_name) = file_name else {
                warn!("No picture available to reply with");
                return;
            };

            let reply = Reply::Picture(locator.url_for(&file_name));
            publish(publisher.as_ref(), &reply).await;
        });

        Dispatch::PatrolStarted
    }

    async fn report_status(&self) -> Dispatch {
        let snapshot = self.reporter.snapshot().await;
        if publish(self.publisher.as_ref(), &Reply::Status(snapshot)).await {
            Dispatch::StatusPublished
        } else {
            Dispatch::StatusUndelivered
        }
    }
}

async fn publish(publisher: &dyn ReplyPublisher, reply: &Reply) -> bool {
    let payload = match reply.to_payload() {
        Ok(payload) => payload,
        Err(e) => {
            error!(operation = "publish", "Failed to encode reply: {}", e);
            return false;
        }
    };

    match publisher.publish(&payload).await {
        Ok(()) => {
            info!("Published: {}", payload);
            true
        }
        Err(e) => {
            error!(operation = "publish", "Failed to publish reply: {}", e);
            false
        }
    }
}
