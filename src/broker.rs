use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command::ReplyPublisher;
use crate::config::BrokerConfig;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker at {host}:{port} unreachable within {timeout:?}")]
    Unreachable {
        host: String,
        port: u16,
        timeout: Duration,
    },
    #[error("broker client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Connection to the command broker. Inbound command bodies are forwarded to
/// the channel given to [`BrokerClient::connect`]; replies go out on the
/// outbound topic.
pub struct BrokerClient {
    client: AsyncClient,
    outbound_topic: String,
    connection: JoinHandle<()>,
}

impl BrokerClient {
    /// Connects and subscribes. Failing to reach the broker in time is fatal
    /// for the caller.
    pub async fn connect(
        config: &BrokerConfig,
        inbound: mpsc::Sender<String>,
    ) -> Result<Self, BrokerError> {
        let client_id = format!(
            "{}-{}",
            config.client_id,
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let mut mqtt_options = MqttOptions::new(client_id, config.host.clone(), config.port);
        mqtt_options
            .set_keep_alive(Duration::from_secs(config.keep_alive_secs))
            .set_clean_session(true);

        info!("Connecting to broker at {}:{}", config.host, config.port);
        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);
        let (connected_tx, mut connected_rx) = watch::channel(false);

        let inbound_topic = config.inbound_topic();
        let subscriber = client.clone();
        let connection = tokio::spawn(async move {
            debug!("Starting broker event loop");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!("Connected to broker: {:?}", ack);
                        // Clean sessions drop subscriptions, so renew on every connect.
                        if let Err(e) = subscriber.try_subscribe(&inbound_topic, QoS::AtMostOnce) {
                            error!("Failed to subscribe to {}: {}", inbound_topic, e);
                        }
                        connected_tx.send_replace(true);
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        info!("Subscription confirmed: {:?}", ack);
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        if p.topic != inbound_topic {
                            debug!("Ignoring message on {}", p.topic);
                            continue;
                        }
                        match String::from_utf8(p.payload.to_vec()) {
                            Ok(body) => {
                                if inbound.send(body).await.is_err() {
                                    info!("Dispatcher gone, stopping broker event loop");
                                    break;
                                }
                            }
                            Err(e) => warn!("Dropping non UTF-8 message on {}: {}", p.topic, e),
                        }
                    }
                    Ok(event) => debug!("Broker event: {:?}", event),
                    Err(e) => {
                        if *connected_tx.borrow() {
                            error!("Broker connection lost, reconnecting: {:?}", e);
                            connected_tx.send_replace(false);
                        } else {
                            debug!("Broker not reachable yet: {:?}", e);
                        }
                        sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let connected = matches!(
            tokio::time::timeout(timeout, connected_rx.wait_for(|connected| *connected)).await,
            Ok(Ok(_))
        );
        if !connected {
            error!("Failed to connect to broker within {:?}", timeout);
            connection.abort();
            return Err(BrokerError::Unreachable {
                host: config.host.clone(),
                port: config.port,
                timeout,
            });
        }

        info!(
            "Listening on {}, replying on {}",
            config.inbound_topic(),
            config.outbound_topic()
        );
        Ok(Self {
            client,
            outbound_topic: config.outbound_topic(),
            connection,
        })
    }

    pub async fn disconnect(self) {
        if let Err(e) = self.client.disconnect().await {
            error!("Failed to disconnect from broker: {}", e);
        }
        self.connection.abort();
    }
}

#[async_trait]
impl ReplyPublisher for BrokerClient {
    async fn publish(&self, payload: &str) -> anyhow::Result<()> {
        self.client
            .publish(&self.outbound_topic, QoS::AtLeastOnce, false, payload.to_string())
            .await
            .map_err(BrokerError::from)?;
        Ok(())
    }
}
