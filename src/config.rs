use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct PatrolConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub log_dir: Option<String>,
    pub broker: BrokerConfig,
    pub web: WebConfig,
    #[serde(default)]
    pub pictures: PicturesConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub flight: FlightConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_inbound_key")]
    pub inbound_key: String,
    #[serde(default = "default_outbound_key")]
    pub outbound_key: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Joins exchange and routing key into an MQTT topic.
    #[serde(default = "default_topic_separator")]
    pub topic_separator: String,
    /// Topic used verbatim instead of `<exchange><separator><inbound_key>`.
    /// With RabbitMQ's MQTT plugin, setting this to the bare routing key and
    /// binding the `drone` exchange to `amq.topic` on that key lets AMQP
    /// clients of the direct exchange reach this process.
    pub inbound_override: Option<String>,
    pub outbound_override: Option<String>,
}

impl BrokerConfig {
    pub fn inbound_topic(&self) -> String {
        self.inbound_override
            .clone()
            .unwrap_or_else(|| self.route(&self.inbound_key))
    }

    pub fn outbound_topic(&self) -> String {
        self.outbound_override
            .clone()
            .unwrap_or_else(|| self.route(&self.outbound_key))
    }

    fn route(&self, key: &str) -> String {
        format!("{}{}{}", self.exchange, self.topic_separator, key)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    /// Externally reachable host or IP used when composing picture URLs.
    pub public_host: String,
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PicturesConfig {
    pub dir: PathBuf,
    pub pause_ms: u64,
}

impl Default for PicturesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("pictures"),
            pause_ms: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VehicleKind {
    Tello,
    Simulated,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VehicleConfig {
    pub kind: VehicleKind,
    pub address: String,
    pub local_port: u16,
    pub response_timeout_secs: u64,
    pub video_url: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub ffmpeg: String,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            kind: VehicleKind::Tello,
            address: "192.168.10.1:8889".to_string(),
            local_port: 8889,
            response_timeout_secs: 10,
            video_url: "udp://0.0.0.0:11111".to_string(),
            frame_width: 960,
            frame_height: 720,
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FlightConfig {
    pub distance_cm: u32,
    pub rotation_deg: u32,
    pub readiness_timeout_secs: Option<u64>,
    pub reboot_after_patrol: bool,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            distance_cm: 20,
            rotation_deg: 180,
            readiness_timeout_secs: None,
            reboot_after_patrol: true,
        }
    }
}

impl FlightConfig {
    pub fn readiness_timeout(&self) -> Option<Duration> {
        self.readiness_timeout_secs.map(Duration::from_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_exchange() -> String {
    "drone".to_string()
}

fn default_inbound_key() -> String {
    "send".to_string()
}

fn default_outbound_key() -> String {
    "receive".to_string()
}

fn default_client_id() -> String {
    "drone-patrol".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_keep_alive() -> u64 {
    30
}

fn default_topic_separator() -> String {
    "/".to_string()
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8000
}

impl PatrolConfig {
    /// Layers `config/default.toml`, `config/<RUST_ENV>.toml`,
    /// `/etc/drone-patrol/patrol.toml` and `PATROL_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("/etc/drone-patrol/patrol").required(false))
            .add_source(Environment::with_prefix("PATROL").separator("__"));

        Self::from_config(builder.build()?)
    }

    pub fn from_config(settings: Config) -> Result<Self, ConfigError> {
        let config: Self = settings.try_deserialize()?;
        if config.broker.host.trim().is_empty() {
            return Err(ConfigError::Message("broker.host must not be empty".into()));
        }
        if config.web.public_host.trim().is_empty() {
            return Err(ConfigError::Message(
                "web.public_host must not be empty".into(),
            ));
        }
        Ok(config)
    }
}
