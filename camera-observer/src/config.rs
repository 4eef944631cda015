use crate::models::MissingFpsPolicy;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};
use thiserror::Error;
use tokio::fs;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const CONFIG_PATH_ENV: &str = "CAMERA_OBSERVER_CONFIG";
pub const TOKEN_ENV: &str = "SMARTTHINGS_TOKEN";
pub const BROKER_ENV: &str = "MQTT_BROKER";

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_BASE_URL: &str = "https://api.smartthings.com/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to decode config file {path}: {source}")]
    Parse { path: String, source: serde_yaml::Error },
    #[error("invalid broker address '{0}'")]
    InvalidBroker(String),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObserverConfig {
    pub mqtt: MqttConf,
    pub smartthings: SmartThingsConf,
    #[serde(default)]
    pub observer: ObserverConf,
    /// camera name (as reported by Frigate) -> SmartThings device id
    #[serde(default)]
    pub mapping: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    #[serde(default)]
    pub broker: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SmartThingsConf {
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObserverConf {
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
    #[serde(default)]
    pub missing_fps: MissingFpsPolicy,
}

impl Default for ObserverConf {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            settle_secs: default_settle(),
            missing_fps: MissingFpsPolicy::default(),
        }
    }
}

fn default_topic() -> String { "frigate/stats".into() }
fn default_keep_alive() -> u64 { 60 }
fn default_base_url() -> String { DEFAULT_BASE_URL.into() }
fn default_http_timeout() -> u64 { 10 }
fn default_cooldown() -> u64 { 300 }
fn default_settle() -> u64 { 10 }

impl ObserverConfig {
    pub fn from_yaml(txt: &str, path: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(txt).map_err(|source| ConfigError::Parse { path: path.into(), source })
    }

    /// Environment values win over the file when non-empty.
    pub fn apply_overrides(&mut self, token: Option<String>, broker: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.smartthings.api_token = token;
        }
        if let Some(broker) = broker.filter(|b| !b.trim().is_empty()) {
            self.mqtt.broker = broker;
        }
    }

    /// Fills derived defaults and rejects settings the service cannot run without.
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        if self.mqtt.broker.trim().is_empty() {
            return Err(ConfigError::Missing("mqtt.broker"));
        }
        BrokerAddr::parse(&self.mqtt.broker)?;
        if self.mqtt.topic.trim().is_empty() {
            return Err(ConfigError::Missing("mqtt.topic"));
        }
        if self.smartthings.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("smartthings.api_token"));
        }
        if self.mqtt.client_id.trim().is_empty() {
            self.mqtt.client_id = format!("camera-observer-{}", uuid::Uuid::new_v4().simple());
        }
        Ok(self)
    }

    pub fn broker_addr(&self) -> Result<BrokerAddr, ConfigError> {
        BrokerAddr::parse(&self.mqtt.broker)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.observer.cooldown_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.observer.settle_secs)
    }
}

/// Reads the config file (path from `CAMERA_OBSERVER_CONFIG`, else `config.yaml`)
/// and applies the `SMARTTHINGS_TOKEN` / `MQTT_BROKER` overrides.
pub async fn load_config() -> Result<ObserverConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: impl AsRef<Path>) -> Result<ObserverConfig, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let txt = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read { path: display.clone(), source })?;

    let mut cfg = ObserverConfig::from_yaml(&txt, &display)?;
    cfg.apply_overrides(std::env::var(TOKEN_ENV).ok(), std::env::var(BROKER_ENV).ok());
    cfg.finalize()
}

/// Broker host/port as rumqttc wants them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddr {
    pub host: String,
    pub port: u16,
}

impl BrokerAddr {
    /// Accepts `tcp://host:port`, `mqtt://host:port`, `host:port` and `host`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidBroker(raw.to_string());
        let trimmed = raw.trim();

        let rest = match trimmed.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => rest,
            Some(_) => return Err(invalid()),
            None => trimmed,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (rest, DEFAULT_MQTT_PORT),
        };
        if host.is_empty() || host.contains('/') {
            return Err(invalid());
        }
        Ok(Self { host: host.to_string(), port })
    }
}

impl std::fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
