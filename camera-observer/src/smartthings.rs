//! SmartThings REST client: switch commands and device listing.
//!
//! The [`DeviceController`] trait is the seam the observer dispatches through;
//! the power-cycle sequence lives there so every controller gets the same
//! off / settle / on ordering.

use crate::config::{SmartThingsConf, DEFAULT_BASE_URL};
use crate::models::{CommandRequest, Device, DevicesResponse, SwitchCommand};
use async_trait::async_trait;
pub use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_SETTLE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("network error sending '{command}' to {device_id}: {source}")]
    Network {
        device_id: String,
        command: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("api returned status {status} for '{command}' on {device_id}")]
    Status {
        device_id: String,
        command: &'static str,
        status: StatusCode,
    },
    #[error("network error listing devices: {0}")]
    ListNetwork(#[source] reqwest::Error),
    #[error("api returned status {0} when listing devices")]
    ListStatus(StatusCode),
    #[error("failed to decode device list: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Something that can switch a device off and on.
#[async_trait]
pub trait DeviceController: Send + Sync {
    async fn send_command(&self, device_id: &str, command: SwitchCommand) -> Result<(), DeviceError>;

    /// Pause between "off" and "on" during a restart.
    fn settle_delay(&self) -> Duration {
        DEFAULT_SETTLE
    }

    /// Power-cycles a device. A failed "off" aborts the sequence: we do not
    /// switch on a device whose off state is unknown. A failed "on" leaves the
    /// device off.
    async fn restart(&self, device_id: &str) -> Result<(), DeviceError> {
        info!(device_id, "turning device off");
        self.send_command(device_id, SwitchCommand::Off).await?;

        let settle = self.settle_delay();
        info!(device_id, settle_secs = settle.as_secs_f64(), "waiting before turning device back on");
        tokio::time::sleep(settle).await;

        info!(device_id, "turning device on");
        self.send_command(device_id, SwitchCommand::On).await
    }
}

#[derive(Clone)]
pub struct SmartThingsClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
    settle: Duration,
}

impl SmartThingsClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DeviceError> {
        Self::with_options(token, DEFAULT_BASE_URL, Duration::from_secs(10), DEFAULT_SETTLE)
    }

    pub fn from_config(conf: &SmartThingsConf, settle: Duration) -> Result<Self, DeviceError> {
        Self::with_options(
            conf.api_token.clone(),
            &conf.base_url,
            Duration::from_secs(conf.timeout_secs),
            settle,
        )
    }

    pub fn with_options(
        token: impl Into<String>,
        base_url: &str,
        timeout: Duration,
        settle: Duration,
    ) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeviceError::Client)?;
        Ok(Self {
            http,
            token: token.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            settle,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, DeviceError> {
        let response = self
            .http
            .get(format!("{}/devices", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(DeviceError::ListNetwork)?;

        if !response.status().is_success() {
            return Err(DeviceError::ListStatus(response.status()));
        }

        let body: DevicesResponse = response.json().await.map_err(DeviceError::Decode)?;
        Ok(body.items)
    }
}

#[async_trait]
impl DeviceController for SmartThingsClient {
    async fn send_command(&self, device_id: &str, command: SwitchCommand) -> Result<(), DeviceError> {
        let response = self
            .http
            .post(format!("{}/devices/{}/commands", self.base_url, device_id))
            .bearer_auth(&self.token)
            .json(&CommandRequest::switch(command))
            .send()
            .await
            .map_err(|source| DeviceError::Network {
                device_id: device_id.to_string(),
                command: command.as_str(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(DeviceError::Status {
                device_id: device_id.to_string(),
                command: command.as_str(),
                status: response.status(),
            });
        }
        Ok(())
    }

    fn settle_delay(&self) -> Duration {
        self.settle
    }
}
