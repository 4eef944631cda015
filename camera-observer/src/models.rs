//! Wire types: the Frigate stats snapshot (inbound) and SmartThings payloads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Per-camera entry of a `frigate/stats` message. Only the fields we act on
/// are decoded; everything else Frigate reports is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CameraStats {
    pub camera_fps: Option<f64>,
    pub pid: Option<i64>,
}

/// `null` is accepted for the map and for single entries: a null map is an
/// empty snapshot, a null entry is a camera without `camera_fps`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsPayload {
    #[serde(default)]
    pub cameras: Option<HashMap<String, Option<CameraStats>>>,
}

/// How a camera entry without `camera_fps` is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFpsPolicy {
    /// Missing means 0 fps, i.e. the feed is considered stalled.
    #[default]
    Zero,
    /// Missing makes the whole message malformed.
    Reject,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid stats JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("camera '{0}' has no camera_fps field")]
    MissingFps(String),
}

/// One camera, reduced to what the fault predicate needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraHealth {
    pub camera_id: String,
    pub fps: f64,
    pub pid: Option<i64>,
}

impl CameraHealth {
    /// A feed is failed when its frame rate is not strictly positive.
    pub fn is_failed(&self) -> bool {
        !matches!(self.fps.partial_cmp(&0.0), Some(std::cmp::Ordering::Greater))
    }
}

/// Decodes a raw stats payload into per-camera health, sorted by camera id so
/// that evaluation order (and logs) are stable.
pub fn decode_snapshot(
    payload: &[u8],
    policy: MissingFpsPolicy,
) -> Result<Vec<CameraHealth>, SnapshotError> {
    let data: StatsPayload = serde_json::from_slice(payload)?;

    let entries = data.cameras.unwrap_or_default();
    let mut cameras = Vec::with_capacity(entries.len());
    for (camera_id, stats) in entries {
        let stats = stats.unwrap_or_default();
        let fps = match (stats.camera_fps, policy) {
            (Some(fps), _) => fps,
            (None, MissingFpsPolicy::Zero) => 0.0,
            (None, MissingFpsPolicy::Reject) => return Err(SnapshotError::MissingFps(camera_id)),
        };
        cameras.push(CameraHealth { camera_id, fps, pid: stats.pid });
    }
    cameras.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
    Ok(cameras)
}

// ===== SmartThings =====

#[derive(Debug, Serialize)]
pub struct CommandRequest {
    pub commands: Vec<Command>,
}

#[derive(Debug, Serialize)]
pub struct Command {
    pub component: String,
    pub capability: String,
    pub command: String,
    pub arguments: Vec<serde_json::Value>,
}

impl CommandRequest {
    /// Single `switch` command against the `main` component.
    pub fn switch(command: SwitchCommand) -> Self {
        Self {
            commands: vec![Command {
                component: "main".into(),
                capability: "switch".into(),
                command: command.as_str().into(),
                arguments: Vec::new(),
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchCommand {
    Off,
    On,
}

impl SwitchCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchCommand::Off => "off",
            SwitchCommand::On => "on",
        }
    }
}

impl std::fmt::Display for SwitchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub items: Vec<Device>,
}
