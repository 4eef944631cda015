//! Fault observer: turns `frigate/stats` snapshots into throttled power cycles.
//!
//! For every camera reporting `camera_fps <= 0` that has a switch in the
//! mapping, the observer claims the camera's cooldown slot and hands the
//! switch to the [`RemediationDispatcher`]. Everything slow happens in the
//! dispatched task; [`FaultObserver::handle`] itself only decodes and decides.

use crate::cooldown::{CooldownRegistry, Gate};
use crate::dispatch::RemediationDispatcher;
use crate::models::{decode_snapshot, CameraHealth, MissingFpsPolicy, SnapshotError};
use crate::mqtt::MessageHandler;
use crate::smartthings::DeviceController;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What the observer decided for one camera of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Healthy,
    /// Stalled, but no switch is mapped to it.
    Unmapped,
    Suppressed { device_id: String, remaining: Duration },
    Dispatched { device_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraDecision {
    pub camera_id: String,
    pub decision: Decision,
}

pub struct FaultObserver {
    mapping: HashMap<String, String>,
    cooldowns: Arc<CooldownRegistry>,
    dispatcher: Arc<RemediationDispatcher>,
    missing_fps: MissingFpsPolicy,
}

impl FaultObserver {
    pub fn new(controller: Arc<dyn DeviceController>, mapping: HashMap<String, String>) -> Self {
        Self::with_parts(
            mapping,
            Arc::new(CooldownRegistry::default()),
            Arc::new(RemediationDispatcher::new(controller)),
        )
    }

    pub fn with_parts(
        mapping: HashMap<String, String>,
        cooldowns: Arc<CooldownRegistry>,
        dispatcher: Arc<RemediationDispatcher>,
    ) -> Self {
        Self { mapping, cooldowns, dispatcher, missing_fps: MissingFpsPolicy::default() }
    }

    pub fn with_missing_fps(mut self, policy: MissingFpsPolicy) -> Self {
        self.missing_fps = policy;
        self
    }

    pub fn dispatcher(&self) -> &Arc<RemediationDispatcher> {
        &self.dispatcher
    }

    pub fn cooldowns(&self) -> &Arc<CooldownRegistry> {
        &self.cooldowns
    }

    /// Decodes one raw stats message and evaluates it. Decode failures are
    /// returned, not retried: the next periodic stats message supersedes it.
    pub fn process(&self, payload: &[u8]) -> Result<Vec<CameraDecision>, SnapshotError> {
        let cameras = decode_snapshot(payload, self.missing_fps)?;
        debug!("received stats for {} cameras", cameras.len());
        Ok(self.evaluate(&cameras))
    }

    /// Each camera is judged on its own; one camera's mapping or cooldown
    /// never influences another's.
    pub fn evaluate(&self, cameras: &[CameraHealth]) -> Vec<CameraDecision> {
        cameras
            .iter()
            .map(|cam| CameraDecision {
                camera_id: cam.camera_id.clone(),
                decision: self.evaluate_camera(cam),
            })
            .collect()
    }

    fn evaluate_camera(&self, cam: &CameraHealth) -> Decision {
        if !cam.is_failed() {
            return Decision::Healthy;
        }

        warn!(camera = %cam.camera_id, pid = ?cam.pid, fps = cam.fps, "detected stalled camera feed");

        let Some(device_id) = self.mapping.get(&cam.camera_id) else {
            return Decision::Unmapped;
        };

        match self.cooldowns.try_acquire(&cam.camera_id) {
            Gate::Suppressed { elapsed, remaining } => {
                info!(
                    camera = %cam.camera_id,
                    "restart skipped, on cooldown (last restart {}s ago, {}s left)",
                    elapsed.as_secs(),
                    remaining.as_secs()
                );
                Decision::Suppressed { device_id: device_id.clone(), remaining }
            }
            Gate::Acquired => {
                self.dispatcher.dispatch(&cam.camera_id, device_id);
                Decision::Dispatched { device_id: device_id.clone() }
            }
        }
    }
}

impl MessageHandler for FaultObserver {
    fn handle(&self, topic: &str, payload: &[u8]) {
        if let Err(e) = self.process(payload) {
            error!(topic, "failed to parse stats payload: {e}");
        }
    }
}
