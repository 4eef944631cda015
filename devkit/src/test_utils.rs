/*!
Harness de test pour le FaultObserver

Assemble un observer complet (mapping, cooldown, dispatcher) branché sur un
RecordingController et un MockTelemetryFeed, puis expose des helpers pour
injecter des stats et attendre la fin des relances.
*/

use crate::controller_stub::RecordingController;
use crate::telemetry_stub::{MockTelemetryFeed, StatsMessageBuilder};
use anyhow::Result;
use camera_observer::{
    CooldownRegistry, FaultObserver, MissingFpsPolicy, RemediationDispatcher, RemediationOutcome,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const STATS_TOPIC: &str = "frigate/stats";

pub struct ObserverHarness {
    pub feed: MockTelemetryFeed,
    pub controller: RecordingController,
    pub observer: Arc<FaultObserver>,
}

pub struct HarnessBuilder {
    mapping: HashMap<String, String>,
    cooldown: Duration,
    settle: Duration,
    missing_fps: MissingFpsPolicy,
}

impl HarnessBuilder {
    pub fn map(mut self, camera_id: &str, device_id: &str) -> Self {
        self.mapping.insert(camera_id.to_string(), device_id.to_string());
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn missing_fps(mut self, policy: MissingFpsPolicy) -> Self {
        self.missing_fps = policy;
        self
    }

    pub fn build(self) -> ObserverHarness {
        env_logger::try_init().ok();

        let controller = RecordingController::with_settle(self.settle);
        let dispatcher = Arc::new(RemediationDispatcher::new(Arc::new(controller.clone())));
        let observer = Arc::new(
            FaultObserver::with_parts(
                self.mapping,
                Arc::new(CooldownRegistry::new(self.cooldown)),
                dispatcher,
            )
            .with_missing_fps(self.missing_fps),
        );

        let feed = MockTelemetryFeed::new();
        feed.subscribe(STATS_TOPIC, observer.clone());

        ObserverHarness { feed, controller, observer }
    }
}

impl ObserverHarness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            mapping: HashMap::new(),
            cooldown: camera_observer::cooldown::DEFAULT_COOLDOWN,
            settle: Duration::from_secs(10),
            missing_fps: MissingFpsPolicy::Zero,
        }
    }

    /// Publishes a stats message with the given (camera, fps) pairs.
    pub fn send_stats(&self, cameras: &[(&str, f64)]) {
        let builder = cameras
            .iter()
            .enumerate()
            .fold(StatsMessageBuilder::new(), |b, (i, (cam, fps))| b.camera(cam, *fps, 100 + i as i64));
        self.feed.simulate_incoming(STATS_TOPIC, builder.to_bytes());
    }

    pub fn send_raw(&self, payload: &[u8]) {
        self.feed.simulate_incoming(STATS_TOPIC, payload.to_vec());
    }

    pub fn send_json(&self, value: &serde_json::Value) -> Result<()> {
        self.feed.simulate_json(STATS_TOPIC, value)?;
        Ok(())
    }

    /// Waits for every dispatched restart to finish.
    pub async fn settle(&self) -> Vec<RemediationOutcome> {
        self.observer.dispatcher().drain().await
    }

    pub fn in_flight(&self) -> usize {
        self.observer.dispatcher().in_flight()
    }

    pub fn restarts_started(&self, device_id: &str) -> usize {
        self.controller.restarts_started(device_id)
    }

    pub fn total_commands(&self) -> usize {
        self.controller.get_sent_commands().len()
    }
}
