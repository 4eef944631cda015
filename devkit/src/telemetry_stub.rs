/*!
Feed de télémétrie simulé pour tester sans broker

Remplace le TelemetrySubscriber : les handlers enregistrés reçoivent les
messages injectés de façon synchrone, dans l'ordre, comme le ferait la boucle
d'événements MQTT.
*/

use anyhow::Result;
use camera_observer::mqtt::{topic_matches, MessageHandler};
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Stand-in for the MQTT subscriber: same subscribe/deliver contract.
#[derive(Clone, Default)]
pub struct MockTelemetryFeed {
    handlers: Arc<Mutex<Vec<(String, Arc<dyn MessageHandler>)>>>,
    delivered: Arc<Mutex<Vec<MockMessage>>>,
}

impl MockTelemetryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) {
        self.handlers.lock().unwrap().push((topic.to_string(), handler));
        log::info!("📥 [MOCK] Subscribed to {}", topic);
    }

    /// Delivers one message to every matching handler; returns how many got it.
    pub fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> usize
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage { topic: topic.into(), payload: payload.into() };

        let handlers: Vec<_> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(filter, _)| topic_matches(filter, &message.topic))
            .map(|(_, h)| h.clone())
            .collect();

        for handler in &handlers {
            handler.handle(&message.topic, &message.payload);
        }

        log::info!("📨 [MOCK] Delivered {} to {} handler(s)", message.topic, handlers.len());
        self.delivered.lock().unwrap().push(message);
        handlers.len()
    }

    pub fn simulate_json(&self, topic: &str, value: &Value) -> Result<usize> {
        Ok(self.simulate_incoming(topic, serde_json::to_vec(value)?))
    }

    pub fn get_delivered_messages(&self) -> Vec<MockMessage> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.handlers.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn clear(&self) {
        self.delivered.lock().unwrap().clear();
    }
}

/// Builds `frigate/stats` payloads.
#[derive(Debug, Default, Clone)]
pub struct StatsMessageBuilder {
    cameras: serde_json::Map<String, Value>,
}

impl StatsMessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn camera(mut self, camera_id: &str, fps: f64, pid: i64) -> Self {
        self.cameras.insert(
            camera_id.to_string(),
            serde_json::json!({ "camera_fps": fps, "pid": pid, "process_fps": fps, "detection_fps": 0.0 }),
        );
        self
    }

    /// Camera entry without `camera_fps`.
    pub fn camera_without_fps(mut self, camera_id: &str, pid: i64) -> Self {
        self.cameras.insert(camera_id.to_string(), serde_json::json!({ "pid": pid }));
        self
    }

    pub fn build(self) -> Value {
        serde_json::json!({
            "cameras": self.cameras,
            "detectors": { "coral": { "inference_speed": 10.2, "pid": 400 } },
            "service": { "uptime": 3600, "version": "0.13.2" }
        })
    }

    pub fn to_bytes(self) -> Vec<u8> {
        // a json! Value always serializes
        serde_json::to_vec(&self.build()).unwrap_or_default()
    }
}
