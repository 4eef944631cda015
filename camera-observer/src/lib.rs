/*!
 * CAMERA OBSERVER - relance automatique des caméras Frigate figées
 *
 * RÔLE : Écoute `frigate/stats` sur MQTT, repère les caméras à 0 FPS et
 * power-cycle la prise SmartThings associée (off, pause, on).
 *
 * ARCHITECTURE : TelemetrySubscriber (MQTT) -> FaultObserver (mapping + cooldown)
 * -> RemediationDispatcher (une task Tokio par relance) -> DeviceController (REST).
 */

pub mod config;
pub mod cooldown;
pub mod dispatch;
pub mod health;
pub mod models;
pub mod mqtt;
pub mod observer;
pub mod smartthings;

pub use config::{load_config, BrokerAddr, ObserverConfig};
pub use cooldown::{CooldownRegistry, Gate};
pub use dispatch::{RemediationDispatcher, RemediationOutcome};
pub use models::{Device, MissingFpsPolicy, SwitchCommand};
pub use mqtt::{MessageHandler, TelemetrySubscriber};
pub use observer::{CameraDecision, Decision, FaultObserver};
pub use smartthings::{DeviceController, DeviceError, SmartThingsClient};
