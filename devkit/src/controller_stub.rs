/*!
Controller SmartThings simulé

Enregistre chaque commande switch (device, commande, instant) au lieu d'appeler
l'API, et peut être scripté pour échouer sur un device/commande donné.
*/

use async_trait::async_trait;
use camera_observer::smartthings::{DeviceController, DeviceError, StatusCode};
use camera_observer::SwitchCommand;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub device_id: String,
    pub command: SwitchCommand,
    pub at: Instant,
}

#[derive(Clone)]
pub struct RecordingController {
    sent: Arc<Mutex<Vec<SentCommand>>>,
    failures: Arc<Mutex<HashSet<(String, SwitchCommand)>>>,
    settle: Duration,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::with_settle(Duration::from_secs(10))
    }

    pub fn with_settle(settle: Duration) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashSet::new())),
            settle,
        }
    }

    /// Makes `command` on `device_id` fail with a 500 from now on.
    pub fn fail_on(&self, device_id: &str, command: SwitchCommand) {
        self.failures.lock().unwrap().insert((device_id.to_string(), command));
    }

    pub fn get_sent_commands(&self) -> Vec<SentCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn commands_for(&self, device_id: &str) -> Vec<SwitchCommand> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.device_id == device_id)
            .map(|c| c.command)
            .collect()
    }

    /// Number of restart sequences started (one "off" each).
    pub fn restarts_started(&self, device_id: &str) -> usize {
        self.commands_for(device_id)
            .into_iter()
            .filter(|c| *c == SwitchCommand::Off)
            .count()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Default for RecordingController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceController for RecordingController {
    async fn send_command(&self, device_id: &str, command: SwitchCommand) -> Result<(), DeviceError> {
        self.sent.lock().unwrap().push(SentCommand {
            device_id: device_id.to_string(),
            command,
            at: Instant::now(),
        });
        log::info!("🔌 [MOCK] {} -> {}", command, device_id);

        if self.failures.lock().unwrap().contains(&(device_id.to_string(), command)) {
            return Err(DeviceError::Status {
                device_id: device_id.to_string(),
                command: command.as_str(),
                status: StatusCode::INTERNAL_SERVER_ERROR,
            });
        }
        Ok(())
    }

    fn settle_delay(&self) -> Duration {
        self.settle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn records_restart_sequence() {
        let ctl = RecordingController::new();
        ctl.restart("switch-1").await.unwrap();

        assert_eq!(ctl.commands_for("switch-1"), vec![SwitchCommand::Off, SwitchCommand::On]);
        let sent = ctl.get_sent_commands();
        assert!(sent[1].at - sent[0].at >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_failure_aborts_restart() {
        let ctl = RecordingController::new();
        ctl.fail_on("switch-1", SwitchCommand::Off);
        assert!(ctl.restart("switch-1").await.is_err());
        assert_eq!(ctl.commands_for("switch-1"), vec![SwitchCommand::Off]);
    }
}
