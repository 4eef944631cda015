use crate::smartthings::DeviceController;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// What one remediation task ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationOutcome {
    pub camera_id: String,
    pub device_id: String,
    /// `None` on success, the rendered error otherwise.
    pub error: Option<String>,
}

impl RemediationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs restart sequences off the message path, one Tokio task each.
///
/// Tasks are kept in a [`JoinSet`] so callers can count, await or abort them;
/// finished ones are reaped every time a new one is spawned.
pub struct RemediationDispatcher {
    controller: Arc<dyn DeviceController>,
    tasks: Mutex<JoinSet<RemediationOutcome>>,
}

impl RemediationDispatcher {
    pub fn new(controller: Arc<dyn DeviceController>) -> Self {
        Self { controller, tasks: Mutex::new(JoinSet::new()) }
    }

    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, camera_id: &str, device_id: &str) {
        let controller = self.controller.clone();
        let camera_id = camera_id.to_string();
        let device_id = device_id.to_string();

        let mut tasks = self.tasks.lock();
        reap_finished(&mut tasks);

        tasks.spawn(async move {
            info!(camera = %camera_id, device = %device_id, "initiating restart sequence");
            let error = match controller.restart(&device_id).await {
                Ok(()) => {
                    info!(camera = %camera_id, device = %device_id, "restart sequence completed");
                    None
                }
                Err(e) => {
                    error!(camera = %camera_id, device = %device_id, "failed to restart device: {e}");
                    Some(e.to_string())
                }
            };
            RemediationOutcome { camera_id, device_id, error }
        });
    }

    /// Remediations spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Waits for every outstanding remediation and returns their outcomes in
    /// completion order. Tasks dispatched while draining are picked up too.
    pub async fn drain(&self) -> Vec<RemediationOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let mut batch = std::mem::take(&mut *self.tasks.lock());
            if batch.is_empty() {
                return outcomes;
            }
            while let Some(done) = batch.join_next().await {
                match done {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => warn!("remediation task ended abnormally: {e}"),
                }
            }
        }
    }

    /// Drops outstanding remediations without waiting for them and returns
    /// how many were still running.
    pub fn abort_all(&self) -> usize {
        let mut tasks = self.tasks.lock();
        reap_finished(&mut tasks);
        let count = tasks.len();
        tasks.abort_all();
        count
    }
}

fn reap_finished(tasks: &mut JoinSet<RemediationOutcome>) {
    while let Some(done) = tasks.try_join_next() {
        if let Err(e) = done {
            warn!("remediation task ended abnormally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SwitchCommand;
    use crate::smartthings::DeviceError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Flaky {
        sent: Mutex<Vec<(String, SwitchCommand)>>,
        broken_device: &'static str,
    }

    #[async_trait]
    impl DeviceController for Flaky {
        async fn send_command(&self, device_id: &str, command: SwitchCommand) -> Result<(), DeviceError> {
            self.sent.lock().push((device_id.to_string(), command));
            if device_id == self.broken_device {
                return Err(DeviceError::Status {
                    device_id: device_id.to_string(),
                    command: command.as_str(),
                    status: reqwest::StatusCode::UNAUTHORIZED,
                });
            }
            Ok(())
        }

        fn settle_delay(&self) -> Duration {
            Duration::from_secs(10)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drain_collects_success_and_failure_independently() {
        let ctl = Arc::new(Flaky { sent: Mutex::new(Vec::new()), broken_device: "switch-bad" });
        let dispatcher = RemediationDispatcher::new(ctl.clone());

        dispatcher.dispatch("front", "switch-1");
        dispatcher.dispatch("back", "switch-bad");
        assert_eq!(dispatcher.in_flight(), 2);

        let mut outcomes = dispatcher.drain().await;
        outcomes.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].camera_id, "back");
        assert!(!outcomes[0].succeeded());
        assert!(outcomes[1].succeeded());
        assert_eq!(dispatcher.in_flight(), 0);

        let sent = ctl.sent.lock();
        assert_eq!(sent.iter().filter(|(d, _)| d == "switch-bad").count(), 1);
        assert_eq!(sent.iter().filter(|(d, _)| d == "switch-1").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_all_drops_pending_restarts() {
        let ctl = Arc::new(Flaky { sent: Mutex::new(Vec::new()), broken_device: "" });
        let dispatcher = RemediationDispatcher::new(ctl.clone());

        dispatcher.dispatch("front", "switch-1");
        // let the task reach the settle sleep
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(dispatcher.abort_all(), 1);
        assert!(dispatcher.drain().await.is_empty());
        assert_eq!(ctl.sent.lock().as_slice(), &[("switch-1".to_string(), SwitchCommand::Off)]);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_all_skips_finished_restarts() {
        let ctl = Arc::new(Flaky { sent: Mutex::new(Vec::new()), broken_device: "" });
        let dispatcher = RemediationDispatcher::new(ctl.clone());

        dispatcher.dispatch("front", "switch-1");
        // past the settle delay: the sequence is done but not reaped
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(dispatcher.in_flight(), 1);

        assert_eq!(dispatcher.abort_all(), 0);
        assert_eq!(ctl.sent.lock().len(), 2);
    }
}
