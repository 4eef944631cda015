use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Outcome of [`CooldownRegistry::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// The caller owns the slot; the entry now holds the acquisition time.
    Acquired,
    /// Still cooling down from the last acquisition.
    Suppressed { elapsed: Duration, remaining: Duration },
}

/// Last remediation time per camera. The check and the update happen under
/// one lock so two overlapping evaluations of the same camera cannot both win.
#[derive(Debug)]
pub struct CooldownRegistry {
    window: Duration,
    last_run: Mutex<HashMap<String, Instant>>,
}

impl CooldownRegistry {
    pub fn new(window: Duration) -> Self {
        Self { window, last_run: Mutex::new(HashMap::new()) }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn try_acquire(&self, key: &str) -> Gate {
        self.try_acquire_at(key, Instant::now())
    }

    pub fn try_acquire_at(&self, key: &str, now: Instant) -> Gate {
        let mut last_run = self.last_run.lock();
        if let Some(&last) = last_run.get(key) {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.window {
                return Gate::Suppressed { elapsed, remaining: self.window - elapsed };
            }
            // zero window: always acquired, but the entry never moves back
            if now <= last {
                return Gate::Acquired;
            }
        }
        last_run.insert(key.to_string(), now);
        Gate::Acquired
    }

    pub fn last_acquired(&self, key: &str) -> Option<Instant> {
        self.last_run.lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.last_run.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CooldownRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
