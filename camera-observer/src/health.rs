use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Connecting => "connecting",
            LinkStatus::Connected => "connected",
            LinkStatus::Reconnecting => "reconnecting",
            LinkStatus::Disconnected => "disconnected",
        }
    }
}

/// Broker link state, shared between the event loop task and whoever wants
/// to report on it.
#[derive(Clone)]
pub struct LinkHealth {
    start_time: Instant,
    reconnects: Arc<AtomicU32>,
    messages: Arc<AtomicU32>,
    status: Arc<Mutex<LinkStatus>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub uptime_seconds: u64,
    pub status: LinkStatus,
    pub reconnects: u32,
    pub messages: u32,
}

impl LinkHealth {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            reconnects: Arc::new(AtomicU32::new(0)),
            messages: Arc::new(AtomicU32::new(0)),
            status: Arc::new(Mutex::new(LinkStatus::Connecting)),
        }
    }

    /// Returns true when this is a reconnection rather than the first connect.
    pub fn mark_connected(&self) -> bool {
        let mut status = self.status.lock();
        let was_reconnecting = *status == LinkStatus::Reconnecting;
        *status = LinkStatus::Connected;
        was_reconnecting
    }

    pub fn mark_disconnected(&self) {
        *self.status.lock() = LinkStatus::Disconnected;
    }

    /// Counts one lost connection; only the transition out of `Connected`
    /// is counted, not every failed retry while the broker is down.
    pub fn connection_lost(&self) {
        let mut status = self.status.lock();
        if *status == LinkStatus::Connected {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
        *status = LinkStatus::Reconnecting;
    }

    pub fn message_received(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.lock()
    }

    pub fn report(&self) -> LinkReport {
        LinkReport {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            status: self.status(),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
        }
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_each_outage_once() {
        let health = LinkHealth::new();
        assert_eq!(health.status(), LinkStatus::Connecting);

        assert!(!health.mark_connected());
        health.connection_lost();
        health.connection_lost();
        health.connection_lost();
        assert_eq!(health.status(), LinkStatus::Reconnecting);
        assert!(health.mark_connected());

        let report = health.report();
        assert_eq!(report.reconnects, 1);
        assert_eq!(report.status, LinkStatus::Connected);
    }

    #[test]
    fn clones_share_state() {
        let health = LinkHealth::new();
        let other = health.clone();
        other.message_received();
        other.mark_disconnected();
        assert_eq!(health.report().messages, 1);
        assert_eq!(health.status().as_str(), "disconnected");
    }
}
