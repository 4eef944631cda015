use crate::config::BrokerAddr;
use crate::health::{LinkHealth, LinkReport, LinkStatus};
use parking_lot::{Mutex, RwLock};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions,
    Outgoing, QoS, SubscribeReasonCode,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);
const SUBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives every message published on a subscribed topic. Called inline by
/// the event loop, so implementations must return quickly.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, topic: &str, payload: &[u8]);
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &[u8]) + Send + Sync,
{
    fn handle(&self, topic: &str, payload: &[u8]) {
        self(topic, payload)
    }
}

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("timed out connecting to broker {0}")]
    ConnectTimeout(String),
    #[error("failed to connect to broker {broker}: {source}")]
    Connect {
        broker: String,
        #[source]
        source: ConnectionError,
    },
    #[error("broker {broker} refused connection: {code:?}")]
    Refused { broker: String, code: ConnectReturnCode },
    #[error("failed to subscribe to {topic}: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },
    #[error("broker rejected subscription to {0}")]
    Rejected(String),
    #[error("broker did not acknowledge subscription to {0} in time")]
    SubAckTimeout(String),
    #[error("connection lost before the broker acknowledged {0}")]
    SubAckLost(String),
}

type Handlers = Arc<RwLock<HashMap<String, Arc<dyn MessageHandler>>>>;
type Acks = Arc<Mutex<SubAckTracker>>;
type AckSender = oneshot::Sender<Vec<SubscribeReasonCode>>;

/// Pairs SUBSCRIBE requests with the broker's SUBACK. Requests leave the
/// client in the order they were queued, the outgoing event gives each one
/// its packet id, and the SUBACK carrying that id completes the waiter.
/// Silent entries (resubscriptions) keep the queue aligned.
#[derive(Default)]
struct SubAckTracker {
    queued: VecDeque<Option<AckSender>>,
    sent: HashMap<u16, AckSender>,
}

impl SubAckTracker {
    fn track(&mut self) -> oneshot::Receiver<Vec<SubscribeReasonCode>> {
        let (tx, rx) = oneshot::channel();
        self.queued.push_back(Some(tx));
        rx
    }

    fn track_silent(&mut self) {
        self.queued.push_back(None);
    }

    /// Drops queued entries whose request never left the client.
    fn forget_abandoned(&mut self) {
        self.queued.retain(|e| !matches!(e, Some(tx) if tx.is_closed()));
    }

    fn forget_last_silent(&mut self) {
        if let Some(pos) = self.queued.iter().rposition(Option::is_none) {
            self.queued.remove(pos);
        }
    }

    fn on_sent(&mut self, pkid: u16) {
        if let Some(Some(tx)) = self.queued.pop_front() {
            self.sent.insert(pkid, tx);
        }
    }

    /// Returns false when nobody was waiting for this packet id.
    fn on_ack(&mut self, pkid: u16, codes: Vec<SubscribeReasonCode>) -> bool {
        match self.sent.remove(&pkid) {
            Some(tx) => tx.send(codes).is_ok(),
            None => false,
        }
    }

    /// Connection dropped: pending waiters are failed.
    fn reset(&mut self) {
        self.queued.clear();
        self.sent.clear();
    }
}

/// MQTT subscription with automatic reconnection. Connection loss is only
/// logged; handlers resume once the broker is back.
pub struct TelemetrySubscriber {
    client: AsyncClient,
    handlers: Handlers,
    acks: Acks,
    health: LinkHealth,
    event_loop: Option<JoinHandle<()>>,
    broker: BrokerAddr,
}

impl TelemetrySubscriber {
    pub async fn connect(broker: &BrokerAddr, client_id: &str) -> Result<Self, SubscriberError> {
        Self::connect_with(broker, client_id, Duration::from_secs(60)).await
    }

    /// Waits for the first CONNACK so an unreachable broker fails startup,
    /// then hands the event loop to a background task.
    pub async fn connect_with(
        broker: &BrokerAddr,
        client_id: &str,
        keep_alive: Duration,
    ) -> Result<Self, SubscriberError> {
        let mut opts = MqttOptions::new(client_id, &broker.host, broker.port);
        opts.set_keep_alive(keep_alive);
        opts.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        let health = LinkHealth::new();

        match timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop, broker)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(SubscriberError::ConnectTimeout(broker.to_string())),
        }
        health.mark_connected();
        info!(%broker, client_id, "connected to MQTT broker");

        let handlers: Handlers = Arc::new(RwLock::new(HashMap::new()));
        let acks: Acks = Arc::new(Mutex::new(SubAckTracker::default()));
        let event_loop = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            handlers.clone(),
            acks.clone(),
            health.clone(),
        ));

        Ok(Self {
            client,
            handlers,
            acks,
            health,
            event_loop: Some(event_loop),
            broker: broker.clone(),
        })
    }

    /// Registers `handler` for `topic` (MQTT filters with `+`/`#` allowed),
    /// subscribes at QoS 1 and waits for the broker's SUBACK. The handler is
    /// in place before the SUBSCRIBE goes out, so no early message is lost;
    /// it is removed again if the broker refuses or never answers.
    pub async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscriberError> {
        self.handlers.write().insert(topic.to_string(), handler);
        let ack = self.acks.lock().track();

        if let Err(source) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
            drop(ack);
            self.acks.lock().forget_abandoned();
            self.handlers.write().remove(topic);
            return Err(SubscriberError::Subscribe { topic: topic.to_string(), source });
        }

        let result = match timeout(SUBACK_TIMEOUT, ack).await {
            Ok(Ok(codes)) if codes.iter().any(|c| matches!(c, SubscribeReasonCode::Failure)) => {
                Err(SubscriberError::Rejected(topic.to_string()))
            }
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(SubscriberError::SubAckLost(topic.to_string())),
            Err(_) => Err(SubscriberError::SubAckTimeout(topic.to_string())),
        };
        if let Err(e) = result {
            self.handlers.write().remove(topic);
            return Err(e);
        }
        info!(topic, "subscribed");
        Ok(())
    }

    pub fn health(&self) -> &LinkHealth {
        &self.health
    }

    pub fn broker(&self) -> &BrokerAddr {
        &self.broker
    }

    /// Sends DISCONNECT and stops the event loop, giving each step a short
    /// grace period before giving up on it.
    pub async fn disconnect(&mut self) -> LinkReport {
        self.health.mark_disconnected();

        match timeout(DISCONNECT_GRACE, self.client.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("failed to send MQTT disconnect: {e}"),
            Err(_) => warn!("MQTT disconnect request timed out"),
        }

        if let Some(mut handle) = self.event_loop.take() {
            if timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        let report = self.health.report();
        info!(
            reconnects = report.reconnects,
            messages = report.messages,
            "disconnected from MQTT broker"
        );
        report
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop, broker: &BrokerAddr) -> Result<(), SubscriberError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(SubscriberError::Refused { broker: broker.to_string(), code: ack.code });
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                return Err(SubscriberError::Refused { broker: broker.to_string(), code });
            }
            Err(source) => {
                return Err(SubscriberError::Connect { broker: broker.to_string(), source });
            }
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    handlers: Handlers,
    acks: Acks,
    health: LinkHealth,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                health.message_received();
                match find_handler(&handlers, &p.topic) {
                    Some(handler) => handler.handle(&p.topic, &p.payload),
                    None => debug!(topic = %p.topic, "message on topic without handler"),
                }
            }
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                if health.mark_connected() {
                    // clean session: the broker forgot our subscriptions
                    let topics: Vec<String> = handlers.read().keys().cloned().collect();
                    info!("reconnected to MQTT broker, restoring {} subscriptions", topics.len());
                    for topic in topics {
                        acks.lock().track_silent();
                        if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            acks.lock().forget_last_silent();
                            error!(topic = %topic, "failed to restore subscription: {e}");
                        }
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => acks.lock().on_sent(pkid),
            Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                let rejected = ack.return_codes.iter().any(|c| matches!(c, SubscribeReasonCode::Failure));
                // a waiting subscribe() reports its own rejection
                if !acks.lock().on_ack(ack.pkid, ack.return_codes) && rejected {
                    error!(pkid = ack.pkid, "broker rejected subscription");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT event loop stopping after disconnect");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                if health.status() == LinkStatus::Disconnected {
                    return;
                }
                warn!("MQTT connection lost: {e}, retrying in {}s", RECONNECT_DELAY.as_secs());
                health.connection_lost();
                acks.lock().reset();
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn find_handler(handlers: &Handlers, topic: &str) -> Option<Arc<dyn MessageHandler>> {
    let handlers = handlers.read();
    if let Some(h) = handlers.get(topic) {
        return Some(h.clone());
    }
    handlers
        .iter()
        .find(|(filter, _)| topic_matches(filter, topic))
        .map(|(_, h)| h.clone())
}

/// MQTT topic filter matching (`+` one level, trailing `#` any remainder).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
