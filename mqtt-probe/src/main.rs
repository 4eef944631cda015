use anyhow::{Context, Result};
use camera_observer::config::{BROKER_ENV, DEFAULT_MQTT_PORT};
use camera_observer::BrokerAddr;
use log::{error, info};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, Incoming, MqttOptions};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

// ===== Configuration =====
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const CLIENT_ID: &str = "camera-observer-probe";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let raw = std::env::var(BROKER_ENV).unwrap_or_else(|_| format!("localhost:{DEFAULT_MQTT_PORT}"));
    let broker = BrokerAddr::parse(&raw).with_context(|| format!("invalid {BROKER_ENV} value"))?;
    info!("🚀 Probing MQTT broker {broker}");

    // 1. port TCP ouvert ?
    match timeout(DIAL_TIMEOUT, TcpStream::connect((broker.host.as_str(), broker.port))).await {
        Ok(Ok(_)) => println!("MQTT Connection SUCCESSFUL (Port {} is open)", broker.port),
        Ok(Err(e)) => {
            println!("MQTT Connection FAILED: {e}");
            std::process::exit(1);
        }
        Err(_) => {
            println!("MQTT Connection FAILED: timed out after {}s", DIAL_TIMEOUT.as_secs());
            std::process::exit(1);
        }
    }

    // 2. handshake MQTT complet
    match timeout(DIAL_TIMEOUT, handshake(&broker)).await {
        Ok(Ok(())) => println!("MQTT Handshake SUCCESSFUL (CONNACK received)"),
        Ok(Err(e)) => {
            error!("❌ handshake failed: {e:#}");
            println!("MQTT Handshake FAILED: {e}");
            std::process::exit(1);
        }
        Err(_) => {
            println!("MQTT Handshake FAILED: no CONNACK within {}s", DIAL_TIMEOUT.as_secs());
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn handshake(broker: &BrokerAddr) -> Result<()> {
    let mut mqttoptions = MqttOptions::new(CLIENT_ID, broker.host.as_str(), broker.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);
    loop {
        if let Event::Incoming(Incoming::ConnAck(ack)) = eventloop.poll().await? {
            if ack.code != ConnectReturnCode::Success {
                anyhow::bail!("broker refused connection: {:?}", ack.code);
            }
            break;
        }
    }
    client.disconnect().await.ok();
    Ok(())
}
