//! Camera Observer service: `config.yaml` in, power cycles out, until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use camera_observer::{
    load_config, CooldownRegistry, FaultObserver, RemediationDispatcher, SmartThingsClient,
    TelemetrySubscriber,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel (SMARTTHINGS_TOKEN, MQTT_BROKER, RUST_LOG)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camera_observer=info")),
        )
        .init();

    info!("camera observer starting");

    let cfg = load_config().await.context("failed to load configuration")?;
    info!("found {} camera-to-switch mappings", cfg.mapping.len());

    let client = SmartThingsClient::from_config(&cfg.smartthings, cfg.settle_delay())
        .context("failed to initialize SmartThings client")?;
    info!(base_url = client.base_url(), "SmartThings client initialized");

    let dispatcher = Arc::new(RemediationDispatcher::new(Arc::new(client)));
    let observer = FaultObserver::with_parts(
        cfg.mapping.clone(),
        Arc::new(CooldownRegistry::new(cfg.cooldown())),
        dispatcher.clone(),
    )
    .with_missing_fps(cfg.observer.missing_fps);
    info!(
        cooldown_secs = cfg.observer.cooldown_secs,
        missing_fps = ?cfg.observer.missing_fps,
        "observer initialized"
    );

    let broker = cfg.broker_addr().context("invalid broker address")?;
    info!(%broker, "connecting to MQTT broker");
    let mut subscriber = TelemetrySubscriber::connect_with(
        &broker,
        &cfg.mqtt.client_id,
        std::time::Duration::from_secs(cfg.mqtt.keep_alive_secs),
    )
    .await
    .context("failed to connect to MQTT broker")?;

    subscriber
        .subscribe(&cfg.mqtt.topic, Arc::new(observer))
        .await
        .with_context(|| format!("failed to subscribe to topic {}", cfg.mqtt.topic))?;

    info!(topic = %cfg.mqtt.topic, "service running");

    wait_for_shutdown().await?;

    info!("shutting down");
    subscriber.disconnect().await;

    // best effort: in-flight restarts are not awaited
    let pending = dispatcher.abort_all();
    if pending > 0 {
        warn!("abandoning {pending} in-flight restart sequences");
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("failed to listen for SIGINT")?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")
}
