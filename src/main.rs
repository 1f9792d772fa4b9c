use geohome2mqtt::{
    Config, GeoHomeClient, MqttPublisher, RefreshScheduler, SchedulerSettings, SessionManager,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Geo Home MQTT bridge");
    let config = Config::from_env()?;
    info!(
        "Account {}, broker {}:{}, topic root {}, discovery {}",
        config.username,
        config.mqtt.host,
        config.mqtt.port,
        config.topic_root,
        if config.discovery { "on" } else { "off" }
    );

    let api = GeoHomeClient::new(&config.api_url);
    let publisher = MqttPublisher::connect(&config.mqtt);
    let session = SessionManager::new(config.username.clone(), config.password.clone());

    RefreshScheduler::new(api, publisher, session, SchedulerSettings::from(&config))
        .run()
        .await;

    Ok(())
}
