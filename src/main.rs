use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use telemetry_publisher::config::{default_config_path, AppConfig};
use telemetry_publisher::mqtt::MqttConnector;
use telemetry_publisher::publisher::PublishingController;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = default_config_path();
    info!("Loading config from {}", config_path.display());
    let config = AppConfig::load_or_create(&config_path).await?;

    let connector = Arc::new(MqttConnector::connect(&config.broker)?);
    let controller = Arc::new(
        PublishingController::new(connector.clone(), config.device_topics.clone())
            .map_err(|e| eyre!("Failed to create publishing controller: {}", e))?,
    );

    // (re)start publishing on every CONNACK
    let follower = controller.follow_connection(connector.connection_state());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    follower.abort();
    controller.cleanup().await?;

    info!("Telemetry publisher stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(std::env::var("RUST_LOG").ok().as_deref());
    Ok(())
}

/// Filter from `RUST_LOG`, `info` when unset or unparsable.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn setup_logging_env(directives: Option<&str>) {
    FmtSubscriber::builder()
        .with_env_filter(log_filter(directives))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn log_level_defaults_to_info() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn rust_log_raises_the_level() {
        assert_eq!(
            log_filter(Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(
            log_filter(Some("telemetry_publisher=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
    }
}
