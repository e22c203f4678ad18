use soundfacts_service::config::SoundfactsConfig;
use soundfacts_service::services::metrics::init_metrics;
use soundfacts_service::startup::Application;

use service_core::observability::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SoundfactsConfig::load()?;

    init_tracing(
        "soundfacts-service",
        &config.common.log_level,
        config.otlp_endpoint.as_deref(),
    )?;
    init_metrics();

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        e
    })?;

    let result = application.run_until_stopped().await;
    shutdown_tracing();

    result?;
    Ok(())
}
