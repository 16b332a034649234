use checkout_service::{config::Config, services::init_metrics, Application};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // RUST_LOG still overrides this inside init_tracing.
    let log_level = if std::env::var("APP__LOG_LEVEL").is_ok() {
        config.common.log_level.clone()
    } else {
        "info,checkout_service=debug".to_string()
    };
    let log_json = config.common.log_json
        || std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    init_tracing(&config.service_name, &log_level, log_json);

    init_metrics()?;

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
