#![forbid(unsafe_code)]

use std::sync::Arc;

use ticket_defense_adapter::config::AdapterConfig;
use ticket_defense_adapter::logging::init_tracing;
use ticket_defense_adapter::routes::build_router;
use ticket_defense_adapter::AdapterRuntime;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is normal outside development.
    let _ = dotenvy::dotenv();
    let config = AdapterConfig::from_env()?;
    init_tracing(config.log_json)?;
    tracing::debug!(config = ?config, "adapter config loaded");

    let runtime = Arc::new(AdapterRuntime::from_config(&config)?);
    let health = runtime.health_report();
    let app = build_router(runtime);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        store = %health.store,
        ocr_configured = health.ocr_configured,
        ai_configured = health.ai_configured,
        verifier_configured = health.verifier_configured,
        "ticket_defense_http listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("ticket_defense_http stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
}
