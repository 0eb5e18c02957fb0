use client_config_module::service::{run_server, ServiceConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = ServiceConfig::from_env()?;
    run_server(config, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {}", err);
            return;
        }
        info!("shutdown signal received");
    })
    .await?;
    Ok(())
}
