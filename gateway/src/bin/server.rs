use docview_core::telemetry::init_logging;
use docview_core::GatewayConfig;
use docview_gateway::GatewayServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_logging("info,docview_gateway=debug,edge=debug")?;

    let config = GatewayConfig::from_env();
    tracing::info!(
        addr = %config.addr(),
        mount = %config.mount_prefix,
        "Starting docview gateway"
    );

    GatewayServer::new(config)?.serve().await?;
    Ok(())
}
