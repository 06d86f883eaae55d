use std::net::SocketAddr;

use graphql_gateway::{build_router, AppState, GatewayConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env()?;
    let state = AppState::from_config(&config)?;
    let app = build_router(state);

    let ip: std::net::IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((ip, config.port));

    info!(%addr, "starting graphql-gateway");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
