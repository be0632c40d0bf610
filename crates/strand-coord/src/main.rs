//! strand-coord — rendezvous coordinator daemon.

use anyhow::Result;

use strand_coord::Coordinator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9000".to_string());

    let coordinator = Coordinator::bind(&addr).await?;
    tracing::info!(endpoint = %coordinator.endpoint(), "coordinator up");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    coordinator.shutdown();

    Ok(())
}
