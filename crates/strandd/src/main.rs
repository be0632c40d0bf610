//! strandd — Strand relay node daemon.

use anyhow::Result;

use strand_core::config::StrandConfig;
use strandd::node::Node;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = StrandConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = StrandConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        StrandConfig::default()
    });

    // Positional overrides: strandd [name] [coordinator]
    let mut args = std::env::args().skip(1);
    if let Some(name) = args.next() {
        config.node.name = name;
    }
    if let Some(endpoint) = args.next() {
        config.coordinator.endpoint = endpoint;
    }

    tracing::info!(
        name = %config.node.name,
        strand = %config.node.strand,
        coordinator = %config.coordinator.endpoint,
        source = config.source.enabled,
        "strandd starting"
    );

    let mut handle = Node::start(config).await?;
    tracing::info!(name = %handle.name, endpoint = %handle.payload_endpoint, "node up");

    // Local consumer: the external display/record collaborator is out of
    // scope, so the daemon logs each accepted unit.
    let consumer = tokio::spawn(async move {
        while let Some(unit) = handle.delivered.recv().await {
            tracing::info!(
                origin = %hex::encode(&unit.origin[..8]),
                sequence = unit.sequence,
                bytes = unit.bytes.len(),
                kind = ?unit.kind,
                "unit delivered"
            );
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
        r = consumer => tracing::error!("consumer exited: {:?}", r),
    }

    Ok(())
}
