//! tap-relay: HTTP relay for NASA Exoplanet Archive TAP queries, with a
//! durable usage-statistics layer and a rule-based habitability classifier.

mod classify;
mod config;
mod error;
mod relay;
mod server;
mod stats;
mod store;

use std::time::Duration;

use config::RelayConfig;
use server::AppState;
use stats::StatsHandle;
use store::StatsStore;

fn main() -> anyhow::Result<()> {
    // Determine config path
    let config_path = {
        let args: Vec<String> = std::env::args().collect();
        // Check for --config flag first
        args.iter()
            .position(|a| a == "--config")
            .and_then(|i| args.get(i + 1).cloned())
            // Fall back to positional arg
            .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
            .or_else(|| std::env::var("TAP_RELAY_CONFIG").ok())
            .unwrap_or_else(|| "tap-relay.toml".to_string())
    };

    // Load configuration
    let config = RelayConfig::load(&config_path)?;

    // Build the tokio runtime first — the OTLP gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Initialize tracing (OTLP export is optional — falls back to fmt-only)
        let _tracing_guard = tap_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            tap_base_url = %config.tap.base_url,
            predict_url = %config.predict.url,
            stats_file = %config.stats.file_path,
            "Starting tap-relay"
        );

        run(config).await
    })
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    // Build the TAP catalog client
    let tap_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.tap.timeout_secs))
        .build()?;

    // Build the prediction-service client (separate client with its own timeout)
    let predict_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.predict.timeout_secs))
        .build()?;

    // Hydrate statistics from the snapshot file
    let stats = StatsHandle::load(StatsStore::new(&config.stats.file_path)).await;

    let state = AppState {
        config,
        tap_client,
        predict_client,
        stats,
    };

    // Run the server
    server::run(state).await
}
