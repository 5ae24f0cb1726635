//! Ingestion server binary
//!
//! Run with: cargo run -p control-tower --bin control-tower-server

use clap::Parser;
use control_tower::{config::AppConfig, server::ControlTowerServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "control-tower-server", version, about = "Bulk tabular ingestion server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CONTROL_TOWER_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "control_tower=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                      Control Tower                        ║
║         Chunked Spreadsheet Ingestion Service             ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("  - Max upload size: {} bytes", config.ingest.max_upload_size);
    tracing::info!("  - Chunk capacity: {} records", config.ingest.chunk_capacity);
    tracing::info!("  - Max chunk bytes: {}", config.ingest.max_chunk_bytes);
    tracing::info!("  - Concurrent jobs: {}", config.ingest.max_concurrent_jobs);
    tracing::info!(
        "  - Database: {} / {}",
        config.storage.database_url,
        config.storage.database_name
    );

    // Create and start server
    let server = ControlTowerServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /upload                   - Upload a spreadsheet");
    println!("  GET  /jobs/:id                 - Job status");
    println!("  GET  /jobs/:id/chunks/:index   - Read a committed chunk");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
