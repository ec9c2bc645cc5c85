use anyhow::Result;
use clap::Parser;
use common::Config;
use database::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_DB_FILE: &str = "database.bin";
const DEFAULT_INDEX_FILE: &str = "index.bin";

#[derive(Parser, Debug)]
#[command(name = "snapsql-server", about = "HTTP front end for the snapshot SQL engine")]
struct Args {
    /// Host address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory containing both snapshot files
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Database snapshot filename within the data directory
    #[arg(long, default_value = DEFAULT_DB_FILE)]
    db_file: String,

    /// Index snapshot filename within the data directory
    #[arg(long, default_value = DEFAULT_INDEX_FILE)]
    index_file: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::builder()
        .data_dir(args.data_dir)
        .db_file(args.db_file)
        .index_file(args.index_file)
        .build();

    let engine = Arc::new(Engine::open(&config)?);
    let app = server::router(engine);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, data_dir = %config.data_dir.display(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
