//! Local tile server binary.

use anyhow::Result;
use clap::Parser;
use std::env;
use std::sync::Arc;
use tile_api::config::{self, ServiceConfig};
use tile_api::AppState;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tile-api")]
#[command(about = "Local raster tile server")]
struct Args {
    /// Listen address (defaults from LOCALTILESERVER_HOST / LOCALTILESERVER_PORT)
    #[arg(short, long)]
    listen: Option<String>,

    /// Source served when requests omit `filename`
    #[arg(short, long)]
    filename: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,

    /// Allow cross-origin requests from any origin
    #[arg(long)]
    cors: bool,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Build tokio runtime with configurable worker threads
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Ok(threads_str) = env::var("TOKIO_WORKER_THREADS") {
        if let Ok(threads) = threads_str.parse::<usize>() {
            runtime_builder.worker_threads(threads);
        }
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // LOCALTILESERVER_DEBUG escalates the default log level only; an
    // explicit --log-level always wins.
    let debug = config::debug_enabled();
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        "info" if debug => Level::DEBUG,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tile server");

    let state = Arc::new(AppState::new(ServiceConfig {
        default_filename: args.filename,
        debug,
        cors: args.cors,
    }));

    let listen = args.listen.unwrap_or_else(config::default_listen);
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!(address = %listen, "Listening");

    axum::serve(listener, tile_api::build_router(state)).await?;
    Ok(())
}
