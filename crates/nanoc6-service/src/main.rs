//! NanoC6 Service - readings page, JSON API and background collector.
//!
//! Run with: `cargo run -p nanoc6-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use nanoc6_core::{
    Device, ReadingsBackend, ScanOptions, SensorDevice, format_peripheral_id, scan_with_retry,
};
use nanoc6_service::{AppState, Collector, Config, api};

/// NanoC6 Service - readings page, JSON API and background collector.
#[derive(Parser, Debug)]
#[command(name = "nanoc6-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Disable background collector (page and API only).
    #[arg(long, global = true)]
    no_collector: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Scan for nearby NanoC6 devices.
    Scan {
        /// Scan duration in seconds.
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,

        /// Report every advertising device, not only NanoC6 sensors.
        #[arg(long)]
        all: bool,
    },

    /// Request one reading from a device and print it.
    Read {
        /// Device name, address or peripheral id.
        address: String,
    },

    /// Ask a device to register itself with the backend.
    Register {
        /// Device name, address or peripheral id.
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nanoc6_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    match args.command {
        Some(Command::Scan { timeout, all }) => scan(timeout, all).await,
        Some(Command::Read { ref address }) => read(address).await,
        Some(Command::Register { ref address }) => register(&args, address).await,
        Some(Command::Run) | None => run_server(args).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    config.apply_env();
    if let Some(ref bind) = args.bind {
        config.server.bind = bind.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn scan(timeout: u64, all: bool) -> anyhow::Result<()> {
    let mut options = ScanOptions::new().duration_secs(timeout);
    if all {
        options = options.all_devices();
    }

    let devices = scan_with_retry(options, 2, false).await?;
    if devices.is_empty() {
        println!("No devices found");
        return Ok(());
    }

    for device in devices {
        let mac = device
            .mac_address
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string());
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<14} {:<10} {}",
            device.name.as_deref().unwrap_or("(unnamed)"),
            mac,
            rssi,
            format_peripheral_id(&device.id),
        );
    }
    Ok(())
}

async fn read(address: &str) -> anyhow::Result<()> {
    let device = Device::connect(address)
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;

    let result = device.request_readings().await;
    if result.is_ok()
        && let Err(e) = device.acknowledge().await
    {
        warn!("Acknowledge failed: {}", e);
    }
    if let Err(e) = SensorDevice::disconnect(&device).await {
        warn!("Disconnect failed: {}", e);
    }

    let sample = result?;
    println!("{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}

async fn register(args: &Args, address: &str) -> anyhow::Result<()> {
    let config = load_config(args)?;

    let device = Device::connect(address)
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;
    let mac = device.mac_address();
    let result = device.register().await;
    if let Err(e) = SensorDevice::disconnect(&device).await {
        warn!("Disconnect failed: {}", e);
    }

    if !result? {
        bail!("{} reported that registration failed", address);
    }
    println!("{} registered", address);

    if let Some(mac) = mac
        && config.backend.is_configured()
    {
        let client = config.backend.client()?;
        let registered = client.is_registered(&mac).await?;
        println!(
            "Backend lookup for {}: {}",
            mac,
            if registered { "found" } else { "not found yet" }
        );
    }
    Ok(())
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    if !config.backend.is_configured() {
        bail!(
            "No backend configured; set [backend] url and api_key or {} and {}",
            nanoc6_service::config::BACKEND_URL_ENV,
            nanoc6_service::config::API_KEY_ENV
        );
    }

    let backend = Arc::new(config.backend.client()?);
    info!("Using backend at {}", config.backend.url);

    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(backend, config);

    // Start the background collector
    let mut collector = Collector::new(Arc::clone(&state));
    if !args.no_collector {
        collector.start().await;
    } else {
        info!("Background collector disabled");
    }

    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    collector.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
