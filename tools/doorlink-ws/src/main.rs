// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Doorlink WebSocket Bridge - Connect browsers to a UDP door hub.
//!
//! Web clients send lock/unlock/status requests over a WebSocket; the
//! bridge turns them into hub COMMAND datagrams and relays FEEDBACK back to
//! the asking client. Hub events, heartbeats and hello messages go to
//! every client.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 8080, hub from HUB_HOST / HUB_PORT or defaults
//! doorlink-ws
//!
//! # Explicit hub, poll two modules every second
//! doorlink-ws --hub-host 10.0.0.5 --hub-port 12345 --poll D1,D2
//!
//! # Using config file
//! doorlink-ws --config doorlink.toml
//! ```
//!
//! # Protocol
//!
//! ```json
//! // Lock a door
//! {"type": "lock-door", "moduleId": "D1", "requestId": 1}
//!
//! // Reply
//! {"type": "door-action", "requestId": 1, "moduleId": "D1", "action": "LOCK",
//!  "state": {"doorOpen": false, "lockLocked": true}, "success": true}
//! ```

mod session;

use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use doorlink::{BridgeConfig, HubBridge};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use session::ClientSession;

/// Doorlink WebSocket Bridge
#[derive(Parser, Debug)]
#[command(name = "doorlink-ws")]
#[command(about = "Doorlink WebSocket Bridge - Connect browsers to a UDP door hub")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Hub host (overrides HUB_HOST)
    #[arg(long)]
    hub_host: Option<String>,

    /// Hub UDP port (overrides HUB_PORT)
    #[arg(long)]
    hub_port: Option<u16>,

    /// FEEDBACK timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Modules to poll for STATUS (comma-separated)
    #[arg(long, value_delimiter = ',')]
    poll: Option<Vec<String>>,

    /// Poll period in milliseconds (0 to disable)
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Maximum concurrent WebSocket connections
    #[arg(long)]
    max_clients: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long, default_value = "60")]
    stats_interval: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "doorlink.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Shared application state
struct AppState {
    bridge: Arc<HubBridge>,
}

impl AppState {
    fn can_accept_client(&self) -> bool {
        self.bridge.clients().len() < self.bridge.config().max_clients
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;

    // Initialize logging
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Doorlink WebSocket Bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Hub: {}", config.hub_endpoint());

    let addr = config.listen_endpoint();
    let bridge = HubBridge::new(config)?;
    let local = bridge.start().await?;
    info!("UDP endpoint: {}", local);

    if args.stats_interval > 0 {
        spawn_stats_reporter(bridge.clone(), Duration::from_secs(args.stats_interval));
    }

    let state = Arc::new(AppState {
        bridge: bridge.clone(),
    });

    // Build router
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let shutdown_bridge = bridge.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down...");
            shutdown_bridge.shutdown();
        })
        .await?;

    let stats = bridge.stats();
    info!(
        "Final stats: {} sent, {} matched, {} timeouts, {} dropped",
        stats.commands_sent, stats.feedback_matched, stats.timeouts, stats.feedback_dropped
    );

    Ok(())
}

fn build_config(args: &Args) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    config.apply_env()?;

    if let Some(ref host) = args.hub_host {
        config.hub_host = host.clone();
    }
    if let Some(port) = args.hub_port {
        config.hub_port = port;
    }
    if let Some(timeout) = args.timeout_ms {
        config.request_timeout_ms = timeout;
    }
    if let Some(ref modules) = args.poll {
        config.poll_modules = modules.clone();
    }
    if let Some(interval) = args.poll_interval_ms {
        config.poll_interval_ms = interval;
    }
    if let Some(ref bind) = args.bind {
        config.listen_address = bind.clone();
    }
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    if let Some(max) = args.max_clients {
        config.max_clients = max;
    }
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn spawn_stats_reporter(bridge: Arc<HubBridge>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // First tick is immediate.
        interval.tick().await;
        loop {
            interval.tick().await;
            if bridge.is_shut_down() {
                break;
            }
            let stats = bridge.stats();
            info!(
                "Stats: clients={} pending={} sent={} matched={} timeouts={} ({:.1}%) dropped={} events={}",
                bridge.clients().len(),
                bridge.table().len(),
                stats.commands_sent,
                stats.feedback_matched,
                stats.timeouts,
                stats.timeout_ratio() * 100.0,
                stats.feedback_dropped,
                stats.unsolicited,
            );
        }
    });
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig {
        poll_modules: vec!["D1".into(), "D2".into()],
        ..BridgeConfig::default()
    };

    let content = format!(
        r#"# Doorlink Bridge Configuration
# Generated by doorlink-ws gen-config
# HUB_HOST / HUB_PORT override the hub settings below.

{}
"#,
        config.to_toml()?
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match BridgeConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Hub:      {}", config.hub_endpoint());
            println!("Listen:   {}", config.listen_endpoint());
            println!("Timeout:  {} ms", config.request_timeout_ms);
            match config.poll_interval() {
                Some(period) => println!(
                    "Polling:  {:?} every {} ms",
                    config.poll_modules,
                    period.as_millis()
                ),
                None => println!("Polling:  disabled"),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            Err(e.into())
        }
    }
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.can_accept_client() {
        warn!("Connection rejected: max clients reached");
        return (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "Too many connections",
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    ClientSession::new(state.bridge.clone()).run(socket).await;
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let bridge = &state.bridge;

    axum::Json(serde_json::json!({
        "status": if bridge.is_shut_down() { "stopping" } else { "ok" },
        "version": env!("CARGO_PKG_VERSION"),
        "hub": bridge.hub_endpoint(),
        "udp": bridge.local_addr().map(|a| a.to_string()),
        "clients": bridge.clients().len(),
        "max_clients": bridge.config().max_clients,
        "pending": bridge.table().len(),
        "stats": bridge.stats(),
    }))
}
