// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # TermVault Node
//!
//! Entry point for the `termvault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, restores the engine from sled, and
//! serves the HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `run`: start the node
//! - `init`: create the data directory and a fresh network key
//! - `preview`: offline interest calculator
//! - `version`: print build version information

mod api;
mod cli;
mod engine;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use termvault_contracts::FixedTermBank;
use termvault_protocol::clock::SystemClock;
use termvault_protocol::config::{DB_DIR_NAME, NETWORK_KEY_FILE, PROTOCOL_VERSION, TOKEN_SYMBOL};
use termvault_protocol::fhe::NetworkKey;
use termvault_protocol::storage::TermVaultDb;

use cli::{Commands, TermVaultCli};
use engine::Engine;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TermVaultCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Preview(args) => preview(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: engine, API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting termvault-node"
    );

    // --- Network key ---
    let network_key = load_network_key(&args.data_dir, args.network_key.as_deref())?;
    tracing::info!(fingerprint = %network_key.fingerprint(), "network key loaded");

    // --- Persistent storage ---
    let db_path = args.data_dir.join(DB_DIR_NAME);
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = TermVaultDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Metrics ---
    let node_metrics =
        Arc::new(NodeMetrics::new().context("failed to register prometheus metrics")?);

    // --- Engine ---
    let engine = Engine::open(
        db,
        network_key,
        Arc::new(SystemClock::new()),
        Arc::clone(&node_metrics),
        args.auditor,
    )
    .context("failed to open engine")?;

    let app_state = api::AppState {
        engine: Arc::new(engine),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("termvault-node stopped");
    Ok(())
}

/// The `--network-key` flag wins over the key file in the data directory.
fn load_network_key(data_dir: &Path, flag: Option<&str>) -> Result<NetworkKey> {
    if let Some(hex_key) = flag {
        return NetworkKey::from_hex(hex_key.trim()).context("invalid --network-key");
    }

    let key_path = data_dir.join(NETWORK_KEY_FILE);
    if !key_path.exists() {
        bail!(
            "no network key at {}; run `termvault-node init` first or pass --network-key",
            key_path.display()
        );
    }
    let contents = std::fs::read_to_string(&key_path)
        .with_context(|| format!("failed to read network key from {}", key_path.display()))?;
    NetworkKey::from_hex(contents.trim())
        .with_context(|| format!("malformed network key in {}", key_path.display()))
}

/// Initializes a new data directory and writes a random network key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("termvault_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(NETWORK_KEY_FILE);
    if key_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to replace it (existing ciphertexts become unreadable)",
            key_path.display()
        );
    }

    let key = NetworkKey::generate();
    std::fs::write(&key_path, key.to_hex())
        .with_context(|| format!("failed to write network key to {}", key_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", key_path.display()))?;
    }

    tracing::info!(
        fingerprint = %key.fingerprint(),
        key_path = %key_path.display(),
        "network key generated"
    );

    println!("Node initialized successfully.");
    println!("  Data directory  : {}", data_dir.display());
    println!("  Network key     : {}", key_path.display());
    println!("  Key fingerprint : {}", key.fingerprint());

    Ok(())
}

/// Prints what a deposit would earn. Touches no state.
fn preview(args: cli::PreviewArgs) -> Result<()> {
    let term = args.term;
    let interest = FixedTermBank::preview(term.code(), args.principal)?;
    let payout = args
        .principal
        .checked_add(interest)
        .context("principal + interest overflows")?;

    println!("Term      : {} (code {})", term.label(), term.code());
    println!("Locked    : {} days", term.lock_duration_secs() / 86_400);
    println!("Principal : {} {}", args.principal, TOKEN_SYMBOL);
    println!("Interest  : {} {} ({}%)", interest, TOKEN_SYMBOL, term.months());
    println!("Payout    : {} {}", payout, TOKEN_SYMBOL);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("termvault-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol       {}", PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
