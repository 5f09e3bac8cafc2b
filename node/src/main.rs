// Copyright (c) 2026 Warden Contributors. MIT License.
// See LICENSE for details.

//! # Warden Devnet Node
//!
//! Entry point for the `warden-node` binary. Parses CLI arguments,
//! initializes logging and metrics, deploys the custody contract on an
//! in-memory host, advances the host one block per tick, and serves the
//! HTTP/WS API.
//!
//! The binary supports five subcommands:
//!
//! - `run`: start the node
//! - `keygen`: generate a P-256 device key pair
//! - `digest`: compute the digest a device signs for an intent
//! - `sign`: sign a digest with a device secret key
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::broadcast;

use warden_contracts::Warden;
use warden_protocol::config::{VaultParams, PROTOCOL_VERSION};
use warden_protocol::crypto::{AuthorizationIntent, MessageDigest, PasskeyKeypair};
use warden_protocol::decode_fixed;
use warden_protocol::identity::Principal;
use warden_protocol::ledger::InMemoryLedger;

use cli::{Commands, WardenNodeCli};
use logging::{LogFormat, DEFAULT_DIRECTIVES};
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming. Large enough to
/// absorb a burst of batch events without lagging WebSocket clients.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = WardenNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen => keygen(),
        Commands::Digest(args) => digest(args),
        Commands::Sign(args) => sign(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server, metrics endpoint, and the block timer.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(DEFAULT_DIRECTIVES, LogFormat::from_str_lossy(&args.log_format))?;

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        deployer = %args.deployer,
        block_time_ms = args.block_time_ms,
        "starting warden-node"
    );

    // --- Contract ---
    let params = VaultParams {
        default_threshold: args.default_threshold,
        default_lock_period: args.default_lock_period,
    };
    let warden = Warden::deploy(Principal::new(args.deployer), InMemoryLedger::new(), params)
        .context("invalid deployment parameters")?;
    tracing::info!(
        custody = %warden.custody(),
        default_threshold = params.default_threshold,
        default_lock_period = params.default_lock_period,
        "contract deployed"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        network: "devnet".to_string(),
        warden: Arc::new(Mutex::new(warden)),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Block timer ---
    // Time-locks are measured in host blocks, so the devnet needs a clock.
    let block_state = app_state.clone();
    let block_time = Duration::from_millis(args.block_time_ms.max(1));
    let block_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(block_time);
        // The first tick fires immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let height = api::produce_block(&block_state);
            tracing::debug!(height, "block produced");
        }
    });

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
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    block_loop.abort();
    let stats = app_state.warden.lock().stats();
    tracing::info!(
        deposits = stats.total_deposits,
        withdrawals = stats.total_withdrawals,
        passkeys = stats.total_passkeys_registered,
        "warden-node stopped"
    );
    Ok(())
}

/// Prints a fresh device key pair. The secret goes to stdout; keep it out
/// of shell history on shared machines.
fn keygen() -> Result<()> {
    let keypair = PasskeyKeypair::generate();
    println!("secret_key     : {}", hex::encode(keypair.secret_key_bytes()));
    println!("public_key     : {}", keypair.public_key().to_hex());
    println!("compressed_key : {}", hex::encode(keypair.compressed_public_key_bytes()));
    Ok(())
}

/// Prints the hex digest for an authorization intent.
fn digest(args: cli::DigestArgs) -> Result<()> {
    let mut intent = AuthorizationIntent::new(args.kind.into(), Principal::new(args.wallet))
        .with_amount(args.amount)
        .with_nonce(args.nonce);
    if let Some(recipient) = args.recipient {
        intent = intent.with_recipient(Principal::new(recipient));
    }
    if let Some(token) = args.token {
        intent = intent.with_token(token.as_str().into());
    }
    if let Some(payload) = args.payload {
        intent = intent.with_payload(payload.as_bytes());
    }
    println!("{}", intent.digest().to_hex());
    Ok(())
}

/// Signs a digest and prints the 64-byte `r || s` signature as hex.
fn sign(args: cli::SignArgs) -> Result<()> {
    let secret: [u8; 32] = decode_fixed(&args.secret_key).context("secret key must be 32 hex bytes")?;
    let keypair = PasskeyKeypair::from_secret_key_bytes(&secret).context("invalid P-256 secret key")?;
    let digest = MessageDigest::from_hex(&args.digest).context("digest must be 32 hex bytes")?;
    let signature = keypair.sign_digest(&digest).context("signing failed")?;
    println!("{}", signature.to_hex());
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("warden-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", PROTOCOL_VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot
/// be installed, that signal source is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
