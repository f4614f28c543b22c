//! Crash Node
//!
//! Entry point for the crash round.
//! - `serve`: runs the round engine with its WebSocket and HTTP servers
//! - `watch`: headless sync client that follows a server and can auto-bet

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use crash_protocol::Phase;
use game_server::{HttpServer, SessionHub, WebSocketServer};
use round_engine::{CrashPointSampler, RoundEngine, UniformSampler};
use std::{path::PathBuf, sync::Arc};
use sync_client::{GameView, SyncClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::NodeConfig;

/// Crash round server and client
#[derive(Parser, Debug)]
#[command(name = "crash-node")]
#[command(about = "Real-time crash wagering round", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the round engine and its servers
    Serve(ServeArgs),
    /// Follow a server as a player
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// WebSocket bind address
    #[arg(long)]
    ws_addr: Option<String>,

    /// HTTP status bind address
    #[arg(long)]
    http_addr: Option<String>,

    /// Betting window in milliseconds
    #[arg(long)]
    betting_ms: Option<u64>,

    /// Multiplier tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Pause after a crash in milliseconds
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Exclusive upper bound for crash points
    #[arg(long)]
    max_crash_point: Option<f64>,

    /// Seed the crash point sampler
    #[arg(long)]
    seed: Option<u64>,
}

impl ServeArgs {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(addr) = self.ws_addr {
            config.ws_addr = addr;
        }
        if let Some(addr) = self.http_addr {
            config.http_addr = addr;
        }
        if let Some(ms) = self.betting_ms {
            config.betting_ms = ms;
        }
        if let Some(ms) = self.tick_ms {
            config.tick_ms = ms;
        }
        if let Some(ms) = self.cooldown_ms {
            config.cooldown_ms = ms;
        }
        if let Some(max) = self.max_crash_point {
            config.max_crash_point = max;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Server WebSocket URL
    #[arg(long)]
    url: Option<String>,

    /// Player identity
    #[arg(long)]
    user_id: String,

    /// Stake placed in every betting window
    #[arg(long)]
    auto_bet: Option<f64>,

    /// Auto-cashout target for the automatic stake
    #[arg(long, requires = "auto_bet")]
    auto_cashout: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };

    match cli.command {
        Command::Serve(args) => run_serve(config, args).await,
        Command::Watch(args) => run_watch(config, args).await,
    }
}

/// Run the engine, session hub and both servers until Ctrl+C
async fn run_serve(mut config: NodeConfig, args: ServeArgs) -> Result<()> {
    args.apply(&mut config);
    let round_config = config.round_config();
    let server_config = config.server_config();

    tracing::info!("Starting crash round server");
    tracing::info!("  WebSocket: {}", server_config.ws_addr);
    tracing::info!("  HTTP: {}", server_config.http_addr);
    tracing::info!(
        "  Betting window: {}ms, tick: {}ms, cooldown: {}ms",
        config.betting_ms,
        config.tick_ms,
        config.cooldown_ms
    );

    let sampler: Box<dyn CrashPointSampler> = match config.seed {
        Some(seed) => {
            tracing::info!("  Crash points seeded with {}", seed);
            Box::new(UniformSampler::seeded(seed))
        }
        None => Box::new(UniformSampler::from_entropy()),
    };

    let hub = Arc::new(SessionHub::from_config(&server_config));
    let (handle, engine) = RoundEngine::spawn(round_config, sampler, hub.clone())?;

    // Start WebSocket server
    let ws_server = WebSocketServer::new(handle.clone(), hub.clone());
    let ws_addr = server_config.ws_addr.clone();
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server.run(&ws_addr).await {
            tracing::error!("WebSocket server error: {}", e);
        }
    });

    // Start HTTP server
    let http_server = HttpServer::new(handle, hub);
    let http_addr = server_config.http_addr.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.run(&http_addr).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    ws_handle.abort();
    http_handle.abort();
    engine.abort();

    Ok(())
}

/// Follow a server, logging every phase change
async fn run_watch(mut config: NodeConfig, args: WatchArgs) -> Result<()> {
    if let Some(url) = args.url {
        config.url = url;
    }

    tracing::info!("Watching {} as {}", config.url, args.user_id);
    let client = SyncClient::spawn(config.client_config(&args.user_id));
    let mut views = client.subscribe();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_phase = None;
    let mut last_exhausted = false;
    let mut staked_round = None;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }

            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();

                if view.reconnect_exhausted != last_exhausted {
                    last_exhausted = view.reconnect_exhausted;
                    if last_exhausted {
                        tracing::warn!("Server unreachable, giving up until restarted");
                    }
                }

                if last_phase == Some(view.phase) {
                    continue;
                }
                last_phase = Some(view.phase);
                log_view(&view);

                let Some(amount) = args.auto_bet else {
                    continue;
                };
                if view.phase == Phase::Betting
                    && view.is_connected
                    && view.user_bet.is_none()
                    && staked_round != Some(view.round_id)
                {
                    staked_round = Some(view.round_id);
                    client.place_bet(amount, args.auto_cashout).await?;
                }
            }
        }
    }

    tracing::info!("Shutting down...");
    client.shutdown().await?;
    Ok(())
}

fn log_view(view: &GameView) {
    match view.phase {
        Phase::Betting => tracing::info!(
            "Round {} open for bets ({} staked)",
            view.round_id,
            view.bets.len()
        ),
        Phase::Running => tracing::info!(
            "Round {} running with {} stakes",
            view.round_id,
            view.bets.len()
        ),
        Phase::Crashed => {
            tracing::info!("Round {} crashed at {:.2}x", view.round_id, view.multiplier);
            if let Some(entry) = view
                .user_bet_history
                .iter()
                .find(|e| e.round_id == view.round_id)
            {
                tracing::info!(
                    "  {:?}: staked {:.2}, prize {:.2}",
                    entry.status,
                    entry.amount,
                    entry.prize
                );
            }
        }
    }

    if let Ok(json) = serde_json::to_string(view) {
        tracing::debug!("View: {}", json);
    }
}
