//! # kalshi-bot
//!
//! `kalshi-bot [serve]` — HTTP status/control server + sniper engine
//! `kalshi-bot <command>` — one-shot commands (balance, scan, arb, ...)
//!
//! ## Environment Variables
//!
//! | Variable             | Default            | Description                         |
//! |----------------------|--------------------|-------------------------------------|
//! | `KALSHI_ENV`         | `prod`             | `demo` \| `prod`                    |
//! | `KALSHI_API_KEY_ID`  | –                  | API key id                          |
//! | `KALSHI_PRIVATE_KEY` | –                  | RSA private key (PEM / base64)      |
//! | `PORT` / `BIND_ADDR` | `0.0.0.0:8000`     | Address Axum listens on             |
//! | `CONTROL_PASSWORD`   | –                  | `X-API-Key` for control endpoints   |
//! | `AUTO_START`         | `false`            | start the engine with the server    |
//! | `DRY_RUN`            | `true`             | paper trading                       |
//! | `RUST_LOG`           | `kalshi_bot=debug` | Tracing filter                      |

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kalshi_bot::{
    cli::{self, Cli, Command},
    config::AppConfig,
    engine,
    routes::build_router,
    state::{build_state, EngineSettings, SharedState},
};

// ─── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env (optional — CI/prod can use real env vars) ──────────────
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── 2. Initialise structured logging ─────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("kalshi_bot=debug".parse()?)
            .add_directive("tower_http=info".parse()?))
        .init();

    // ── 3. Config ────────────────────────────────────────────────────────────
    let config = AppConfig::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        command => cli::run(command, &config).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    info!(
        r#"

  ╔═══════════════════════════════════════════════╗
  ║        KALSHI BOT — Prediction Markets        ║
  ║        Rust + Axum  ·  Sniper Engine          ║
  ╚═══════════════════════════════════════════════╝"#
    );

    let addr = config.server.bind_addr;
    let auto_start = config.server.auto_start;
    let settings = EngineSettings {
        dry_run:       config.dry_run,
        with_ai:       config.sniper.with_ai,
        max_positions: config.sniper.max_positions,
    };
    if config.server.control_password.is_none() {
        warn!("🔒 CONTROL_PASSWORD not set — control endpoints are disabled");
    }
    info!(env = ?config.exchange.env, dry_run = config.dry_run, "⚙️ Config loaded");

    // ── 4. Shared state + startup reconcile ──────────────────────────────────
    let state = build_state(config).await?;
    engine::bootstrap(&state).await;

    if auto_start {
        if !settings.dry_run && !state.config.exchange.has_credentials() {
            warn!("🚫 AUTO_START ignored — live trading needs Kalshi credentials");
        } else {
            engine::start(&state, settings).await;
        }
    }

    // ── 5. Router + server ───────────────────────────────────────────────────
    let app = build_router(state.clone());

    info!(?addr, "🚀 Kalshi bot server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

/// Ctrl-C → ขอให้ engine หยุดก่อนปิด server
async fn shutdown_signal(state: SharedState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "⚠️ Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received");
    engine::stop(&state).await;
}
