//! # routes::monitor
//!
//! **Monitor Loop** — liveness, สถานะ Engine และ WebSocket event stream
//!
//! ## Endpoints
//!
//! | Method    | Path          | Description                                  |
//! |-----------|---------------|----------------------------------------------|
//! | GET (WS)  | `/ws/monitor` | WebSocket real-time event stream             |
//! | GET       | `/health`     | ok, uptime, engine running                   |
//! | GET       | `/api/status` | engine, risk, counters, last round           |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

use crate::state::SharedState;

/// จำนวน log ล่าสุดที่แนบไปกับ snapshot
const SNAPSHOT_LOG_LINES: usize = 50;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

/// GET /ws/monitor
///
/// ทุก WsEvent จะถูกส่งมาเป็น JSON text frame หลัง `SNAPSHOT` แรก
pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn snapshot(state: &SharedState) -> serde_json::Value {
    let (positions, stats, open_orders) = {
        let ledger = state.ledger.read().await;
        (ledger.open_positions(), ledger.stats(), ledger.open_orders())
    };
    let logs = state.log_lines().await;
    let recent: Vec<String> = logs
        .iter()
        .skip(logs.len().saturating_sub(SNAPSHOT_LOG_LINES))
        .map(ToString::to_string)
        .collect();

    json!({
        "event":          "SNAPSHOT",
        "engine_running": state.engine.is_running(),
        "settings":       state.engine.settings().await,
        "risk":           state.risk.status().await,
        "positions":      positions,
        "open_orders":    open_orders,
        "stats":          stats,
        "last_round":     state.last_round.read().await.clone(),
        "logs":           recent,
    })
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!(subscribers = state.broadcast_tx.receiver_count(), "🔌 Monitor client connected");

    // ── 1. SNAPSHOT ───────────────────────────────────────────────────────────
    let first = snapshot(&state).await.to_string();
    if sender.send(Message::Text(first)).await.is_err() {
        return;
    }

    // ── 2. Relay broadcast → socket ──────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "🐢 Monitor client lagging");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 Monitor client disconnected");
}

// ─── REST ─────────────────────────────────────────────────────────────────────

/// GET /health
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":             true,
        "uptime_secs":    state.uptime_secs(),
        "engine_running": state.engine.is_running(),
        "exchange":       state.exchange.name(),
    }))
}

/// GET /api/status — ภาพรวมทั้งหมดในคำขอเดียว
pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    let (open_positions, open_orders, exposure, balance) = {
        let ledger = state.ledger.read().await;
        (
            ledger.open_position_count(),
            ledger.open_orders().len(),
            ledger.exposure_cents(),
            ledger.last_balance(),
        )
    };

    Json(json!({
        "ok": true,
        "engine": {
            "running":        state.engine.is_running(),
            "stop_requested": state.engine.stop_requested(),
            "settings":       state.engine.settings().await,
            "started_at":     state.engine.started_at().await,
            "rounds":         state.engine.rounds(),
        },
        "config": {
            "environment":         state.config.exchange.env.to_string(),
            "authenticated":       state.config.exchange.has_credentials(),
            "dry_run_default":     state.config.dry_run,
            "limit_price":         state.config.sniper.limit_price,
            "min_price":           state.config.scan.min_price,
            "max_hours":           state.config.scan.max_hours,
            "round_interval_secs": state.config.round_interval_secs,
            "ai_configured":       state.analyst.is_configured(),
        },
        "risk": state.risk.status().await,
        "counters": {
            "trades":         state.trade_count.load(Ordering::Relaxed),
            "open_positions": open_positions,
            "open_orders":    open_orders,
            "exposure_cents": exposure,
        },
        "balance":     balance,
        "last_round":  state.last_round.read().await.clone(),
        "uptime_secs": state.uptime_secs(),
    }))
}
