//! # routes::portfolio
//!
//! | Method | Path                    | Auth | Description                         |
//! |--------|-------------------------|------|-------------------------------------|
//! | GET    | `/api/balance`          |      | balance จาก exchange (paper/live)   |
//! | GET    | `/api/positions`        |      | open positions + unrealized P&L     |
//! | GET    | `/api/positions/closed` |      | closed positions                    |
//! | GET    | `/api/orders`           |      | open + recent orders + recent fills |
//! | GET    | `/api/trades`           | ✔    | trade log (`limit`, `ticker`)       |
//! | POST   | `/api/trades/import`    | ✔    | นำเข้า CSV export ของ Kalshi        |
//! | GET    | `/api/stats`            |      | ledger stats + daily P&L            |

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::AppError;
use crate::import::parse_kalshi_csv;
use crate::ledger::{Ledger, TradeFilter};
use crate::state::SharedState;

const DEFAULT_ORDER_LIMIT: usize = 100;

/// GET /api/balance — ตามโหมดของ Engine (หรือ DRY_RUN default ถ้ายังไม่เริ่ม)
pub async fn get_balance(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    let dry_run = state
        .engine
        .settings()
        .await
        .map_or(state.config.dry_run, |s| s.dry_run);
    let exchange = state.trading_exchange(dry_run);
    let balance = exchange.balance().await?;
    state.record_balance(balance).await;

    Ok(Json(json!({
        "ok":                    true,
        "paper":                 exchange.is_paper(),
        "balance_cents":         balance.balance,
        "portfolio_value_cents": balance.portfolio_value,
        "balance_dollars":       balance.balance as f64 / 100.0,
    })))
}

/// GET /api/positions
pub async fn get_positions(State(state): State<SharedState>) -> impl IntoResponse {
    let book = state.feed.book();
    let book = book.read().await;
    let ledger = state.ledger.read().await;
    let views = ledger.position_views(&book);

    let unrealized: i64 = views.iter().filter_map(|v| v.unrealized_pnl_cents).sum();
    Json(json!({
        "ok":                         true,
        "count":                      views.len(),
        "exposure_cents":             ledger.exposure_cents(),
        "total_unrealized_pnl_cents": unrealized,
        "positions":                  views,
    }))
}

/// GET /api/positions/closed
pub async fn get_closed_positions(State(state): State<SharedState>) -> impl IntoResponse {
    let closed = state.ledger.read().await.closed_positions();
    Json(json!({
        "ok":        true,
        "count":     closed.len(),
        "positions": closed,
    }))
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub limit: Option<usize>,
}

/// GET /api/orders — open orders แยกจาก recent, พร้อม fill ล่าสุด (ล่าสุดก่อน)
pub async fn get_orders(
    State(state): State<SharedState>,
    Query(query): Query<OrdersQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_ORDER_LIMIT);
    let ledger = state.ledger.read().await;
    let open = ledger.open_orders();
    let recent: Vec<_> = ledger.orders().into_iter().take(limit).collect();
    Json(json!({
        "ok":     true,
        "open":   open,
        "recent": recent,
        "fills":  ledger.recent_fills(limit),
    }))
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub limit:  Option<usize>,
    pub ticker: Option<String>,
}

/// GET /api/trades
pub async fn get_trades(
    State(state): State<SharedState>,
    Query(query): Query<TradesQuery>,
) -> impl IntoResponse {
    let filter = TradeFilter { ticker: query.ticker, limit: query.limit };
    let trades = state.ledger.read().await.trades(&filter);
    Json(json!({
        "ok":     true,
        "count":  trades.len(),
        "trades": trades,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    /// ล้าง trade log เดิมก่อน (default true)
    pub replace: Option<bool>,
}

/// POST /api/trades/import — body = CSV ดิบ
pub async fn import_trades(
    State(state): State<SharedState>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let parsed = parse_kalshi_csv(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let replace = query.replace.unwrap_or(true);
    let replaced = if replace { state.ledger.write().await.clear_trades() } else { 0 };

    let stats = Ledger::from_trades(&parsed.records).stats();
    let imported = parsed.records.len();
    for record in parsed.records {
        state.record_trade(record).await;
    }

    info!(imported, skipped = parsed.skipped, replaced, "📥 Trade CSV imported");
    Ok(Json(json!({
        "ok":       true,
        "imported": imported,
        "skipped":  parsed.skipped,
        "replaced": replaced,
        "stats":    stats,
    })))
}

/// GET /api/stats
pub async fn get_stats(State(state): State<SharedState>) -> impl IntoResponse {
    let ledger = state.ledger.read().await;
    Json(json!({
        "ok":        true,
        "stats":     ledger.stats(),
        "daily_pnl": ledger.daily_pnl(),
        "balances":  ledger.balance_history(),
    }))
}
