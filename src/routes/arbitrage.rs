//! # routes::arbitrage
//!
//! | Method | Path                   | Description                              |
//! |--------|------------------------|------------------------------------------|
//! | GET    | `/api/arbitrage`       | ArbReport ล่าสุด + log ของการ scan       |
//! | POST   | `/api/arbitrage/scan`  | arbitrage scan ใหม่ใน background         |
//! | POST   | `/api/arbitrage/stop`  | หยุดก่อนถึงขั้น orderbook                |

use std::sync::atomic::Ordering;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::arbitrage::{run_arbitrage_scan, ArbParams};
use crate::error::AppError;
use crate::events::WsEvent;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct ArbScanBody {
    pub min_profit_cents:     Option<i64>,
    pub quantity:             Option<i64>,
    pub check_orderbook:      Option<bool>,
    pub max_orderbook_checks: Option<usize>,
}

impl ArbScanBody {
    fn params(self) -> ArbParams {
        let d = ArbParams::default();
        ArbParams {
            min_profit_cents:     self.min_profit_cents.unwrap_or(d.min_profit_cents),
            quantity:             self.quantity.unwrap_or(d.quantity).max(1),
            check_orderbook:      self.check_orderbook.unwrap_or(d.check_orderbook),
            max_orderbook_checks: self.max_orderbook_checks.unwrap_or(d.max_orderbook_checks),
        }
    }
}

/// GET /api/arbitrage
pub async fn get_arbitrage(State(state): State<SharedState>) -> impl IntoResponse {
    let job = state.arbitrage.read().await.clone();
    Json(json!({
        "ok":      true,
        "running": job.running,
        "error":   job.error,
        "report":  job.report,
    }))
}

/// POST /api/arbitrage/scan
pub async fn start_arbitrage(
    State(state): State<SharedState>,
    body: Option<Json<ArbScanBody>>,
) -> Result<impl IntoResponse, AppError> {
    let params = body.map(|Json(b)| b).unwrap_or_default().params();
    {
        let mut job = state.arbitrage.write().await;
        if job.running {
            return Err(AppError::Conflict("Arbitrage scan already running".into()));
        }
        job.running = true;
        job.error = None;
    }
    state.arb_stop.store(false, Ordering::SeqCst);

    tokio::spawn(async move {
        let result = run_arbitrage_scan(state.exchange.as_ref(), &params, &state.arb_stop).await;
        let mut job = state.arbitrage.write().await;
        job.running = false;
        match result {
            Ok(report) => {
                state.broadcast(&WsEvent::ArbitrageCompleted {
                    opportunities: report.opportunities.len(),
                    stopped:       report.stopped,
                });
                job.report = Some(report);
            }
            Err(e) => {
                warn!(error = %e, "⚠️ Arbitrage scan failed");
                job.error = Some(e.to_string());
            }
        }
    });

    Ok(Json(json!({ "ok": true, "message": "Arbitrage scan started" })))
}

/// POST /api/arbitrage/stop
pub async fn stop_arbitrage(State(state): State<SharedState>) -> impl IntoResponse {
    let running = state.arbitrage.read().await.running;
    if running {
        state.arb_stop.store(true, Ordering::SeqCst);
    }
    Json(json!({ "ok": true, "stopping": running }))
}
