//! # routes::scanner
//!
//! | Method | Path                | Description                                   |
//! |--------|---------------------|-----------------------------------------------|
//! | GET    | `/api/scanner`      | ScanReport ล่าสุด (`sort_by`, `reverse`, ...) |
//! | POST   | `/api/scanner/scan` | scan ใหม่ใน background                        |

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::AppError;
use crate::events::WsEvent;
use crate::scanner::{scan, sort_results, SortKey};
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct ScannerQuery {
    pub sort_by:        Option<String>,
    #[serde(default)]
    pub reverse:        bool,
    #[serde(default)]
    pub qualified_only: bool,
    pub limit:          Option<usize>,
}

/// GET /api/scanner
pub async fn get_scanner(
    State(state): State<SharedState>,
    Query(query): Query<ScannerQuery>,
) -> Result<impl IntoResponse, AppError> {
    let key = match query.sort_by.as_deref() {
        Some(raw) => raw.parse::<SortKey>().map_err(AppError::BadRequest)?,
        None => SortKey::Tier,
    };

    let job = state.scanner.read().await.clone();
    let report = job.report.map(|mut report| {
        if query.qualified_only {
            report.results.retain(|r| r.qualified);
        }
        sort_results(&mut report.results, key, query.reverse);
        if let Some(limit) = query.limit {
            report.results.truncate(limit);
        }
        report
    });

    Ok(Json(json!({
        "ok":      true,
        "running": job.running,
        "error":   job.error,
        "sort_by": key.label(),
        "report":  report,
    })))
}

/// POST /api/scanner/scan — ดึง market ใหม่ทั้งหมดแล้ว scan ใน background
pub async fn start_scan(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    {
        let mut job = state.scanner.write().await;
        if job.running {
            return Err(AppError::Conflict("Scan already running".into()));
        }
        job.running = true;
        job.error = None;
    }

    tokio::spawn(async move {
        let result = state.feed.refresh(true).await;
        let mut job = state.scanner.write().await;
        job.running = false;
        match result {
            Ok(markets) => {
                let report = scan(&markets, &state.config.scan, Utc::now());
                info!(fetched = report.stats.fetched, qualified = report.stats.qualified, "🔎 Scan completed");
                state.broadcast(&WsEvent::ScanCompleted {
                    total:     report.results.len(),
                    qualified: report.stats.qualified,
                });
                job.report = Some(report);
            }
            Err(e) => {
                warn!(error = %e, "⚠️ Scan failed");
                job.error = Some(e.to_string());
            }
        }
    });

    Ok(Json(json!({ "ok": true, "message": "Scan started" })))
}
