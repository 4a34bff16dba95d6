//! # routes::control
//!
//! Engine control — ทุก endpoint ต้องผ่าน [`crate::auth::require_control_key`]
//!
//! | Method | Path                 | Description                                   |
//! |--------|----------------------|-----------------------------------------------|
//! | POST   | `/api/control/start` | เริ่ม Engine (dry_run, with_ai, max_positions) |
//! | POST   | `/api/control/stop`  | ขอให้ Engine หยุดหลังจบ round ปัจจุบัน         |
//! | GET    | `/api/control/logs`  | engine log (500 บรรทัดล่าสุด)                  |

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::engine;
use crate::error::AppError;
use crate::state::{EngineSettings, SharedState};

const MAX_POSITIONS_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct StartBody {
    pub dry_run:       Option<bool>,
    pub with_ai:       Option<bool>,
    pub max_positions: Option<usize>,
}

/// POST /api/control/start
pub async fn start_engine(
    State(state): State<SharedState>,
    body: Option<Json<StartBody>>,
) -> Result<impl IntoResponse, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let settings = EngineSettings {
        dry_run:       body.dry_run.unwrap_or(state.config.dry_run),
        with_ai:       body.with_ai.unwrap_or(state.config.sniper.with_ai),
        max_positions: body
            .max_positions
            .unwrap_or(state.config.sniper.max_positions)
            .clamp(1, MAX_POSITIONS_LIMIT),
    };

    if !settings.dry_run && !state.config.exchange.has_credentials() {
        return Err(AppError::BadRequest(
            "Live trading needs KALSHI_API_KEY_ID and KALSHI_PRIVATE_KEY".into(),
        ));
    }
    if !engine::start(&state, settings).await {
        return Err(AppError::Conflict("Engine already running".into()));
    }

    Ok(Json(json!({
        "ok":       true,
        "message":  "Engine started",
        "settings": settings,
    })))
}

/// POST /api/control/stop
pub async fn stop_engine(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    if !engine::stop(&state).await {
        return Err(AppError::Conflict("Engine is not running".into()));
    }
    Ok(Json(json!({
        "ok":      true,
        "message": "Stop requested — engine halts after the current round",
    })))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

/// GET /api/control/logs
pub async fn get_logs(
    State(state): State<SharedState>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let lines = state.log_lines().await;
    let skip = query.limit.map_or(0, |n| lines.len().saturating_sub(n));
    let lines: Vec<String> = lines.iter().skip(skip).map(ToString::to_string).collect();
    Json(json!({
        "ok":      true,
        "running": state.engine.is_running(),
        "count":   lines.len(),
        "lines":   lines,
    }))
}
